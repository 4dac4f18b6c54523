//! Reporting aggregates for invoicing-service.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Invoice counts and gross amounts, overall and for the current month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceStatistics {
    pub total_invoices: u64,
    pub total_amount: Decimal,
    pub average_amount: Decimal,
    pub current_month_invoices: u64,
    pub current_month_amount: Decimal,
}

/// A client ranked by gross invoiced amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientRevenue {
    pub client_id: Uuid,
    pub name: String,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStatistics {
    pub total_clients: u64,
    pub clients_with_invoices: u64,
    pub clients_without_invoices: u64,
    pub top_clients: Vec<ClientRevenue>,
}
