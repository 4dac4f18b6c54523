//! Persistence seam for invoicing-service.
//!
//! All reads and writes go through a [`StoreTransaction`]. Dropping a
//! transaction without calling [`StoreTransaction::commit`] rolls it back.

use crate::models::{
    Client, ClientStatistics, Invoice, InvoiceLine, InvoiceStatistics, ListClientsFilter,
    ListInvoicesFilter, Page,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

/// Number of clients reported in the revenue ranking.
pub const TOP_CLIENTS: usize = 5;

/// Invoicing aggregates for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientActivity {
    pub invoice_count: i64,
    pub revenue: Decimal,
    pub last_invoice_date: Option<NaiveDate>,
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

/// One atomic unit of work against the store.
#[async_trait]
pub trait StoreTransaction: Send {
    // Clients
    async fn get_client(&mut self, client_id: Uuid) -> Result<Option<Client>, AppError>;

    /// Whether another client (not `exclude`) already uses `email`.
    async fn email_taken(&mut self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError>;

    async fn tax_id_taken(&mut self, tax_id: &str, exclude: Option<Uuid>)
        -> Result<bool, AppError>;

    async fn insert_client(&mut self, client: &Client) -> Result<(), AppError>;

    async fn update_client(&mut self, client: &Client) -> Result<(), AppError>;

    /// Fails with `Conflict` while the client still owns invoices.
    async fn delete_client(&mut self, client_id: Uuid) -> Result<bool, AppError>;

    /// Ordered by name.
    async fn list_clients(&mut self, filter: &ListClientsFilter) -> Result<Page<Client>, AppError>;

    async fn client_activity(&mut self, client_id: Uuid) -> Result<ClientActivity, AppError>;

    async fn client_statistics(&mut self, top: usize) -> Result<ClientStatistics, AppError>;

    // Invoices
    async fn get_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError>;

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError>;

    /// Removes the invoice and every line it owns.
    async fn delete_invoice(&mut self, invoice_id: Uuid) -> Result<bool, AppError>;

    /// Ordered by invoice date, newest first.
    async fn list_invoices(&mut self, filter: &ListInvoicesFilter)
        -> Result<Page<Invoice>, AppError>;

    /// Invoices dated within `[start, end]`.
    async fn count_invoices_between(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, AppError>;

    async fn invoice_number_taken(
        &mut self,
        invoice_number: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, AppError>;

    /// Overall figures plus those for invoices dated within `[month_start, month_end]`.
    async fn invoice_statistics(
        &mut self,
        month_start: NaiveDate,
        month_end: NaiveDate,
    ) -> Result<InvoiceStatistics, AppError>;

    // Lines
    async fn get_line(&mut self, line_id: Uuid) -> Result<Option<InvoiceLine>, AppError>;

    /// Ordered by position.
    async fn get_lines(&mut self, invoice_id: Uuid) -> Result<Vec<InvoiceLine>, AppError>;

    async fn insert_line(&mut self, line: &InvoiceLine) -> Result<(), AppError>;

    async fn update_line(&mut self, line: &InvoiceLine) -> Result<(), AppError>;

    async fn delete_line(&mut self, line_id: Uuid) -> Result<bool, AppError>;

    async fn delete_lines(&mut self, invoice_id: Uuid) -> Result<u64, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

/// Mean of `total` over `count` items, rounded to cents.
pub fn average_amount(total: Decimal, count: u64) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    (total / Decimal::from(count))
        .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}
