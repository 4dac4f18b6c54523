//! Invoice model for invoicing-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{InvoiceLine, LineInput, PageRequest};

/// Invoice header. The totals always equal the sums of its lines' amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub client_id: Uuid,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub net_total: Decimal,
    pub tax_total: Decimal,
    pub gross_total: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    /// A new invoice header with zero totals.
    pub fn new(client_id: Uuid, invoice_number: String, invoice_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            invoice_id: Uuid::new_v4(),
            client_id,
            invoice_number,
            invoice_date,
            net_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            gross_total: Decimal::ZERO,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn totals(&self) -> InvoiceTotals {
        InvoiceTotals {
            net: self.net_total,
            tax: self.tax_total,
            gross: self.gross_total,
        }
    }

    pub fn set_totals(&mut self, totals: InvoiceTotals) {
        self.net_total = totals.net;
        self.tax_total = totals.tax;
        self.gross_total = totals.gross;
        self.updated_utc = Utc::now();
    }
}

/// Aggregate amounts of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct InvoiceTotals {
    pub net: Decimal,
    pub tax: Decimal,
    pub gross: Decimal,
}

/// Invoice returned together with its current lines.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceWithLines {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
}

/// Input for creating an invoice with its initial lines.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvoice {
    pub client_id: Uuid,
    /// Generated as `FAC-YYYYMM-NNNN` when absent.
    #[serde(default)]
    #[validate(length(min = 1, max = 50, message = "Invoice number must be between 1 and 50 characters"))]
    pub invoice_number: Option<String>,
    pub invoice_date: NaiveDate,
    #[validate(
        length(min = 1, message = "At least one invoice line is required"),
        nested
    )]
    pub lines: Vec<LineInput>,
}

/// Input for updating an invoice. Absent fields keep their value; a present
/// `lines` replaces the whole line set.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateInvoice {
    #[serde(default)]
    pub client_id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(min = 1, max = 50, message = "Invoice number must be between 1 and 50 characters"))]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
    /// Validated separately as a [`super::LineSet`].
    #[serde(default)]
    pub lines: Option<Vec<LineInput>>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub client_id: Option<Uuid>,
    pub page: PageRequest,
}
