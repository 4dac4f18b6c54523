//! Domain models for invoicing-service.

mod client;
mod invoice;
mod line;
mod page;
mod statistics;

pub use client::{
    validate_name, validate_tax_id, Client, ClientSummary, CreateClient, ListClientsFilter,
    UpdateClient, MAX_NAME_LENGTH, TAX_ID_LENGTH,
};
pub use invoice::{
    CreateInvoice, Invoice, InvoiceTotals, InvoiceWithLines, ListInvoicesFilter, UpdateInvoice,
};
pub use line::{InvoiceLine, LineAmounts, LineInput, LineSet};
pub use page::{Page, PageRequest, DEFAULT_PER_PAGE, MAX_PER_PAGE};
pub use statistics::{ClientRevenue, ClientStatistics, InvoiceStatistics};
