//! Services module for invoicing-service.

pub mod calculator;
pub mod clients;
pub mod database;
pub mod invoices;
pub mod memory;
pub mod metrics;
pub mod numbering;
pub mod store;
pub mod totals;

pub use clients::ClientService;
pub use database::PgStore;
pub use invoices::InvoiceService;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, http_metrics_middleware, init_metrics};
pub use store::{InvoiceStore, StoreTransaction};
