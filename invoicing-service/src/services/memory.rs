//! In-memory store, used by the test suite and when no database is configured.
//!
//! A transaction holds the store lock for its whole lifetime and works on a
//! private copy of the state; commit swaps the copy in.

use super::store::{average_amount, ClientActivity, InvoiceStore, StoreTransaction};
use crate::models::{
    Client, ClientRevenue, ClientStatistics, Invoice, InvoiceLine, InvoiceStatistics,
    ListClientsFilter, ListInvoicesFilter, Page,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct State {
    clients: HashMap<Uuid, Client>,
    invoices: HashMap<Uuid, Invoice>,
    lines: HashMap<Uuid, InvoiceLine>,
}

impl State {
    fn check_client_unique(&self, client: &Client) -> Result<(), AppError> {
        for other in self.clients.values() {
            if other.client_id == client.client_id {
                continue;
            }
            if other.email == client.email {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Email '{}' is already registered",
                    client.email
                )));
            }
            if client.tax_id.is_some() && other.tax_id == client.tax_id {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Tax ID is already registered"
                )));
            }
        }
        Ok(())
    }

    fn check_invoice_unique(&self, invoice: &Invoice) -> Result<(), AppError> {
        let duplicate = self.invoices.values().any(|other| {
            other.invoice_id != invoice.invoice_id && other.invoice_number == invoice.invoice_number
        });
        if duplicate {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice number '{}' already exists",
                invoice.invoice_number
            )));
        }
        if !self.clients.contains_key(&invoice.client_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Client {} does not exist",
                invoice.client_id
            )));
        }
        Ok(())
    }

    fn invoices_newest_first(&self) -> Vec<Invoice> {
        let mut invoices: Vec<Invoice> = self.invoices.values().cloned().collect();
        invoices.sort_by(|a, b| {
            b.invoice_date
                .cmp(&a.invoice_date)
                .then(b.created_utc.cmp(&a.created_utc))
        });
        invoices
    }
}

/// Process-local [`InvoiceStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get_client(&mut self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        Ok(self.working.clients.get(&client_id).cloned())
    }

    async fn email_taken(&mut self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        Ok(self
            .working
            .clients
            .values()
            .any(|c| c.email == email && Some(c.client_id) != exclude))
    }

    async fn tax_id_taken(
        &mut self,
        tax_id: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, AppError> {
        Ok(self
            .working
            .clients
            .values()
            .any(|c| c.tax_id.as_deref() == Some(tax_id) && Some(c.client_id) != exclude))
    }

    async fn insert_client(&mut self, client: &Client) -> Result<(), AppError> {
        self.working.check_client_unique(client)?;
        self.working
            .clients
            .insert(client.client_id, client.clone());
        Ok(())
    }

    async fn update_client(&mut self, client: &Client) -> Result<(), AppError> {
        self.working.check_client_unique(client)?;
        if let Some(existing) = self.working.clients.get_mut(&client.client_id) {
            *existing = client.clone();
        }
        Ok(())
    }

    async fn delete_client(&mut self, client_id: Uuid) -> Result<bool, AppError> {
        if self
            .working
            .invoices
            .values()
            .any(|i| i.client_id == client_id)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Client still has invoices"
            )));
        }
        Ok(self.working.clients.remove(&client_id).is_some())
    }

    async fn list_clients(&mut self, filter: &ListClientsFilter) -> Result<Page<Client>, AppError> {
        let mut clients: Vec<Client> = self
            .working
            .clients
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_utc.cmp(&b.created_utc)));
        Ok(Page::from_sorted(clients, filter.page))
    }

    async fn client_activity(&mut self, client_id: Uuid) -> Result<ClientActivity, AppError> {
        let mut activity = ClientActivity::default();
        for invoice in self
            .working
            .invoices
            .values()
            .filter(|i| i.client_id == client_id)
        {
            activity.invoice_count += 1;
            activity.revenue += invoice.gross_total;
            activity.last_invoice_date = activity.last_invoice_date.max(Some(invoice.invoice_date));
        }
        Ok(activity)
    }

    async fn client_statistics(&mut self, top: usize) -> Result<ClientStatistics, AppError> {
        let mut revenue: HashMap<Uuid, Decimal> = HashMap::new();
        for invoice in self.working.invoices.values() {
            *revenue.entry(invoice.client_id).or_default() += invoice.gross_total;
        }
        let clients_with_invoices = revenue.len() as u64;

        let mut ranking: Vec<ClientRevenue> = revenue
            .into_iter()
            .filter_map(|(client_id, revenue)| {
                self.working.clients.get(&client_id).map(|c| ClientRevenue {
                    client_id,
                    name: c.name.clone(),
                    revenue,
                })
            })
            .collect();
        ranking.sort_by(|a, b| b.revenue.cmp(&a.revenue).then(a.name.cmp(&b.name)));
        ranking.truncate(top);

        let total_clients = self.working.clients.len() as u64;
        Ok(ClientStatistics {
            total_clients,
            clients_with_invoices,
            clients_without_invoices: total_clients - clients_with_invoices,
            top_clients: ranking,
        })
    }

    async fn get_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.working.invoices.get(&invoice_id).cloned())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError> {
        self.working.check_invoice_unique(invoice)?;
        self.working
            .invoices
            .insert(invoice.invoice_id, invoice.clone());
        Ok(())
    }

    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError> {
        self.working.check_invoice_unique(invoice)?;
        if let Some(existing) = self.working.invoices.get_mut(&invoice.invoice_id) {
            *existing = invoice.clone();
        }
        Ok(())
    }

    async fn delete_invoice(&mut self, invoice_id: Uuid) -> Result<bool, AppError> {
        self.working
            .lines
            .retain(|_, line| line.invoice_id != invoice_id);
        Ok(self.working.invoices.remove(&invoice_id).is_some())
    }

    async fn list_invoices(
        &mut self,
        filter: &ListInvoicesFilter,
    ) -> Result<Page<Invoice>, AppError> {
        let invoices = self
            .working
            .invoices_newest_first()
            .into_iter()
            .filter(|i| filter.client_id.is_none_or(|id| i.client_id == id))
            .collect();
        Ok(Page::from_sorted(invoices, filter.page))
    }

    async fn count_invoices_between(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, AppError> {
        Ok(self
            .working
            .invoices
            .values()
            .filter(|i| i.invoice_date >= start && i.invoice_date <= end)
            .count() as u64)
    }

    async fn invoice_number_taken(
        &mut self,
        invoice_number: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, AppError> {
        Ok(self
            .working
            .invoices
            .values()
            .any(|i| i.invoice_number == invoice_number && Some(i.invoice_id) != exclude))
    }

    async fn invoice_statistics(
        &mut self,
        month_start: NaiveDate,
        month_end: NaiveDate,
    ) -> Result<InvoiceStatistics, AppError> {
        let mut total_invoices = 0u64;
        let mut total_amount = Decimal::ZERO;
        let mut current_month_invoices = 0u64;
        let mut current_month_amount = Decimal::ZERO;
        for invoice in self.working.invoices.values() {
            total_invoices += 1;
            total_amount += invoice.gross_total;
            if invoice.invoice_date >= month_start && invoice.invoice_date <= month_end {
                current_month_invoices += 1;
                current_month_amount += invoice.gross_total;
            }
        }
        Ok(InvoiceStatistics {
            total_invoices,
            total_amount,
            average_amount: average_amount(total_amount, total_invoices),
            current_month_invoices,
            current_month_amount,
        })
    }

    async fn get_line(&mut self, line_id: Uuid) -> Result<Option<InvoiceLine>, AppError> {
        Ok(self.working.lines.get(&line_id).cloned())
    }

    async fn get_lines(&mut self, invoice_id: Uuid) -> Result<Vec<InvoiceLine>, AppError> {
        let mut lines: Vec<InvoiceLine> = self
            .working
            .lines
            .values()
            .filter(|l| l.invoice_id == invoice_id)
            .cloned()
            .collect();
        lines.sort_by_key(|l| l.position);
        Ok(lines)
    }

    async fn insert_line(&mut self, line: &InvoiceLine) -> Result<(), AppError> {
        if !self.working.invoices.contains_key(&line.invoice_id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} does not exist",
                line.invoice_id
            )));
        }
        self.working.lines.insert(line.line_id, line.clone());
        Ok(())
    }

    async fn update_line(&mut self, line: &InvoiceLine) -> Result<(), AppError> {
        if let Some(existing) = self.working.lines.get_mut(&line.line_id) {
            *existing = line.clone();
        }
        Ok(())
    }

    async fn delete_line(&mut self, line_id: Uuid) -> Result<bool, AppError> {
        Ok(self.working.lines.remove(&line_id).is_some())
    }

    async fn delete_lines(&mut self, invoice_id: Uuid) -> Result<u64, AppError> {
        let before = self.working.lines.len();
        self.working
            .lines
            .retain(|_, line| line.invoice_id != invoice_id);
        Ok((before - self.working.lines.len()) as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
