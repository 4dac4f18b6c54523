//! Client management.

use super::metrics::CLIENTS_TOTAL;
use super::store::{InvoiceStore, StoreTransaction, TOP_CLIENTS};
use crate::models::{
    Client, ClientStatistics, ClientSummary, CreateClient, ListClientsFilter, Page, UpdateClient,
};
use chrono::Utc;
use service_core::error::{field_error, AppError};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

#[derive(Clone)]
pub struct ClientService {
    store: Arc<dyn InvoiceStore>,
}

impl ClientService {
    pub fn new(store: Arc<dyn InvoiceStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, input))]
    pub async fn create_client(&self, input: CreateClient) -> Result<Client, AppError> {
        let input = input.normalized();
        input.validate()?;

        let mut tx = self.store.begin().await?;
        check_unique(
            tx.as_mut(),
            Some(input.email.as_str()),
            input.tax_id.as_deref(),
            None,
        )
        .await?;

        let client = Client {
            client_id: Uuid::new_v4(),
            name: input.name,
            email: input.email,
            tax_id: input.tax_id,
            creation_date: input
                .creation_date
                .unwrap_or_else(|| Utc::now().date_naive()),
            created_utc: Utc::now(),
        };
        tx.insert_client(&client).await?;
        tx.commit().await?;

        CLIENTS_TOTAL.with_label_values(&["created"]).inc();
        info!(client_id = %client.client_id, "Client created");

        Ok(client)
    }

    /// Client with its invoice count, revenue and latest invoice date.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn get_client(&self, client_id: Uuid) -> Result<ClientSummary, AppError> {
        let mut tx = self.store.begin().await?;
        let client = require_client(tx.as_mut(), client_id).await?;
        let activity = tx.client_activity(client_id).await?;

        Ok(ClientSummary {
            client,
            invoice_count: activity.invoice_count,
            revenue: activity.revenue,
            last_invoice_date: activity.last_invoice_date,
        })
    }

    #[instrument(skip(self, input), fields(client_id = %client_id))]
    pub async fn update_client(
        &self,
        client_id: Uuid,
        input: UpdateClient,
    ) -> Result<Client, AppError> {
        let input = input.normalized();
        input.check()?;

        let mut tx = self.store.begin().await?;
        let mut client = require_client(tx.as_mut(), client_id).await?;

        let email = input.email.as_deref().filter(|e| *e != client.email);
        let tax_id = input
            .new_tax_id()
            .filter(|t| Some(*t) != client.tax_id.as_deref());
        check_unique(tx.as_mut(), email, tax_id, Some(client_id)).await?;

        input.apply_to(&mut client);
        tx.update_client(&client).await?;
        tx.commit().await?;

        CLIENTS_TOTAL.with_label_values(&["updated"]).inc();
        info!(client_id = %client.client_id, "Client updated");

        Ok(client)
    }

    /// Refuses while the client still owns invoices.
    #[instrument(skip(self), fields(client_id = %client_id))]
    pub async fn delete_client(&self, client_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        require_client(tx.as_mut(), client_id).await?;

        let activity = tx.client_activity(client_id).await?;
        if activity.invoice_count > 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Client has {} invoice(s) and cannot be deleted",
                activity.invoice_count
            )));
        }

        tx.delete_client(client_id).await?;
        tx.commit().await?;

        CLIENTS_TOTAL.with_label_values(&["deleted"]).inc();
        info!(client_id = %client_id, "Client deleted");

        Ok(())
    }

    #[instrument(skip(self, filter))]
    pub async fn list_clients(&self, filter: ListClientsFilter) -> Result<Page<Client>, AppError> {
        let mut tx = self.store.begin().await?;
        tx.list_clients(&filter).await
    }

    #[instrument(skip(self))]
    pub async fn statistics(&self) -> Result<ClientStatistics, AppError> {
        let mut tx = self.store.begin().await?;
        tx.client_statistics(TOP_CLIENTS).await
    }
}

pub(crate) async fn require_client(
    tx: &mut dyn StoreTransaction,
    client_id: Uuid,
) -> Result<Client, AppError> {
    tx.get_client(client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))
}

/// Reports every taken unique field at once.
async fn check_unique(
    tx: &mut dyn StoreTransaction,
    email: Option<&str>,
    tax_id: Option<&str>,
    exclude: Option<Uuid>,
) -> Result<(), AppError> {
    let mut errors = ValidationErrors::new();
    if let Some(email) = email {
        if tx.email_taken(email, exclude).await? {
            errors.add(
                "email",
                field_error("unique", "This email address is already registered"),
            );
        }
    }
    if let Some(tax_id) = tax_id {
        if tx.tax_id_taken(tax_id, exclude).await? {
            errors.add(
                "tax_id",
                field_error("unique", "This tax ID is already registered"),
            );
        }
    }
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(AppError::FieldConflict(errors))
    }
}
