//! PostgreSQL store for invoicing-service.

use super::store::{average_amount, ClientActivity, InvoiceStore, StoreTransaction};
use crate::models::{
    Client, ClientRevenue, ClientStatistics, Invoice, InvoiceLine, InvoiceStatistics,
    ListClientsFilter, ListInvoicesFilter, Page,
};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const CLIENT_COLUMNS: &str = "client_id, name, email, tax_id, creation_date, created_utc";

const INVOICE_COLUMNS: &str = "invoice_id, client_id, invoice_number, invoice_date, \
     net_total, tax_total, gross_total, created_utc, updated_utc";

const LINE_COLUMNS: &str = "line_id, invoice_id, description, quantity, unit_price, tax_rate, \
     net_amount, tax_amount, gross_amount, position, created_utc";

/// Maps a write failure, turning constraint violations into `Conflict`.
fn write_error(context: &'static str, e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err)
            if db_err.is_unique_violation() || db_err.is_foreign_key_violation() =>
        {
            let detail = db_err.constraint().unwrap_or("constraint").to_string();
            AppError::Conflict(anyhow::anyhow!("{}: {} violated", context, detail))
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e)),
    }
}

fn read_error(context: &'static str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "invoicing-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl InvoiceStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| read_error("Failed to begin transaction", e))?;
        Ok(Box::new(PgTransaction { tx }))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}

/// An open PostgreSQL transaction. Rolled back by sqlx when dropped.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    // -------------------------------------------------------------------------
    // Client Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(client_id = %client_id))]
    async fn get_client(&mut self, client_id: Uuid) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE client_id = $1"
        ))
        .bind(client_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to get client", e))?;

        timer.observe_duration();

        Ok(client)
    }

    async fn email_taken(&mut self, email: &str, exclude: Option<Uuid>) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["email_taken"])
            .start_timer();

        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM clients
                WHERE email = $1 AND ($2::uuid IS NULL OR client_id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to check email", e))?;

        timer.observe_duration();

        Ok(taken)
    }

    async fn tax_id_taken(
        &mut self,
        tax_id: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["tax_id_taken"])
            .start_timer();

        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM clients
                WHERE tax_id = $1 AND ($2::uuid IS NULL OR client_id <> $2)
            )
            "#,
        )
        .bind(tax_id)
        .bind(exclude)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to check tax ID", e))?;

        timer.observe_duration();

        Ok(taken)
    }

    #[instrument(skip(self, client), fields(client_id = %client.client_id))]
    async fn insert_client(&mut self, client: &Client) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_client"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO clients (client_id, name, email, tax_id, creation_date, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(client.client_id)
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.tax_id)
        .bind(client.creation_date)
        .bind(client.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to create client", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self, client), fields(client_id = %client.client_id))]
    async fn update_client(&mut self, client: &Client) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_client"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE clients
            SET name = $2, email = $3, tax_id = $4, creation_date = $5
            WHERE client_id = $1
            "#,
        )
        .bind(client.client_id)
        .bind(&client.name)
        .bind(&client.email)
        .bind(&client.tax_id)
        .bind(client.creation_date)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to update client", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(client_id = %client_id))]
    async fn delete_client(&mut self, client_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_client"])
            .start_timer();

        // invoices.client_id is ON DELETE RESTRICT
        let result = sqlx::query("DELETE FROM clients WHERE client_id = $1")
            .bind(client_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| write_error("Failed to delete client", e))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, filter))]
    async fn list_clients(&mut self, filter: &ListClientsFilter) -> Result<Page<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        let search = filter.search.as_deref().map(str::to_lowercase);
        let matches = r#"
            ($1::text IS NULL
                OR position($1 IN lower(name)) > 0
                OR position($1 IN lower(email)) > 0
                OR position($1 IN coalesce(tax_id, '')) > 0)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM clients WHERE {matches}"))
            .bind(&search)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| read_error("Failed to count clients", e))?;

        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE {matches} \
             ORDER BY name, created_utc LIMIT $2 OFFSET $3"
        ))
        .bind(&search)
        .bind(filter.page.limit() as i64)
        .bind(filter.page.offset() as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to list clients", e))?;

        timer.observe_duration();

        Ok(Page::new(clients, filter.page, total as u64))
    }

    async fn client_activity(&mut self, client_id: Uuid) -> Result<ClientActivity, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["client_activity"])
            .start_timer();

        let (invoice_count, revenue, last_invoice_date): (i64, Decimal, Option<NaiveDate>) =
            sqlx::query_as(
                r#"
                SELECT COUNT(*), COALESCE(SUM(gross_total), 0), MAX(invoice_date)
                FROM invoices
                WHERE client_id = $1
                "#,
            )
            .bind(client_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| read_error("Failed to summarize client invoices", e))?;

        timer.observe_duration();

        Ok(ClientActivity {
            invoice_count,
            revenue,
            last_invoice_date,
        })
    }

    async fn client_statistics(&mut self, top: usize) -> Result<ClientStatistics, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["client_statistics"])
            .start_timer();

        let (total_clients, clients_with_invoices): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM clients),
                (SELECT COUNT(DISTINCT client_id) FROM invoices)
            "#,
        )
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to count clients", e))?;

        let ranking: Vec<(Uuid, String, Decimal)> = sqlx::query_as(
            r#"
            SELECT c.client_id, c.name, SUM(i.gross_total) AS revenue
            FROM clients c
            JOIN invoices i ON i.client_id = c.client_id
            GROUP BY c.client_id, c.name
            ORDER BY revenue DESC, c.name
            LIMIT $1
            "#,
        )
        .bind(top as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to rank clients", e))?;

        timer.observe_duration();

        Ok(ClientStatistics {
            total_clients: total_clients as u64,
            clients_with_invoices: clients_with_invoices as u64,
            clients_without_invoices: (total_clients - clients_with_invoices) as u64,
            top_clients: ranking
                .into_iter()
                .map(|(client_id, name, revenue)| ClientRevenue {
                    client_id,
                    name,
                    revenue,
                })
                .collect(),
        })
    }

    // -------------------------------------------------------------------------
    // Invoice Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_id = $1"
        ))
        .bind(invoice_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to get invoice", e))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, client_id, invoice_number, invoice_date,
                net_total, tax_total, gross_total, created_utc, updated_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.client_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.invoice_date)
        .bind(invoice.net_total)
        .bind(invoice.tax_total)
        .bind(invoice.gross_total)
        .bind(invoice.created_utc)
        .bind(invoice.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to create invoice", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE invoices
            SET client_id = $2,
                invoice_number = $3,
                invoice_date = $4,
                net_total = $5,
                tax_total = $6,
                gross_total = $7,
                updated_utc = $8
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.client_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.invoice_date)
        .bind(invoice.net_total)
        .bind(invoice.tax_total)
        .bind(invoice.gross_total)
        .bind(invoice.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to update invoice", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn delete_invoice(&mut self, invoice_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        // invoice_lines.invoice_id is ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM invoices WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| write_error("Failed to delete invoice", e))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, filter))]
    async fn list_invoices(
        &mut self,
        filter: &ListInvoicesFilter,
    ) -> Result<Page<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM invoices WHERE ($1::uuid IS NULL OR client_id = $1)",
        )
        .bind(filter.client_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to count invoices", e))?;

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE ($1::uuid IS NULL OR client_id = $1) \
             ORDER BY invoice_date DESC, created_utc DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(filter.client_id)
        .bind(filter.page.limit() as i64)
        .bind(filter.page.offset() as i64)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to list invoices", e))?;

        timer.observe_duration();

        Ok(Page::new(invoices, filter.page, total as u64))
    }

    async fn count_invoices_between(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_invoices_between"])
            .start_timer();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM invoices WHERE invoice_date BETWEEN $1 AND $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to count invoices", e))?;

        timer.observe_duration();

        Ok(count as u64)
    }

    async fn invoice_number_taken(
        &mut self,
        invoice_number: &str,
        exclude: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["invoice_number_taken"])
            .start_timer();

        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM invoices
                WHERE invoice_number = $1 AND ($2::uuid IS NULL OR invoice_id <> $2)
            )
            "#,
        )
        .bind(invoice_number)
        .bind(exclude)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to check invoice number", e))?;

        timer.observe_duration();

        Ok(taken)
    }

    async fn invoice_statistics(
        &mut self,
        month_start: NaiveDate,
        month_end: NaiveDate,
    ) -> Result<InvoiceStatistics, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["invoice_statistics"])
            .start_timer();

        let (total, amount, month_total, month_amount): (i64, Decimal, i64, Decimal) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(gross_total), 0),
                    COUNT(*) FILTER (WHERE invoice_date BETWEEN $1 AND $2),
                    COALESCE(SUM(gross_total) FILTER (WHERE invoice_date BETWEEN $1 AND $2), 0)
                FROM invoices
                "#,
            )
            .bind(month_start)
            .bind(month_end)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| read_error("Failed to compute invoice statistics", e))?;

        timer.observe_duration();

        Ok(InvoiceStatistics {
            total_invoices: total as u64,
            total_amount: amount,
            average_amount: average_amount(amount, total as u64),
            current_month_invoices: month_total as u64,
            current_month_amount: month_amount,
        })
    }

    // -------------------------------------------------------------------------
    // Line Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn get_line(&mut self, line_id: Uuid) -> Result<Option<InvoiceLine>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_line"])
            .start_timer();

        let line = sqlx::query_as::<_, InvoiceLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM invoice_lines WHERE line_id = $1"
        ))
        .bind(line_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to get line", e))?;

        timer.observe_duration();

        Ok(line)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_lines(&mut self, invoice_id: Uuid) -> Result<Vec<InvoiceLine>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_lines"])
            .start_timer();

        let lines = sqlx::query_as::<_, InvoiceLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM invoice_lines WHERE invoice_id = $1 ORDER BY position"
        ))
        .bind(invoice_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| read_error("Failed to get lines", e))?;

        timer.observe_duration();

        Ok(lines)
    }

    #[instrument(skip(self, line), fields(invoice_id = %line.invoice_id, line_id = %line.line_id))]
    async fn insert_line(&mut self, line: &InvoiceLine) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_line"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO invoice_lines (
                line_id, invoice_id, description, quantity, unit_price, tax_rate,
                net_amount, tax_amount, gross_amount, position, created_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(line.line_id)
        .bind(line.invoice_id)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.tax_rate)
        .bind(line.net_amount)
        .bind(line.tax_amount)
        .bind(line.gross_amount)
        .bind(line.position)
        .bind(line.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to create line", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self, line), fields(line_id = %line.line_id))]
    async fn update_line(&mut self, line: &InvoiceLine) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_line"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE invoice_lines
            SET description = $2,
                quantity = $3,
                unit_price = $4,
                tax_rate = $5,
                net_amount = $6,
                tax_amount = $7,
                gross_amount = $8,
                position = $9
            WHERE line_id = $1
            "#,
        )
        .bind(line.line_id)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.tax_rate)
        .bind(line.net_amount)
        .bind(line.tax_amount)
        .bind(line.gross_amount)
        .bind(line.position)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error("Failed to update line", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn delete_line(&mut self, line_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_line"])
            .start_timer();

        let result = sqlx::query("DELETE FROM invoice_lines WHERE line_id = $1")
            .bind(line_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| write_error("Failed to delete line", e))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn delete_lines(&mut self, invoice_id: Uuid) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_lines"])
            .start_timer();

        let result = sqlx::query("DELETE FROM invoice_lines WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| write_error("Failed to delete lines", e))?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(|e| write_error("Failed to commit transaction", e))
    }
}
