//! Invoice lifecycle and line maintenance.
//!
//! Every mutating operation runs in one store transaction and calls the
//! totals aggregator explicitly before committing.

use super::clients::require_client;
use super::metrics::{INVOICES_TOTAL, INVOICE_AMOUNT_TOTAL};
use super::numbering::{generate_invoice_number, period_bounds};
use super::store::{InvoiceStore, StoreTransaction};
use super::totals::{self, apply_line_set, recompute_totals};
use crate::models::{
    CreateInvoice, Invoice, InvoiceLine, InvoiceStatistics, InvoiceWithLines, LineInput, LineSet,
    ListInvoicesFilter, Page, PageRequest, UpdateInvoice,
};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

#[derive(Clone)]
pub struct InvoiceService {
    store: Arc<dyn InvoiceStore>,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn InvoiceStore>) -> Self {
        Self { store }
    }

    /// Creates the invoice and its lines; totals are populated before commit.
    #[instrument(skip(self, input), fields(client_id = %input.client_id))]
    pub async fn create_invoice(&self, input: CreateInvoice) -> Result<InvoiceWithLines, AppError> {
        input.validate()?;
        let requested_number = trimmed(input.invoice_number.as_deref());

        let mut tx = self.store.begin().await?;
        require_client(tx.as_mut(), input.client_id).await?;

        let invoice_number = match requested_number {
            Some(number) => {
                ensure_number_free(tx.as_mut(), number, None).await?;
                number.to_string()
            }
            None => next_invoice_number(tx.as_mut(), input.invoice_date).await?,
        };

        let mut invoice = Invoice::new(input.client_id, invoice_number, input.invoice_date);
        tx.insert_invoice(&invoice).await?;
        let lines = apply_line_set(tx.as_mut(), &mut invoice, &input.lines).await?;
        tx.commit().await?;

        INVOICES_TOTAL.with_label_values(&["created"]).inc();
        INVOICE_AMOUNT_TOTAL
            .with_label_values(&["gross"])
            .inc_by(invoice.gross_total.to_f64().unwrap_or_default());
        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            gross_total = %invoice.gross_total,
            "Invoice created"
        );

        Ok(InvoiceWithLines { invoice, lines })
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<InvoiceWithLines, AppError> {
        let mut tx = self.store.begin().await?;
        let invoice = require_invoice(tx.as_mut(), invoice_id).await?;
        let lines = tx.get_lines(invoice_id).await?;
        Ok(InvoiceWithLines { invoice, lines })
    }

    /// Updates header fields; a supplied line set replaces all current lines.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    pub async fn update_invoice(
        &self,
        invoice_id: Uuid,
        mut input: UpdateInvoice,
    ) -> Result<InvoiceWithLines, AppError> {
        let line_set = input.lines.take().map(|lines| LineSet { lines });
        validate_update(&input, line_set.as_ref())?;

        let mut tx = self.store.begin().await?;
        let mut invoice = require_invoice(tx.as_mut(), invoice_id).await?;

        if let Some(client_id) = input.client_id {
            if client_id != invoice.client_id {
                require_client(tx.as_mut(), client_id).await?;
                invoice.client_id = client_id;
            }
        }
        if let Some(number) = trimmed(input.invoice_number.as_deref()) {
            if number != invoice.invoice_number {
                ensure_number_free(tx.as_mut(), number, Some(invoice_id)).await?;
                invoice.invoice_number = number.to_string();
            }
        }
        if let Some(invoice_date) = input.invoice_date {
            invoice.invoice_date = invoice_date;
        }
        invoice.updated_utc = Utc::now();
        tx.update_invoice(&invoice).await?;

        let lines = match line_set {
            Some(set) => apply_line_set(tx.as_mut(), &mut invoice, &set.lines).await?,
            None => tx.get_lines(invoice_id).await?,
        };
        tx.commit().await?;

        INVOICES_TOTAL.with_label_values(&["updated"]).inc();
        info!(invoice_id = %invoice_id, "Invoice updated");

        Ok(InvoiceWithLines { invoice, lines })
    }

    /// Discards every line of the invoice and stores `set` in their place.
    #[instrument(skip(self, set), fields(invoice_id = %invoice_id))]
    pub async fn replace_invoice_lines(
        &self,
        invoice_id: Uuid,
        set: LineSet,
    ) -> Result<InvoiceWithLines, AppError> {
        set.validate()?;

        let mut tx = self.store.begin().await?;
        let mut invoice = require_invoice(tx.as_mut(), invoice_id).await?;
        let lines = apply_line_set(tx.as_mut(), &mut invoice, &set.lines).await?;
        tx.commit().await?;

        info!(invoice_id = %invoice_id, lines = lines.len(), "Invoice lines replaced");

        Ok(InvoiceWithLines { invoice, lines })
    }

    /// Appends one line after the current last position.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    pub async fn add_line(
        &self,
        invoice_id: Uuid,
        input: LineInput,
    ) -> Result<InvoiceWithLines, AppError> {
        input.validate()?;
        let amounts = totals::price_single_line(&input)?;

        let mut tx = self.store.begin().await?;
        let mut invoice = require_invoice(tx.as_mut(), invoice_id).await?;

        let position = tx
            .get_lines(invoice_id)
            .await?
            .iter()
            .map(|l| l.position + 1)
            .max()
            .unwrap_or(0);
        let line = totals::new_line(invoice_id, &input, amounts, position, Utc::now());
        tx.insert_line(&line).await?;

        let lines = recompute_totals(tx.as_mut(), &mut invoice).await?;
        tx.commit().await?;

        info!(invoice_id = %invoice_id, line_id = %line.line_id, "Invoice line added");

        Ok(InvoiceWithLines { invoice, lines })
    }

    #[instrument(skip(self, input), fields(invoice_id = %invoice_id, line_id = %line_id))]
    pub async fn update_line(
        &self,
        invoice_id: Uuid,
        line_id: Uuid,
        input: LineInput,
    ) -> Result<InvoiceWithLines, AppError> {
        input.validate()?;
        let amounts = totals::price_single_line(&input)?;

        let mut tx = self.store.begin().await?;
        let mut invoice = require_invoice(tx.as_mut(), invoice_id).await?;
        let mut line = require_line(tx.as_mut(), invoice_id, line_id).await?;

        line.rewrite(&input, amounts);
        tx.update_line(&line).await?;

        let lines = recompute_totals(tx.as_mut(), &mut invoice).await?;
        tx.commit().await?;

        info!(invoice_id = %invoice_id, line_id = %line_id, "Invoice line updated");

        Ok(InvoiceWithLines { invoice, lines })
    }

    /// Removes one line. The last remaining line cannot be removed.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, line_id = %line_id))]
    pub async fn delete_line(
        &self,
        invoice_id: Uuid,
        line_id: Uuid,
    ) -> Result<InvoiceWithLines, AppError> {
        let mut tx = self.store.begin().await?;
        let mut invoice = require_invoice(tx.as_mut(), invoice_id).await?;
        require_line(tx.as_mut(), invoice_id, line_id).await?;

        if tx.get_lines(invoice_id).await?.len() <= 1 {
            return Err(AppError::invalid_field(
                "lines",
                "length",
                "An invoice must keep at least one line",
            ));
        }

        tx.delete_line(line_id).await?;
        let lines = recompute_totals(tx.as_mut(), &mut invoice).await?;
        tx.commit().await?;

        info!(invoice_id = %invoice_id, line_id = %line_id, "Invoice line deleted");

        Ok(InvoiceWithLines { invoice, lines })
    }

    /// Deletes the invoice together with all of its lines.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, invoice_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        require_invoice(tx.as_mut(), invoice_id).await?;

        let removed_lines = tx.delete_lines(invoice_id).await?;
        tx.delete_invoice(invoice_id).await?;
        tx.commit().await?;

        INVOICES_TOTAL.with_label_values(&["deleted"]).inc();
        info!(invoice_id = %invoice_id, removed_lines, "Invoice deleted");

        Ok(())
    }

    /// Newest invoices first, each with its lines.
    #[instrument(skip(self, filter))]
    pub async fn list_invoices(
        &self,
        filter: ListInvoicesFilter,
    ) -> Result<Page<InvoiceWithLines>, AppError> {
        let mut tx = self.store.begin().await?;
        let page = tx.list_invoices(&filter).await?;
        with_lines(tx.as_mut(), page).await
    }

    #[instrument(skip(self, page), fields(client_id = %client_id))]
    pub async fn list_client_invoices(
        &self,
        client_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<InvoiceWithLines>, AppError> {
        let mut tx = self.store.begin().await?;
        require_client(tx.as_mut(), client_id).await?;

        let filter = ListInvoicesFilter {
            client_id: Some(client_id),
            page,
        };
        let page = tx.list_invoices(&filter).await?;
        with_lines(tx.as_mut(), page).await
    }

    /// Figures for all invoices and for those dated in the month of `today`.
    #[instrument(skip(self))]
    pub async fn statistics(&self, today: NaiveDate) -> Result<InvoiceStatistics, AppError> {
        let (month_start, month_end) = period_bounds(today);
        let mut tx = self.store.begin().await?;
        tx.invoice_statistics(month_start, month_end).await
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Collects header and line errors into one report.
fn validate_update(input: &UpdateInvoice, lines: Option<&LineSet>) -> Result<(), AppError> {
    let mut errors = match input.validate() {
        Ok(()) => ValidationErrors::new(),
        Err(errors) => errors,
    };
    if let Some(Err(line_errors)) = lines.map(Validate::validate) {
        errors.errors_mut().extend(line_errors.into_errors());
    }
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(AppError::ValidationError(errors))
    }
}

async fn require_invoice(
    tx: &mut dyn StoreTransaction,
    invoice_id: Uuid,
) -> Result<Invoice, AppError> {
    tx.get_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))
}

/// The line, provided it belongs to `invoice_id`.
async fn require_line(
    tx: &mut dyn StoreTransaction,
    invoice_id: Uuid,
    line_id: Uuid,
) -> Result<InvoiceLine, AppError> {
    tx.get_line(line_id)
        .await?
        .filter(|line| line.invoice_id == invoice_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice line not found")))
}

async fn ensure_number_free(
    tx: &mut dyn StoreTransaction,
    invoice_number: &str,
    exclude: Option<Uuid>,
) -> Result<(), AppError> {
    if tx.invoice_number_taken(invoice_number, exclude).await? {
        return Err(AppError::field_conflict(
            "invoice_number",
            "This invoice number already exists",
        ));
    }
    Ok(())
}

/// `FAC-YYYYMM-NNNN` for the month of `invoice_date`, skipping numbers
/// already taken (e.g. after a deletion lowered the month's count).
async fn next_invoice_number(
    tx: &mut dyn StoreTransaction,
    invoice_date: NaiveDate,
) -> Result<String, AppError> {
    let (start, end) = period_bounds(invoice_date);
    let mut existing = tx.count_invoices_between(start, end).await?;
    loop {
        let candidate =
            generate_invoice_number(invoice_date.year(), invoice_date.month(), existing);
        if !tx.invoice_number_taken(&candidate, None).await? {
            return Ok(candidate);
        }
        existing += 1;
    }
}

async fn with_lines(
    tx: &mut dyn StoreTransaction,
    page: Page<Invoice>,
) -> Result<Page<InvoiceWithLines>, AppError> {
    let mut data = Vec::with_capacity(page.data.len());
    for invoice in &page.data {
        let lines = tx.get_lines(invoice.invoice_id).await?;
        data.push(lines);
    }
    let mut lines = data.into_iter();
    Ok(page.map(|invoice| InvoiceWithLines {
        invoice,
        lines: lines.next().unwrap_or_default(),
    }))
}
