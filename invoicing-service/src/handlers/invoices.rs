//! Invoice endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::ListInvoicesQuery,
    models::{CreateInvoice, InvoiceStatistics, InvoiceWithLines, Page, UpdateInvoice},
    startup::AppState,
};

pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Page<InvoiceWithLines>>, AppError> {
    let filter = query.into_filter(state.config.pagination.default_per_page);
    Ok(Json(state.invoices.list_invoices(filter).await?))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    Json(payload): Json<CreateInvoice>,
) -> Result<(StatusCode, Json<InvoiceWithLines>), AppError> {
    tracing::info!(
        client_id = %payload.client_id,
        lines = payload.lines.len(),
        "Creating invoice"
    );

    let invoice = state.invoices.create_invoice(payload).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceWithLines>, AppError> {
    Ok(Json(state.invoices.get_invoice(invoice_id).await?))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<UpdateInvoice>,
) -> Result<Json<InvoiceWithLines>, AppError> {
    Ok(Json(
        state.invoices.update_invoice(invoice_id, payload).await?,
    ))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.invoices.delete_invoice(invoice_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn invoice_statistics(
    State(state): State<AppState>,
) -> Result<Json<InvoiceStatistics>, AppError> {
    let today = Utc::now().date_naive();
    Ok(Json(state.invoices.statistics(today).await?))
}
