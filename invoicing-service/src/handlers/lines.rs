//! Invoice line endpoints. Every response carries the whole invoice so the
//! caller sees the recomputed totals.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    models::{InvoiceWithLines, LineInput, LineSet},
    startup::AppState,
};

pub async fn replace_lines(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<LineSet>,
) -> Result<Json<InvoiceWithLines>, AppError> {
    Ok(Json(
        state
            .invoices
            .replace_invoice_lines(invoice_id, payload)
            .await?,
    ))
}

pub async fn add_line(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<LineInput>,
) -> Result<(StatusCode, Json<InvoiceWithLines>), AppError> {
    let invoice = state.invoices.add_line(invoice_id, payload).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn update_line(
    State(state): State<AppState>,
    Path((invoice_id, line_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<LineInput>,
) -> Result<Json<InvoiceWithLines>, AppError> {
    Ok(Json(
        state
            .invoices
            .update_line(invoice_id, line_id, payload)
            .await?,
    ))
}

pub async fn delete_line(
    State(state): State<AppState>,
    Path((invoice_id, line_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<InvoiceWithLines>, AppError> {
    Ok(Json(
        state.invoices.delete_line(invoice_id, line_id).await?,
    ))
}
