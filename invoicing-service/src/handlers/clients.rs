//! Client endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{ListClientsQuery, PageQuery},
    models::{
        Client, ClientStatistics, ClientSummary, CreateClient, InvoiceWithLines, Page,
        UpdateClient,
    },
    startup::AppState,
};

pub async fn list_clients(
    State(state): State<AppState>,
    Query(query): Query<ListClientsQuery>,
) -> Result<Json<Page<Client>>, AppError> {
    let filter = query.into_filter(state.config.pagination.default_per_page);
    Ok(Json(state.clients.list_clients(filter).await?))
}

pub async fn create_client(
    State(state): State<AppState>,
    Json(payload): Json<CreateClient>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    let client = state.clients.create_client(payload).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ClientSummary>, AppError> {
    Ok(Json(state.clients.get_client(client_id).await?))
}

pub async fn update_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
    Json(payload): Json<UpdateClient>,
) -> Result<Json<Client>, AppError> {
    Ok(Json(state.clients.update_client(client_id, payload).await?))
}

pub async fn delete_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.clients.delete_client(client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The client's invoices, newest first.
pub async fn list_client_invoices(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<InvoiceWithLines>>, AppError> {
    let page = query.into_request(state.config.pagination.default_per_page);
    Ok(Json(
        state.invoices.list_client_invoices(client_id, page).await?,
    ))
}

pub async fn client_statistics(
    State(state): State<AppState>,
) -> Result<Json<ClientStatistics>, AppError> {
    Ok(Json(state.clients.statistics().await?))
}
