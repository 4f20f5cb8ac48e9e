//! Invoice handlers: issuing, querying and status overrides.
//!
//! Issuing and every status override are administrator operations; reads only
//! require an authenticated actor.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mongodb::bson::DateTime;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        BulkStatusRequest, BulkStatusResponse, CreateInvoiceRequest, InvoiceResponse,
        ListInvoicesQuery, SweepResponse, UpdateInvoiceStatusRequest,
    },
    middleware::{ActorContext, AdminContext},
    models::{InvoiceFilter, InvoiceStatus},
    AppState,
};

fn parse_status(value: &str) -> Result<InvoiceStatus, AppError> {
    InvoiceStatus::parse(value)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("unknown invoice status '{}'", value)))
}

/// Issue a new invoice for a user.
pub async fn create_invoice(
    State(state): State<AppState>,
    admin: AdminContext,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    payload.validate()?;
    if state.users.find(payload.user_id).await?.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "user {} not found",
            payload.user_id
        )));
    }

    tracing::info!(
        user_id = %payload.user_id,
        period = %payload.period,
        actor_id = %admin.actor_id,
        "Creating invoice"
    );

    let invoice = state
        .invoice_service
        .create(payload.into_new_invoice())
        .await?;
    Ok((StatusCode::CREATED, Json(InvoiceResponse::from(invoice))))
}

/// List invoices, optionally filtered by user, status and period.
pub async fn list_invoices(
    State(state): State<AppState>,
    _actor: ActorContext,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<InvoiceResponse>>, AppError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let filter = InvoiceFilter {
        user_id: query.user_id,
        status,
        period: query.period,
        limit: query.limit,
    };

    let invoices = state.invoice_service.list(&filter).await?;
    Ok(Json(invoices.into_iter().map(Into::into).collect()))
}

/// Get a single invoice by ID.
pub async fn get_invoice(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state.invoice_service.get(invoice_id).await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

/// Apply a status transition to a single invoice.
pub async fn update_invoice_status(
    State(state): State<AppState>,
    admin: AdminContext,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<UpdateInvoiceStatusRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    payload.validate()?;
    let to = parse_status(&payload.new_status)?;

    let invoice = state
        .invoice_service
        .transition(invoice_id, to, &admin.actor_id)
        .await?;
    Ok(Json(InvoiceResponse::from(invoice)))
}

/// Apply one status transition to a batch of invoices, all-or-nothing.
pub async fn bulk_update_status(
    State(state): State<AppState>,
    admin: AdminContext,
    Json(payload): Json<BulkStatusRequest>,
) -> Result<Json<BulkStatusResponse>, AppError> {
    payload.validate()?;
    let to = parse_status(&payload.new_status)?;

    tracing::info!(
        invoice_count = payload.invoice_ids.len(),
        new_status = %to,
        actor_id = %admin.actor_id,
        "Bulk status override requested"
    );

    let outcome = state
        .admin_service
        .bulk_update_status(&payload.invoice_ids, to, &payload.reason, &admin.actor_id)
        .await?;
    Ok(Json(BulkStatusResponse::from(outcome)))
}

/// Run the due-date sweep on demand.
pub async fn sweep_overdue(
    State(state): State<AppState>,
    admin: AdminContext,
) -> Result<Json<SweepResponse>, AppError> {
    tracing::info!(actor_id = %admin.actor_id, "Manual overdue sweep requested");
    let report = state.invoice_service.sweep_overdue(DateTime::now()).await?;
    Ok(Json(SweepResponse::from(report)))
}
