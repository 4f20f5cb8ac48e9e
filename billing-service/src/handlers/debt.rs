//! Debt, reconciliation and audit handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{
        AuditQuery, AuditRecordResponse, ConsistencyResponse, ResyncResponse, StatisticsResponse,
        UserDebtResponse,
    },
    middleware::{ActorContext, AdminContext},
    models::{InvoiceFilter, InvoiceStatus},
    AppState,
};

const DEFAULT_AUDIT_LIMIT: i64 = 50;
const MAX_AUDIT_LIMIT: i64 = 500;

/// Get a user's debt summary with their outstanding invoices.
pub async fn user_debt(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserDebtResponse>, AppError> {
    let user = state
        .users
        .find(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("user {} not found", user_id)))?;

    let mut invoices = state
        .invoice_service
        .list(&InvoiceFilter {
            user_id: Some(user_id),
            ..InvoiceFilter::default()
        })
        .await?;
    invoices.retain(|invoice| {
        !invoice.paid
            && matches!(
                invoice.status,
                InvoiceStatus::Pending | InvoiceStatus::Overdue
            )
    });

    Ok(Json(UserDebtResponse::new(user, &invoices)))
}

/// Aggregate debt figures across the portal.
pub async fn statistics(
    State(state): State<AppState>,
    _admin: AdminContext,
) -> Result<Json<StatisticsResponse>, AppError> {
    let stats = state.reconciliation.statistics().await?;
    Ok(Json(StatisticsResponse::from(stats)))
}

/// Read-only consistency check: reports drift without changing anything.
pub async fn consistency(
    State(state): State<AppState>,
    _admin: AdminContext,
) -> Result<Json<ConsistencyResponse>, AppError> {
    let report = state.reconciliation.validate_consistency().await?;
    Ok(Json(ConsistencyResponse::from(report)))
}

/// Repair stranded settlements and rebuild every debt figure from the
/// invoices themselves.
pub async fn resync(
    State(state): State<AppState>,
    admin: AdminContext,
) -> Result<Json<ResyncResponse>, AppError> {
    tracing::info!(actor_id = %admin.actor_id, "Debt resync requested");
    let report = state.reconciliation.resync(&admin.actor_id).await?;
    Ok(Json(ResyncResponse::from(report)))
}

/// Most recent audit records, newest first.
pub async fn audit_log(
    State(state): State<AppState>,
    _admin: AdminContext,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditRecordResponse>>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let records = state.audit.recent(limit).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}
