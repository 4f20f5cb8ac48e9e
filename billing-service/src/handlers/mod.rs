//! HTTP handlers for billing-service.

pub mod debt;
pub mod invoices;
pub mod payments;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "billing-service",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

pub async fn readiness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ready" })))
}

/// Prometheus exposition endpoint.
pub async fn metrics() -> impl IntoResponse {
    crate::services::get_metrics()
}
