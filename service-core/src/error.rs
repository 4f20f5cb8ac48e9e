use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Shared error taxonomy for the billing services.
///
/// Domain variants carry enough context to be logged and rendered without
/// re-fetching anything: `AlreadyPaid` lists every offending folio,
/// `Projection` records the exact delta that could not be applied.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Invoice {folio} is paid and can no longer change state")]
    ImmutableInvoice { folio: String },

    #[error("Invoices already paid: {}", .folios.join(", "))]
    AlreadyPaid { folios: Vec<String> },

    #[error("Illegal invoice status transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Debt projection failed for invoice {invoice_id} (user {user_id}, delta {delta}): {cause}")]
    Projection {
        invoice_id: Uuid,
        user_id: Uuid,
        delta: i64,
        cause: anyhow::Error,
    },

    #[error("Audit trail write failed: {0}")]
    AuditWrite(anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error_message, details) = match self {
            AppError::ValidationError(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(err.to_string()),
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string(), None),
            AppError::Forbidden(err) => (StatusCode::FORBIDDEN, err.to_string(), None),
            AppError::Conflict(err) => (StatusCode::CONFLICT, err.to_string(), None),
            AppError::ImmutableInvoice { folio } => (
                StatusCode::FORBIDDEN,
                format!("Invoice {} is paid and can no longer change state", folio),
                None,
            ),
            AppError::AlreadyPaid { folios } => (
                StatusCode::FORBIDDEN,
                "Invoices already paid".to_string(),
                Some(folios.join(", ")),
            ),
            AppError::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                format!("Illegal invoice status transition: {} -> {}", from, to),
                None,
            ),
            AppError::Projection {
                invoice_id,
                user_id,
                delta,
                cause,
            } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Debt projection error".to_string(),
                Some(format!(
                    "invoice {} user {} delta {}: {}",
                    invoice_id, user_id, delta, cause
                )),
            ),
            AppError::AuditWrite(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Audit trail write failed".to_string(),
                Some(err.to_string()),
            ),
            AppError::DatabaseError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                Some(err.to_string()),
            ),
            AppError::InternalError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(format!("{:#?}", err)),
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_paid_lists_every_folio() {
        let err = AppError::AlreadyPaid {
            folios: vec!["2025-07-12".to_string(), "2025-08-3".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Invoices already paid: 2025-07-12, 2025-08-3"
        );
    }

    #[test]
    fn test_transition_error_names_both_states() {
        let err = AppError::InvalidTransition {
            from: "pagada",
            to: "pendiente",
        };
        assert!(err.to_string().contains("pagada -> pendiente"));
    }
}
