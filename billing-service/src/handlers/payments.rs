//! Payment handlers: registration and the gateway callback pair.
//!
//! `complete` and `fail` are invoked by the payment gateway's webhook relay.
//! Both are idempotent so redelivered callbacks are harmless.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        CompletePaymentResponse, FailPaymentRequest, PaymentResponse, RegisterPaymentRequest,
    },
    middleware::ActorContext,
    models::{NewPayment, PaymentMethod},
    AppState,
};

/// Register a pending payment attempt against an invoice.
pub async fn register_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(payload): Json<RegisterPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    payload.validate()?;
    let method = PaymentMethod::parse(&payload.method).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!(
            "unknown payment method '{}'",
            payload.method
        ))
    })?;

    tracing::info!(
        invoice_id = %payload.invoice_id,
        amount = payload.amount,
        method = %method,
        actor_id = %actor.actor_id,
        "Registering payment"
    );

    let input = NewPayment {
        invoice_id: payload.invoice_id,
        amount: payload.amount,
        method,
        gateway_detail: payload.gateway_document(),
    };
    let payment = state.payment_service.register(input).await?;
    Ok((StatusCode::CREATED, Json(PaymentResponse::from(payment))))
}

/// Get a payment by ID.
pub async fn get_payment(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state.payment_service.get(payment_id).await?;
    Ok(Json(PaymentResponse::from(payment)))
}

/// Gateway confirmation callback.
pub async fn complete_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<CompletePaymentResponse>, AppError> {
    let outcome = state.payment_service.complete(payment_id).await?;
    Ok(Json(CompletePaymentResponse::from(outcome)))
}

/// Gateway rejection callback. The body is optional; when present its
/// `gatewayDetail` is stored on the payment for dispute handling.
pub async fn fail_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    payload: Option<Json<FailPaymentRequest>>,
) -> Result<Json<PaymentResponse>, AppError> {
    let detail = payload
        .map(|Json(body)| body.gateway_detail)
        .unwrap_or_default()
        .map(crate::dtos::value_to_document);

    let payment = state.payment_service.fail(payment_id, detail).await?;
    Ok(Json(PaymentResponse::from(payment)))
}
