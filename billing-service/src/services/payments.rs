//! Payment registration and the completion path.
//!
//! Completion is split in two: an atomic barrier on the payment document
//! (pending -> completado, first caller wins) and the invoice settlement that
//! follows. Once the barrier is crossed the payment stays completed no matter
//! what happens downstream; settlement failures are logged and repaired by
//! reconciliation, never bubbled back to the gateway.

use crate::models::{Invoice, InvoiceStatus, NewPayment, Payment, PaymentStatus};
use crate::services::debt::{tolerate_projection, DebtProjector};
use crate::services::metrics::{
    ERRORS_TOTAL, INVOICES_TOTAL, PAYMENTS_COMPLETED_TOTAL, PAYMENT_AMOUNT_TOTAL,
};
use crate::services::store::{InvoiceStore, PaymentStore, UserStore};
use anyhow::anyhow;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

/// What `settle_invoice` did for one completed payment.
#[derive(Debug)]
pub(crate) enum SettleOutcome {
    /// This call settled the invoice. `was_overdue` tells whether a debt
    /// delta was projected.
    Settled { was_overdue: bool },
    /// The invoice was already settled; no balance effects.
    AlreadySettled,
    /// A concurrent caller won the settlement race.
    Lost,
    /// Settlement could not be applied; reconciliation will retry.
    Failed(String),
}

/// Settles the invoice a completed payment references: paid flag, debt
/// projection when it was overdue, and the `saldoActual` credit.
///
/// Shared between the live completion path and the reconciliation repair
/// pass so both apply identical balance effects.
pub(crate) async fn settle_invoice(
    invoices: &Arc<dyn InvoiceStore>,
    users: &Arc<dyn UserStore>,
    projector: &DebtProjector,
    payment: &Payment,
    now: DateTime,
) -> SettleOutcome {
    let invoice: Invoice = match invoices.find(payment.invoice_id).await {
        Ok(Some(invoice)) => invoice,
        Ok(None) => {
            ERRORS_TOTAL.with_label_values(&["settlement"]).inc();
            tracing::error!(
                payment_id = %payment.id,
                invoice_id = %payment.invoice_id,
                "completed payment references a missing invoice"
            );
            return SettleOutcome::Failed("invoice not found".to_string());
        }
        Err(err) => {
            ERRORS_TOTAL.with_label_values(&["settlement"]).inc();
            tracing::error!(payment_id = %payment.id, error = %err, "invoice lookup failed");
            return SettleOutcome::Failed(err.to_string());
        }
    };

    if invoice.paid {
        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %invoice.id,
            "invoice already settled, skipping balance effects"
        );
        return SettleOutcome::AlreadySettled;
    }

    match invoices.mark_paid(invoice.id, now).await {
        Ok(Some(before)) => {
            let was_overdue = before.status == InvoiceStatus::Overdue;
            if was_overdue {
                tolerate_projection(projector.invoice_left_overdue(&before).await);
            }
            if let Err(err) = users.credit_balance(payment.user_id, payment.amount).await {
                ERRORS_TOTAL.with_label_values(&["settlement"]).inc();
                tracing::error!(
                    payment_id = %payment.id,
                    user_id = %payment.user_id,
                    error = %err,
                    "balance credit failed after invoice settlement"
                );
            }
            INVOICES_TOTAL
                .with_label_values(&[InvoiceStatus::Paid.as_str()])
                .inc();
            SettleOutcome::Settled { was_overdue }
        }
        Ok(None) => SettleOutcome::Lost,
        Err(err) => {
            ERRORS_TOTAL.with_label_values(&["settlement"]).inc();
            tracing::error!(
                payment_id = %payment.id,
                invoice_id = %invoice.id,
                error = %err,
                "invoice settlement failed; reconciliation repair will settle it"
            );
            SettleOutcome::Failed(err.to_string())
        }
    }
}

/// Outcome handed back to the gateway callback handler.
#[derive(Debug)]
pub struct CompletionOutcome {
    pub payment: Payment,
    /// Whether this call settled the invoice (false on retries and when the
    /// invoice was paid through another payment).
    pub settled_invoice: bool,
    pub already_completed: bool,
}

#[derive(Clone)]
pub struct PaymentService {
    payments: Arc<dyn PaymentStore>,
    invoices: Arc<dyn InvoiceStore>,
    users: Arc<dyn UserStore>,
    projector: DebtProjector,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        invoices: Arc<dyn InvoiceStore>,
        users: Arc<dyn UserStore>,
        projector: DebtProjector,
    ) -> Self {
        Self {
            payments,
            invoices,
            users,
            projector,
        }
    }

    /// Registers a pending payment attempt against an invoice. The amount
    /// must match the invoice total exactly; partial payments are not a
    /// thing in this portal.
    pub async fn register(&self, input: NewPayment) -> Result<Payment, AppError> {
        let invoice = self
            .invoices
            .find(input.invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("invoice {} not found", input.invoice_id)))?;

        if input.amount <= 0 {
            return Err(AppError::BadRequest(anyhow!(
                "payment amount must be positive"
            )));
        }
        if input.amount != invoice.total_amount {
            return Err(AppError::BadRequest(anyhow!(
                "payment amount {} does not match invoice total {}",
                input.amount,
                invoice.total_amount
            )));
        }
        if invoice.paid {
            return Err(AppError::Conflict(anyhow!(
                "invoice {} is already paid",
                invoice.folio()
            )));
        }
        if matches!(
            invoice.status,
            InvoiceStatus::Voided | InvoiceStatus::Archived
        ) {
            return Err(AppError::Conflict(anyhow!(
                "invoice {} is {} and cannot be paid",
                invoice.folio(),
                invoice.status
            )));
        }

        let now = DateTime::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            invoice_id: invoice.id,
            user_id: invoice.user_id,
            amount: input.amount,
            method: input.method,
            status: PaymentStatus::Pending,
            gateway_detail: input.gateway_detail,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.payments.insert(&payment).await?;

        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %invoice.id,
            amount = payment.amount,
            method = %payment.method,
            "payment registered"
        );
        Ok(payment)
    }

    pub async fn get(&self, id: Uuid) -> Result<Payment, AppError> {
        self.payments
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("payment {} not found", id)))
    }

    /// Gateway confirmation callback. Retries and concurrent deliveries land
    /// on the completion barrier and come back as `already_completed`.
    pub async fn complete(&self, id: Uuid) -> Result<CompletionOutcome, AppError> {
        let payment = self.get(id).await?;
        match payment.status {
            PaymentStatus::Completed => {
                return Ok(CompletionOutcome {
                    payment,
                    settled_invoice: false,
                    already_completed: true,
                });
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                return Err(AppError::Conflict(anyhow!(
                    "payment {} is {} and cannot be completed",
                    payment.id,
                    payment.status
                )));
            }
            PaymentStatus::Pending => {}
        }

        let now = DateTime::now();
        if !self.payments.mark_completed(id, now).await? {
            // Lost the barrier race; the other caller owns the settlement.
            let payment = self.get(id).await?;
            return Ok(CompletionOutcome {
                payment,
                settled_invoice: false,
                already_completed: true,
            });
        }

        PAYMENTS_COMPLETED_TOTAL
            .with_label_values(&[payment.method.as_str()])
            .inc();
        PAYMENT_AMOUNT_TOTAL
            .with_label_values(&[payment.method.as_str()])
            .inc_by(payment.amount as f64);

        let outcome = settle_invoice(&self.invoices, &self.users, &self.projector, &payment, now)
            .await;
        let settled = matches!(outcome, SettleOutcome::Settled { .. });

        tracing::info!(
            payment_id = %payment.id,
            invoice_id = %payment.invoice_id,
            settled_invoice = settled,
            "payment completed"
        );

        let mut payment = payment;
        payment.status = PaymentStatus::Completed;
        payment.completed_at = Some(now);
        payment.updated_at = now;
        Ok(CompletionOutcome {
            payment,
            settled_invoice: settled,
            already_completed: false,
        })
    }

    /// Gateway rejection callback. Never touches invoices or balances.
    pub async fn fail(
        &self,
        id: Uuid,
        detail: Option<mongodb::bson::Document>,
    ) -> Result<Payment, AppError> {
        let payment = self.get(id).await?;
        match payment.status {
            PaymentStatus::Completed | PaymentStatus::Refunded => {
                return Err(AppError::Conflict(anyhow!(
                    "payment {} is {} and cannot be failed",
                    payment.id,
                    payment.status
                )));
            }
            PaymentStatus::Failed => return Ok(payment),
            PaymentStatus::Pending => {}
        }

        self.payments.mark_failed(id, detail).await?;
        tracing::info!(payment_id = %id, "payment marked as failed");
        self.get(id).await
    }
}
