//! Debt projection: turns invoice lifecycle events into `deudaTotal` deltas.
//!
//! Only the `vencida` status contributes to a user's debt. Callers hand the
//! projector the invoice snapshot taken before the transition was applied;
//! if that snapshot is already settled there is nothing to project, which is
//! what makes retried transitions safe.

use crate::models::Invoice;
use crate::services::metrics::ERRORS_TOTAL;
use crate::services::store::UserStore;
use service_core::error::AppError;
use std::sync::Arc;

#[derive(Clone)]
pub struct DebtProjector {
    users: Arc<dyn UserStore>,
}

impl DebtProjector {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Invoice entered `vencida`: its total joins the user's debt.
    pub async fn invoice_became_overdue(&self, invoice: &Invoice) -> Result<(), AppError> {
        self.apply(invoice, invoice.total_amount).await
    }

    /// Invoice left `vencida` (settled or voided): its total leaves the debt.
    pub async fn invoice_left_overdue(&self, invoice: &Invoice) -> Result<(), AppError> {
        self.apply(invoice, -invoice.total_amount).await
    }

    async fn apply(&self, invoice: &Invoice, delta: i64) -> Result<(), AppError> {
        if invoice.paid {
            tracing::debug!(
                invoice_id = %invoice.id,
                "invoice already settled, skipping debt delta"
            );
            return Ok(());
        }
        self.users
            .adjust_debt(invoice.user_id, delta)
            .await
            .map_err(|err| AppError::Projection {
                invoice_id: invoice.id,
                user_id: invoice.user_id,
                delta,
                cause: anyhow::Error::new(err),
            })
    }
}

/// Projection failures never abort the surrounding operation: the invoice
/// transition is already committed and reconciliation rebuilds the figure.
/// They are loud in logs and metrics instead.
pub fn tolerate_projection(result: Result<(), AppError>) {
    if let Err(err) = result {
        ERRORS_TOTAL.with_label_values(&["projection"]).inc();
        tracing::error!(error = %err, "debt projection failed; resync will correct the drift");
    }
}
