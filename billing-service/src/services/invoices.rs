//! Invoice lifecycle orchestration: issuing, status transitions and the
//! due-date sweep.

use crate::models::{
    BillingDetail, Invoice, InvoiceFilter, InvoiceStatus, NewInvoice, TransitionCheck,
};
use crate::services::debt::{tolerate_projection, DebtProjector};
use crate::services::metrics::{INVOICES_TOTAL, SWEEP_TRANSITIONS_TOTAL};
use crate::services::store::InvoiceStore;
use anyhow::anyhow;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

/// Result of one due-date sweep pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub examined: u64,
    pub transitioned: u64,
}

fn validation_error(field: &'static str, code: &'static str, message: &str) -> AppError {
    let mut errors = validator::ValidationErrors::new();
    let mut error = validator::ValidationError::new(code);
    error.message = Some(message.to_string().into());
    errors.add(field, error);
    AppError::ValidationError(errors)
}

fn valid_period(period: &str) -> bool {
    let bytes = period.as_bytes();
    bytes.len() == 7
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..].iter().all(u8::is_ascii_digit)
        && &period[5..] >= "01"
        && &period[5..] <= "12"
}

#[derive(Clone)]
pub struct InvoiceService {
    invoices: Arc<dyn InvoiceStore>,
    projector: DebtProjector,
}

impl InvoiceService {
    pub fn new(invoices: Arc<dyn InvoiceStore>, projector: DebtProjector) -> Self {
        Self { invoices, projector }
    }

    /// Issues a new invoice in `pendiente` with the next sequential number
    /// for its billing period.
    pub async fn create(&self, input: NewInvoice) -> Result<Invoice, AppError> {
        if !valid_period(&input.period) {
            return Err(validation_error(
                "period",
                "format",
                "period must be YYYY-MM",
            ));
        }
        if input.previous_reading < 0 || input.current_reading < 0 {
            return Err(validation_error(
                "currentReading",
                "negative",
                "meter readings cannot be negative",
            ));
        }

        let consumption = match input.consumption_override {
            Some(value) if value >= 0 => value,
            Some(_) => {
                return Err(validation_error(
                    "consumptionOverride",
                    "negative",
                    "consumption override cannot be negative",
                ));
            }
            None => {
                if input.current_reading < input.previous_reading {
                    return Err(validation_error(
                        "currentReading",
                        "rollover",
                        "current reading is below the previous one; a consumption override is required",
                    ));
                }
                input.current_reading - input.previous_reading
            }
        };

        let detail = BillingDetail {
            fixed_charge: input.fixed_charge,
            consumption_cost: consumption * input.price_per_m3,
            other_charges: input.other_charges,
            discounts: input.discounts,
            surcharges: input.surcharges,
            tariff_snapshot: input.tariff_snapshot,
        };
        let total = detail.total();
        if total < 0 {
            return Err(validation_error(
                "discounts",
                "negative_total",
                "discounts exceed the charged amount",
            ));
        }

        let number = self.invoices.next_number(&input.period).await?;
        let now = DateTime::now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            number,
            period: input.period,
            user_id: input.user_id,
            issued_at: now,
            due_date: input.due_date,
            previous_reading: input.previous_reading,
            current_reading: input.current_reading,
            consumption_m3: consumption,
            total_amount: total,
            detail,
            status: InvoiceStatus::Pending,
            paid: false,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        self.invoices.insert(&invoice).await?;

        INVOICES_TOTAL
            .with_label_values(&[InvoiceStatus::Pending.as_str()])
            .inc();
        tracing::info!(
            invoice_id = %invoice.id,
            folio = %invoice.folio(),
            user_id = %invoice.user_id,
            total_amount = invoice.total_amount,
            "invoice created"
        );
        Ok(invoice)
    }

    pub async fn get(&self, id: Uuid) -> Result<Invoice, AppError> {
        self.invoices
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("invoice {} not found", id)))
    }

    pub async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, AppError> {
        self.invoices.list(filter).await
    }

    /// Applies a single status transition, projecting debt deltas for moves
    /// into or out of `vencida`.
    pub async fn transition(
        &self,
        id: Uuid,
        to: InvoiceStatus,
        actor: &str,
    ) -> Result<Invoice, AppError> {
        let invoice = self.get(id).await?;
        match invoice.check_transition(to)? {
            TransitionCheck::NoOp => return Ok(invoice),
            TransitionCheck::Apply => {}
        }

        let updated = if to == InvoiceStatus::Paid {
            let now = DateTime::now();
            match self.invoices.mark_paid(id, now).await? {
                Some(before) => {
                    if before.status == InvoiceStatus::Overdue {
                        tolerate_projection(self.projector.invoice_left_overdue(&before).await);
                    }
                    let mut after = before;
                    after.status = InvoiceStatus::Paid;
                    after.paid = true;
                    after.paid_at = Some(now);
                    after
                }
                // Someone settled it in between; paid is paid.
                None => self.get(id).await?,
            }
        } else {
            let applied = self.invoices.set_status(id, invoice.status, to).await?;
            if !applied {
                return Err(AppError::Conflict(anyhow!(
                    "invoice {} changed concurrently",
                    invoice.folio()
                )));
            }
            match (invoice.status, to) {
                (InvoiceStatus::Pending, InvoiceStatus::Overdue) => {
                    tolerate_projection(self.projector.invoice_became_overdue(&invoice).await);
                }
                (InvoiceStatus::Overdue, InvoiceStatus::Voided) => {
                    tolerate_projection(self.projector.invoice_left_overdue(&invoice).await);
                }
                _ => {}
            }
            let mut after = invoice.clone();
            after.status = to;
            after
        };

        INVOICES_TOTAL.with_label_values(&[to.as_str()]).inc();
        tracing::info!(
            invoice_id = %id,
            folio = %updated.folio(),
            from = %invoice.status,
            to = %to,
            actor,
            "invoice status changed"
        );
        Ok(updated)
    }

    /// Moves every unpaid pending invoice past its due date into `vencida`.
    /// Safe to re-run: the guarded status update skips invoices that were
    /// paid or already swept since the candidate list was read.
    pub async fn sweep_overdue(&self, now: DateTime) -> Result<SweepReport, AppError> {
        let due = self.invoices.due_before(now).await?;
        let mut report = SweepReport {
            examined: due.len() as u64,
            ..SweepReport::default()
        };

        for invoice in &due {
            match self
                .invoices
                .set_status(invoice.id, InvoiceStatus::Pending, InvoiceStatus::Overdue)
                .await
            {
                Ok(true) => {
                    report.transitioned += 1;
                    SWEEP_TRANSITIONS_TOTAL.inc();
                    INVOICES_TOTAL
                        .with_label_values(&[InvoiceStatus::Overdue.as_str()])
                        .inc();
                    tolerate_projection(self.projector.invoice_became_overdue(invoice).await);
                }
                Ok(false) => {
                    // Paid or swept by a competing run since we listed it.
                }
                Err(err) => {
                    tracing::warn!(
                        invoice_id = %invoice.id,
                        error = %err,
                        "sweep could not transition invoice"
                    );
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            transitioned = report.transitioned,
            "overdue sweep finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_format() {
        assert!(valid_period("2025-08"));
        assert!(valid_period("1999-12"));
        assert!(!valid_period("2025-13"));
        assert!(!valid_period("2025-00"));
        assert!(!valid_period("2025-8"));
        assert!(!valid_period("202508"));
        assert!(!valid_period("2025/08"));
    }
}
