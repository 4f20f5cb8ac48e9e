//! Administrative bulk status override.
//!
//! The batch is validated as a unit before anything is written: one paid or
//! missing invoice, or one illegal transition, rejects the whole request with
//! nothing applied. After the writes start, bookkeeping follows the fixed
//! order invoice status -> debt projection -> income records -> audit record.

use crate::models::{AuditRecord, IncomeRecord, Invoice, InvoiceStatus, StatusChange};
use crate::services::debt::{tolerate_projection, DebtProjector};
use crate::services::metrics::{ERRORS_TOTAL, INVOICES_TOTAL};
use crate::services::store::{AuditStore, InvoiceStore, PaymentStore, UserStore};
use anyhow::anyhow;
use mongodb::bson::DateTime;
use service_core::error::AppError;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct BulkStatusOutcome {
    pub updated_count: u64,
    pub changes: Vec<StatusChange>,
    pub affected_users: Vec<Uuid>,
}

#[derive(Clone)]
pub struct AdminOverrideService {
    invoices: Arc<dyn InvoiceStore>,
    users: Arc<dyn UserStore>,
    payments: Arc<dyn PaymentStore>,
    audit: Arc<dyn AuditStore>,
    projector: DebtProjector,
    /// When set, a failed income record write fails the request (after the
    /// already-applied invoice changes are audited). Off by default: the
    /// treasurer can re-enter an income record, a half-written batch is
    /// worse.
    strict_bookkeeping: bool,
}

impl AdminOverrideService {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        users: Arc<dyn UserStore>,
        payments: Arc<dyn PaymentStore>,
        audit: Arc<dyn AuditStore>,
        projector: DebtProjector,
        strict_bookkeeping: bool,
    ) -> Self {
        Self {
            invoices,
            users,
            payments,
            audit,
            projector,
            strict_bookkeeping,
        }
    }

    pub async fn bulk_update_status(
        &self,
        ids: &[Uuid],
        new_status: InvoiceStatus,
        reason: &str,
        actor_id: &str,
    ) -> Result<BulkStatusOutcome, AppError> {
        if ids.is_empty() {
            return Err(AppError::BadRequest(anyhow!("invoiceIds cannot be empty")));
        }
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest(anyhow!("a reason is required")));
        }

        let invoices = self.invoices.find_many(ids).await?;
        if invoices.len() != ids.len() {
            let found: HashSet<Uuid> = invoices.iter().map(|inv| inv.id).collect();
            let missing: Vec<String> = ids
                .iter()
                .filter(|id| !found.contains(id))
                .map(|id| id.to_string())
                .collect();
            return Err(AppError::NotFound(anyhow!(
                "invoices not found: {}",
                missing.join(", ")
            )));
        }

        // Paid invoices poison the whole batch, listed by folio so the
        // operator can fix the selection.
        let paid_folios: Vec<String> = invoices
            .iter()
            .filter(|inv| inv.paid)
            .map(|inv| inv.folio())
            .collect();
        if !paid_folios.is_empty() {
            return Err(AppError::AlreadyPaid {
                folios: paid_folios,
            });
        }

        for invoice in &invoices {
            invoice.check_transition(new_status)?;
        }

        let now = DateTime::now();
        let mut changes: Vec<StatusChange> = Vec::with_capacity(invoices.len());
        let mut affected_users: Vec<Uuid> = Vec::new();
        // user -> (amount, invoices), ordered for stable income records.
        let mut credits: BTreeMap<Uuid, (i64, Vec<Uuid>)> = BTreeMap::new();

        for invoice in &invoices {
            let applied = if new_status == InvoiceStatus::Paid {
                self.pay_one(invoice, now, &mut credits).await?
            } else {
                self.move_one(invoice, new_status).await?
            };

            if applied {
                INVOICES_TOTAL
                    .with_label_values(&[new_status.as_str()])
                    .inc();
                changes.push(StatusChange {
                    invoice_id: invoice.id,
                    folio: invoice.folio(),
                    old_status: invoice.status,
                    new_status,
                });
                if !affected_users.contains(&invoice.user_id) {
                    affected_users.push(invoice.user_id);
                }
            } else {
                tracing::warn!(
                    invoice_id = %invoice.id,
                    folio = %invoice.folio(),
                    "invoice changed concurrently during bulk override, skipped"
                );
            }
        }

        let mut income_failure: Option<AppError> = None;
        for (user_id, (amount, invoice_ids)) in &credits {
            if let Err(err) = self.users.credit_balance(*user_id, *amount).await {
                ERRORS_TOTAL.with_label_values(&["settlement"]).inc();
                tracing::error!(
                    user_id = %user_id,
                    error = %err,
                    "balance credit failed during bulk settlement"
                );
            }

            let income = IncomeRecord {
                id: Uuid::new_v4(),
                user_id: *user_id,
                amount: *amount,
                invoice_ids: invoice_ids.clone(),
                manual_payment: true,
                actor_id: actor_id.to_string(),
                reason: reason.to_string(),
                created_at: now,
            };
            if let Err(err) = self.payments.insert_income(&income).await {
                ERRORS_TOTAL.with_label_values(&["income_record"]).inc();
                tracing::error!(
                    user_id = %user_id,
                    amount = income.amount,
                    error = %err,
                    "income record write failed"
                );
                if self.strict_bookkeeping && income_failure.is_none() {
                    income_failure = Some(AppError::InternalError(anyhow!(
                        "income record write failed for user {}: {}",
                        user_id,
                        err
                    )));
                }
            }
        }

        let mut record = AuditRecord::bulk_status_update(
            actor_id,
            new_status,
            reason,
            changes.clone(),
            affected_users.clone(),
        );
        if income_failure.is_some() {
            record.outcome = format!(
                "{} invoices updated; income record write failed",
                changes.len()
            );
        }
        if let Err(err) = self.audit.append(&record).await {
            // The state change stands; a missing audit row is an alerting
            // concern, not a rollback trigger.
            let err = AppError::AuditWrite(anyhow::Error::new(err));
            ERRORS_TOTAL.with_label_values(&["audit_write"]).inc();
            tracing::error!(actor_id, error = %err, "bulk override audit write failed");
        }

        tracing::info!(
            actor_id,
            new_status = %new_status,
            requested = ids.len(),
            updated = changes.len(),
            "bulk status override applied"
        );

        if let Some(err) = income_failure {
            return Err(err);
        }
        Ok(BulkStatusOutcome {
            updated_count: changes.len() as u64,
            changes,
            affected_users,
        })
    }

    async fn pay_one(
        &self,
        invoice: &Invoice,
        now: DateTime,
        credits: &mut BTreeMap<Uuid, (i64, Vec<Uuid>)>,
    ) -> Result<bool, AppError> {
        match self.invoices.mark_paid(invoice.id, now).await? {
            Some(before) => {
                if before.status == InvoiceStatus::Overdue {
                    tolerate_projection(self.projector.invoice_left_overdue(&before).await);
                }
                let entry = credits.entry(invoice.user_id).or_insert((0, Vec::new()));
                entry.0 += invoice.total_amount;
                entry.1.push(invoice.id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn move_one(&self, invoice: &Invoice, to: InvoiceStatus) -> Result<bool, AppError> {
        let applied = self.invoices.set_status(invoice.id, invoice.status, to).await?;
        if applied {
            match (invoice.status, to) {
                (InvoiceStatus::Pending, InvoiceStatus::Overdue) => {
                    tolerate_projection(self.projector.invoice_became_overdue(invoice).await);
                }
                (InvoiceStatus::Overdue, InvoiceStatus::Voided) => {
                    tolerate_projection(self.projector.invoice_left_overdue(invoice).await);
                }
                _ => {}
            }
        }
        Ok(applied)
    }
}
