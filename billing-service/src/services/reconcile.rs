//! Debt reconciliation: the authoritative rebuild of every user's
//! `deudaTotal`, plus the repair pass for settlements lost mid-crash.
//!
//! Incremental projection is the fast path and this module is the safety
//! net. Running it is always safe: on a consistent database it changes
//! nothing, and running it twice in a row is a no-op.

use crate::models::{AuditRecord, DebtSnapshot};
use crate::services::debt::DebtProjector;
use crate::services::metrics::{DEBT_CORRECTIONS_TOTAL, ERRORS_TOTAL, RESYNC_RUNS_TOTAL};
use crate::services::payments::{settle_invoice, SettleOutcome};
use crate::services::store::{AuditStore, InvoiceStore, PaymentStore, UserStore};
use mongodb::bson::{doc, DateTime};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ResyncReport {
    pub users_processed: u64,
    pub users_with_changes: u64,
    pub total_debt_before: i64,
    pub total_debt_after: i64,
    /// Stranded completed payments whose invoices were settled by the
    /// repair pass.
    pub repaired_settlements: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DebtViolation {
    pub user_id: Uuid,
    pub stored: i64,
    pub computed: i64,
}

#[derive(Debug, Clone)]
pub struct UnsettledPayment {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ConsistencyReport {
    pub users_checked: u64,
    pub debt_violations: Vec<DebtViolation>,
    pub unsettled_payments: Vec<UnsettledPayment>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DebtStatistics {
    pub users_with_debt: u64,
    pub total_debt: i64,
    pub overdue_invoices: u64,
    pub overdue_amount: i64,
}

#[derive(Clone)]
pub struct ReconciliationService {
    invoices: Arc<dyn InvoiceStore>,
    users: Arc<dyn UserStore>,
    payments: Arc<dyn PaymentStore>,
    audit: Arc<dyn AuditStore>,
    projector: DebtProjector,
    /// Absolute drift below or at this threshold is left alone. Zero means
    /// every mismatch is corrected.
    drift_tolerance: i64,
}

impl ReconciliationService {
    pub fn new(
        invoices: Arc<dyn InvoiceStore>,
        users: Arc<dyn UserStore>,
        payments: Arc<dyn PaymentStore>,
        audit: Arc<dyn AuditStore>,
        projector: DebtProjector,
        drift_tolerance: i64,
    ) -> Self {
        Self {
            invoices,
            users,
            payments,
            audit,
            projector,
            drift_tolerance,
        }
    }

    /// Full reconciliation: repair stranded settlements, then overwrite every
    /// drifted `deudaTotal` with the sum computed from the invoices.
    pub async fn resync(&self, actor_id: &str) -> Result<ResyncReport, AppError> {
        RESYNC_RUNS_TOTAL.inc();
        let mut report = ResyncReport::default();

        self.repair_stranded_settlements(&mut report).await?;

        // The debt pass reads its baseline after the repair pass so repaired
        // invoices are already out of the computed totals.
        let expected = self.invoices.overdue_totals().await?;
        let snapshots = self.users.debt_snapshots().await?;
        let mut corrected_users: Vec<Uuid> = Vec::new();

        report.users_processed = snapshots.len() as u64;
        for snapshot in &snapshots {
            report.total_debt_before += snapshot.debt_total;
            let target = expected.get(&snapshot.user_id).copied().unwrap_or(0);

            if (snapshot.debt_total - target).abs() <= self.drift_tolerance {
                report.total_debt_after += snapshot.debt_total;
                continue;
            }

            match self.users.overwrite_debt(snapshot.user_id, target).await {
                Ok(Some(previous)) => {
                    report.users_with_changes += 1;
                    report.total_debt_after += target;
                    corrected_users.push(snapshot.user_id);
                    DEBT_CORRECTIONS_TOTAL.inc();
                    tracing::warn!(
                        user_id = %snapshot.user_id,
                        stored = previous,
                        computed = target,
                        "debt drift corrected"
                    );
                }
                Ok(None) => {
                    // Account vanished between snapshot and overwrite.
                    report
                        .errors
                        .push(format!("user {} disappeared during resync", snapshot.user_id));
                }
                Err(err) => {
                    report.total_debt_after += snapshot.debt_total;
                    report
                        .errors
                        .push(format!("user {}: {}", snapshot.user_id, err));
                    ERRORS_TOTAL.with_label_values(&["resync"]).inc();
                }
            }
        }

        let outcome = if report.errors.is_empty() {
            "ok".to_string()
        } else {
            format!("completed with {} errors", report.errors.len())
        };
        let detail = doc! {
            "usersProcessed": report.users_processed as i64,
            "usersWithChanges": report.users_with_changes as i64,
            "totalDebtBefore": report.total_debt_before,
            "totalDebtAfter": report.total_debt_after,
            "repairedSettlements": report.repaired_settlements as i64,
            "errors": report.errors.len() as i64,
        };
        let record = AuditRecord::debt_resync(actor_id, corrected_users, detail, outcome);
        if let Err(err) = self.audit.append(&record).await {
            let err = AppError::AuditWrite(anyhow::Error::new(err));
            ERRORS_TOTAL.with_label_values(&["audit_write"]).inc();
            tracing::error!(actor_id, error = %err, "resync audit write failed");
        }

        tracing::info!(
            actor_id,
            users_processed = report.users_processed,
            users_with_changes = report.users_with_changes,
            total_debt_before = report.total_debt_before,
            total_debt_after = report.total_debt_after,
            repaired_settlements = report.repaired_settlements,
            "debt resync finished"
        );
        Ok(report)
    }

    /// A payment that reached `completado` while its invoice stayed unpaid
    /// means the process died between the completion barrier and settlement.
    /// Settling it here finishes the interrupted write.
    async fn repair_stranded_settlements(
        &self,
        report: &mut ResyncReport,
    ) -> Result<(), AppError> {
        let unpaid = self.invoices.unpaid().await?;
        if unpaid.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = unpaid.iter().map(|invoice| invoice.id).collect();
        let stranded = self.payments.completed_for_invoices(&ids).await?;

        for payment in &stranded {
            let now = DateTime::now();
            match settle_invoice(&self.invoices, &self.users, &self.projector, payment, now).await
            {
                SettleOutcome::Settled { .. } => {
                    report.repaired_settlements += 1;
                    tracing::info!(
                        payment_id = %payment.id,
                        invoice_id = %payment.invoice_id,
                        "repaired stranded settlement"
                    );
                }
                SettleOutcome::AlreadySettled | SettleOutcome::Lost => {}
                SettleOutcome::Failed(cause) => {
                    report
                        .errors
                        .push(format!("payment {}: {}", payment.id, cause));
                }
            }
        }
        Ok(())
    }

    /// Read-only consistency check: reports drifted debt totals and
    /// completed payments whose invoices were never settled, without
    /// mutating anything.
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport, AppError> {
        let expected = self.invoices.overdue_totals().await?;
        let snapshots = self.users.debt_snapshots().await?;
        let mut report = ConsistencyReport {
            users_checked: snapshots.len() as u64,
            ..ConsistencyReport::default()
        };

        for snapshot in &snapshots {
            let target = expected.get(&snapshot.user_id).copied().unwrap_or(0);
            if (snapshot.debt_total - target).abs() > self.drift_tolerance {
                report.debt_violations.push(DebtViolation {
                    user_id: snapshot.user_id,
                    stored: snapshot.debt_total,
                    computed: target,
                });
            }
        }

        let unpaid = self.invoices.unpaid().await?;
        if !unpaid.is_empty() {
            let ids: Vec<Uuid> = unpaid.iter().map(|invoice| invoice.id).collect();
            for payment in self.payments.completed_for_invoices(&ids).await? {
                report.unsettled_payments.push(UnsettledPayment {
                    payment_id: payment.id,
                    invoice_id: payment.invoice_id,
                    user_id: payment.user_id,
                    amount: payment.amount,
                });
            }
        }

        Ok(report)
    }

    pub async fn statistics(&self) -> Result<DebtStatistics, AppError> {
        let snapshots: Vec<DebtSnapshot> = self.users.debt_snapshots().await?;
        let overdue = self.invoices.overdue_stats().await?;
        Ok(DebtStatistics {
            users_with_debt: snapshots.iter().filter(|s| s.debt_total > 0).count() as u64,
            total_debt: snapshots.iter().map(|s| s.debt_total).sum(),
            overdue_invoices: overdue.invoices,
            overdue_amount: overdue.amount,
        })
    }
}
