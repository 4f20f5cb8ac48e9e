//! Request and response shapes for the HTTP API.
//!
//! JSON keys are camelCase English; status values stay the stored Spanish
//! strings (`pendiente`, `pagada`, ...). Monetary fields are CLP minor units.

use crate::models::{
    Invoice, InvoiceStatus, NewInvoice, Payment, PaymentStatus, StatusChange, UserAccount,
};
use crate::services::{
    BulkStatusOutcome, CompletionOutcome, ConsistencyReport, DebtStatistics, ResyncReport,
    SweepReport,
};
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub(crate) fn value_to_document(value: serde_json::Value) -> Document {
    match mongodb::bson::to_bson(&value) {
        Ok(Bson::Document(document)) => document,
        Ok(other) => doc! { "value": other },
        Err(err) => {
            tracing::warn!(error = %err, "payload could not be stored as a document, dropping it");
            Document::new()
        }
    }
}

fn document_to_value(document: &Document) -> serde_json::Value {
    serde_json::to_value(document).unwrap_or(serde_json::Value::Null)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TariffInput {
    #[validate(range(min = 0))]
    pub fixed_charge: i64,
    #[validate(range(min = 0))]
    pub price_per_m3: i64,
    #[serde(default)]
    pub other_charges: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub discounts: i64,
    #[serde(default)]
    pub surcharges: i64,
    /// Free-form calculation snapshot, stored verbatim on the invoice.
    #[serde(default)]
    pub calculation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    pub user_id: Uuid,
    #[validate(length(min = 7, max = 7))]
    pub period: String,
    pub due_date: DateTime<Utc>,
    #[validate(range(min = 0))]
    pub previous_reading: i64,
    #[validate(range(min = 0))]
    pub current_reading: i64,
    pub consumption_override: Option<i64>,
    #[validate(nested)]
    pub tariff: TariffInput,
}

impl CreateInvoiceRequest {
    pub fn into_new_invoice(self) -> NewInvoice {
        NewInvoice {
            user_id: self.user_id,
            period: self.period,
            due_date: mongodb::bson::DateTime::from_chrono(self.due_date),
            previous_reading: self.previous_reading,
            current_reading: self.current_reading,
            consumption_override: self.consumption_override,
            fixed_charge: self.tariff.fixed_charge,
            price_per_m3: self.tariff.price_per_m3,
            other_charges: self.tariff.other_charges,
            discounts: self.tariff.discounts,
            surcharges: self.tariff.surcharges,
            tariff_snapshot: self
                .tariff
                .calculation
                .map(value_to_document)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInvoicesQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<String>,
    pub period: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInvoiceStatusRequest {
    #[validate(length(min = 1))]
    pub new_status: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPaymentRequest {
    pub invoice_id: Uuid,
    #[validate(range(min = 1))]
    pub amount: i64,
    pub method: String,
    pub gateway_detail: Option<serde_json::Value>,
}

impl RegisterPaymentRequest {
    pub fn gateway_document(&self) -> Option<Document> {
        self.gateway_detail.clone().map(value_to_document)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailPaymentRequest {
    pub gateway_detail: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    #[validate(length(min = 1))]
    pub invoice_ids: Vec<Uuid>,
    pub new_status: String,
    #[validate(length(min = 3))]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingDetailResponse {
    pub fixed_charge: i64,
    pub consumption_cost: i64,
    pub other_charges: i64,
    pub discounts: i64,
    pub surcharges: i64,
    pub tariff_calculation: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub folio: String,
    pub number: i64,
    pub period: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub previous_reading: i64,
    pub current_reading: i64,
    pub consumption_m3: i64,
    pub total_amount: i64,
    pub detail: BillingDetailResponse,
    pub status: InvoiceStatus,
    pub paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        Self {
            folio: invoice.folio(),
            id: invoice.id,
            number: invoice.number,
            period: invoice.period,
            user_id: invoice.user_id,
            issued_at: invoice.issued_at.to_chrono(),
            due_date: invoice.due_date.to_chrono(),
            previous_reading: invoice.previous_reading,
            current_reading: invoice.current_reading,
            consumption_m3: invoice.consumption_m3,
            total_amount: invoice.total_amount,
            detail: BillingDetailResponse {
                fixed_charge: invoice.detail.fixed_charge,
                consumption_cost: invoice.detail.consumption_cost,
                other_charges: invoice.detail.other_charges,
                discounts: invoice.detail.discounts,
                surcharges: invoice.detail.surcharges,
                tariff_calculation: document_to_value(&invoice.detail.tariff_snapshot),
            },
            status: invoice.status,
            paid: invoice.paid,
            paid_at: invoice.paid_at.map(|at| at.to_chrono()),
        }
    }
}

/// Compact invoice view used inside the user debt response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    pub id: Uuid,
    pub folio: String,
    pub period: String,
    pub status: InvoiceStatus,
    pub total_amount: i64,
    pub due_date: DateTime<Utc>,
    pub paid: bool,
}

impl From<&Invoice> for InvoiceSummary {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id,
            folio: invoice.folio(),
            period: invoice.period.clone(),
            status: invoice.status,
            total_amount: invoice.total_amount,
            due_date: invoice.due_date.to_chrono(),
            paid: invoice.paid,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub method: crate::models::PaymentMethod,
    pub status: PaymentStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            invoice_id: payment.invoice_id,
            user_id: payment.user_id,
            amount: payment.amount,
            method: payment.method,
            status: payment.status,
            completed_at: payment.completed_at.map(|at| at.to_chrono()),
            created_at: payment.created_at.to_chrono(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePaymentResponse {
    pub payment: PaymentResponse,
    pub already_completed: bool,
    pub settled_invoice: bool,
}

impl From<CompletionOutcome> for CompletePaymentResponse {
    fn from(outcome: CompletionOutcome) -> Self {
        Self {
            payment: outcome.payment.into(),
            already_completed: outcome.already_completed,
            settled_invoice: outcome.settled_invoice,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDebtResponse {
    pub user_id: Uuid,
    pub name: String,
    pub service_number: i64,
    pub debt_total: i64,
    pub balance: i64,
    pub invoices: Vec<InvoiceSummary>,
}

impl UserDebtResponse {
    pub fn new(user: UserAccount, invoices: &[Invoice]) -> Self {
        Self {
            user_id: user.id,
            name: user.name,
            service_number: user.service_number,
            debt_total: user.debt_total,
            balance: user.balance,
            invoices: invoices.iter().map(InvoiceSummary::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub examined: u64,
    pub transitioned: u64,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            examined: report.examined,
            transitioned: report.transitioned,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeResponse {
    pub invoice_id: Uuid,
    pub folio: String,
    pub old_status: InvoiceStatus,
    pub new_status: InvoiceStatus,
}

impl From<StatusChange> for StatusChangeResponse {
    fn from(change: StatusChange) -> Self {
        Self {
            invoice_id: change.invoice_id,
            folio: change.folio,
            old_status: change.old_status,
            new_status: change.new_status,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusResponse {
    pub updated_count: u64,
    pub changes: Vec<StatusChangeResponse>,
    pub affected_users: Vec<Uuid>,
}

impl From<BulkStatusOutcome> for BulkStatusResponse {
    fn from(outcome: BulkStatusOutcome) -> Self {
        Self {
            updated_count: outcome.updated_count,
            changes: outcome.changes.into_iter().map(Into::into).collect(),
            affected_users: outcome.affected_users,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncResponse {
    pub users_processed: u64,
    pub users_with_changes: u64,
    pub total_debt_before: i64,
    pub total_debt_after: i64,
    pub repaired_settlements: u64,
    pub errors: Vec<String>,
}

impl From<ResyncReport> for ResyncResponse {
    fn from(report: ResyncReport) -> Self {
        Self {
            users_processed: report.users_processed,
            users_with_changes: report.users_with_changes,
            total_debt_before: report.total_debt_before,
            total_debt_after: report.total_debt_after,
            repaired_settlements: report.repaired_settlements,
            errors: report.errors,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtViolationResponse {
    pub user_id: Uuid,
    pub stored: i64,
    pub computed: i64,
    pub difference: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsettledPaymentResponse {
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyResponse {
    pub users_checked: u64,
    pub debt_violations: Vec<DebtViolationResponse>,
    pub unsettled_payments: Vec<UnsettledPaymentResponse>,
}

impl From<ConsistencyReport> for ConsistencyResponse {
    fn from(report: ConsistencyReport) -> Self {
        Self {
            users_checked: report.users_checked,
            debt_violations: report
                .debt_violations
                .into_iter()
                .map(|violation| DebtViolationResponse {
                    difference: violation.stored - violation.computed,
                    user_id: violation.user_id,
                    stored: violation.stored,
                    computed: violation.computed,
                })
                .collect(),
            unsettled_payments: report
                .unsettled_payments
                .into_iter()
                .map(|payment| UnsettledPaymentResponse {
                    payment_id: payment.payment_id,
                    invoice_id: payment.invoice_id,
                    user_id: payment.user_id,
                    amount: payment.amount,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsResponse {
    pub users_with_debt: u64,
    pub total_debt: i64,
    pub overdue_invoices: u64,
    pub overdue_amount: i64,
}

impl From<DebtStatistics> for StatisticsResponse {
    fn from(stats: DebtStatistics) -> Self {
        Self {
            users_with_debt: stats.users_with_debt,
            total_debt: stats.total_debt,
            overdue_invoices: stats.overdue_invoices,
            overdue_amount: stats.overdue_amount,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecordResponse {
    pub id: Uuid,
    pub actor_id: String,
    pub action: crate::models::AuditAction,
    pub changes: Vec<StatusChangeResponse>,
    pub affected_users: Vec<Uuid>,
    pub detail: serde_json::Value,
    pub outcome: String,
    pub created_at: DateTime<Utc>,
}

impl From<crate::models::AuditRecord> for AuditRecordResponse {
    fn from(record: crate::models::AuditRecord) -> Self {
        Self {
            id: record.id,
            actor_id: record.actor_id,
            action: record.action,
            changes: record.changes.into_iter().map(Into::into).collect(),
            affected_users: record.affected_users,
            detail: document_to_value(&record.detail),
            outcome: record.outcome,
            created_at: record.created_at.to_chrono(),
        }
    }
}
