//! Persistence traits for the billing collections.
//!
//! Handlers and services depend on these traits rather than on MongoDB
//! directly. Methods are shaped around the atomic document updates the
//! domain relies on: `mark_paid` and `set_status` are the compare-and-swap
//! primitives the lifecycle code builds on, so any implementation has to
//! honor their first-caller-wins contract.

use crate::models::{
    AuditRecord, DebtSnapshot, IncomeRecord, Invoice, InvoiceFilter, InvoiceStatus, Payment,
    UserAccount,
};
use async_trait::async_trait;
use mongodb::bson::{DateTime, Document};
use service_core::error::AppError;
use std::collections::HashMap;
use uuid::Uuid;

/// Aggregate numbers over unpaid overdue invoices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverdueStats {
    pub invoices: u64,
    pub amount: i64,
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert(&self, invoice: &Invoice) -> Result<(), AppError>;

    async fn find(&self, id: Uuid) -> Result<Option<Invoice>, AppError>;

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Invoice>, AppError>;

    async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, AppError>;

    /// Next sequential invoice number for a billing period.
    async fn next_number(&self, period: &str) -> Result<i64, AppError>;

    /// Settles the invoice: sets the permanent paid flag, the paid status and
    /// `fechaPago` in one guarded update. Returns the pre-update snapshot for
    /// the first caller and `None` for everyone who arrives after it, or when
    /// the invoice does not exist.
    async fn mark_paid(&self, id: Uuid, paid_at: DateTime) -> Result<Option<Invoice>, AppError>;

    /// Moves `estado` from `from` to `to` only if the document still carries
    /// `from` and is unpaid. Returns whether this call performed the change.
    async fn set_status(
        &self,
        id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<bool, AppError>;

    /// Unpaid pending invoices whose due date is strictly before `cutoff`.
    async fn due_before(&self, cutoff: DateTime) -> Result<Vec<Invoice>, AppError>;

    /// Invoices still collectible: unpaid, status pending or overdue.
    async fn unpaid(&self) -> Result<Vec<Invoice>, AppError>;

    /// Authoritative debt per user: sum of `montoTotal` over unpaid overdue
    /// invoices, grouped by user. Users without overdue invoices are absent.
    async fn overdue_totals(&self) -> Result<HashMap<Uuid, i64>, AppError>;

    async fn overdue_stats(&self) -> Result<OverdueStats, AppError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &UserAccount) -> Result<(), AppError>;

    async fn find(&self, id: Uuid) -> Result<Option<UserAccount>, AppError>;

    /// Adds `delta` (possibly negative) to `deudaTotal`.
    async fn adjust_debt(&self, id: Uuid, delta: i64) -> Result<(), AppError>;

    /// Replaces `deudaTotal` outright, returning the previous value.
    /// `None` when the user does not exist.
    async fn overwrite_debt(&self, id: Uuid, value: i64) -> Result<Option<i64>, AppError>;

    /// Adds a settled payment amount to `saldoActual`.
    async fn credit_balance(&self, id: Uuid, amount: i64) -> Result<(), AppError>;

    async fn debt_snapshots(&self) -> Result<Vec<DebtSnapshot>, AppError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<(), AppError>;

    async fn find(&self, id: Uuid) -> Result<Option<Payment>, AppError>;

    /// Completion barrier: flips `estado` from pending to completed. Returns
    /// whether this call won; a lost race or a non-pending payment yields
    /// `false`.
    async fn mark_completed(&self, id: Uuid, at: DateTime) -> Result<bool, AppError>;

    /// Marks a pending payment as failed, optionally attaching the gateway
    /// response. Returns whether the payment was still pending.
    async fn mark_failed(&self, id: Uuid, detail: Option<Document>) -> Result<bool, AppError>;

    /// Completed payments that reference any of the given invoices.
    async fn completed_for_invoices(&self, ids: &[Uuid]) -> Result<Vec<Payment>, AppError>;

    async fn insert_income(&self, income: &IncomeRecord) -> Result<(), AppError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), AppError>;

    async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, AppError>;
}
