//! Shared test fixtures: in-memory store implementations and a test server.
//!
//! The memory stores honor the same first-caller-wins contracts as the
//! MongoDB implementations (`mark_paid` hands out the pre-image exactly
//! once, `set_status` and `mark_completed` are guarded compare-and-swap
//! updates), so lifecycle behavior exercised here carries over to the real
//! stores.

#![allow(dead_code)]

use async_trait::async_trait;
use billing_service::config::PolicyConfig;
use billing_service::models::{
    AuditRecord, BillingDetail, DebtSnapshot, IncomeRecord, Invoice, InvoiceFilter, InvoiceStatus,
    Payment, PaymentMethod, PaymentStatus, UserAccount,
};
use billing_service::services::{AuditStore, InvoiceStore, OverdueStats, PaymentStore, UserStore};
use billing_service::{router, AppState};
use mongodb::bson::{DateTime, Document};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const ADMIN_ID: &str = "admin-tester";

fn injected_failure(what: &str) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("injected {} failure", what))
}

#[derive(Default)]
pub struct MemoryInvoiceStore {
    invoices: Mutex<HashMap<Uuid, Invoice>>,
    counters: Mutex<HashMap<String, i64>>,
}

impl MemoryInvoiceStore {
    pub fn get(&self, id: Uuid) -> Option<Invoice> {
        self.invoices.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn insert(&self, invoice: &Invoice) -> Result<(), AppError> {
        self.invoices
            .lock()
            .unwrap()
            .insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.get(id))
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Invoice>, AppError> {
        let invoices = self.invoices.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| invoices.get(id).cloned())
            .collect())
    }

    async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, AppError> {
        let invoices = self.invoices.lock().unwrap();
        let mut matched: Vec<Invoice> = invoices
            .values()
            .filter(|inv| filter.user_id.map_or(true, |user| inv.user_id == user))
            .filter(|inv| filter.status.map_or(true, |status| inv.status == status))
            .filter(|inv| {
                filter
                    .period
                    .as_deref()
                    .map_or(true, |period| inv.period == period)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(filter.limit.unwrap_or(100).clamp(1, 500) as usize);
        Ok(matched)
    }

    async fn next_number(&self, period: &str) -> Result<i64, AppError> {
        let mut counters = self.counters.lock().unwrap();
        let seq = counters.entry(period.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn mark_paid(&self, id: Uuid, paid_at: DateTime) -> Result<Option<Invoice>, AppError> {
        let mut invoices = self.invoices.lock().unwrap();
        match invoices.get_mut(&id) {
            Some(invoice) if !invoice.paid => {
                let before = invoice.clone();
                invoice.paid = true;
                invoice.status = InvoiceStatus::Paid;
                invoice.paid_at = Some(paid_at);
                invoice.updated_at = DateTime::now();
                Ok(Some(before))
            }
            _ => Ok(None),
        }
    }

    async fn set_status(
        &self,
        id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<bool, AppError> {
        let mut invoices = self.invoices.lock().unwrap();
        match invoices.get_mut(&id) {
            Some(invoice) if invoice.status == from && !invoice.paid => {
                invoice.status = to;
                invoice.updated_at = DateTime::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn due_before(&self, cutoff: DateTime) -> Result<Vec<Invoice>, AppError> {
        let invoices = self.invoices.lock().unwrap();
        Ok(invoices
            .values()
            .filter(|inv| {
                !inv.paid && inv.status == InvoiceStatus::Pending && inv.due_date < cutoff
            })
            .cloned()
            .collect())
    }

    async fn unpaid(&self) -> Result<Vec<Invoice>, AppError> {
        let invoices = self.invoices.lock().unwrap();
        Ok(invoices
            .values()
            .filter(|inv| {
                !inv.paid
                    && matches!(
                        inv.status,
                        InvoiceStatus::Pending | InvoiceStatus::Overdue
                    )
            })
            .cloned()
            .collect())
    }

    async fn overdue_totals(&self) -> Result<HashMap<Uuid, i64>, AppError> {
        let invoices = self.invoices.lock().unwrap();
        let mut totals = HashMap::new();
        for invoice in invoices.values() {
            if invoice.status == InvoiceStatus::Overdue && !invoice.paid {
                *totals.entry(invoice.user_id).or_insert(0) += invoice.total_amount;
            }
        }
        Ok(totals)
    }

    async fn overdue_stats(&self) -> Result<OverdueStats, AppError> {
        let invoices = self.invoices.lock().unwrap();
        let mut stats = OverdueStats::default();
        for invoice in invoices.values() {
            if invoice.status == InvoiceStatus::Overdue && !invoice.paid {
                stats.invoices += 1;
                stats.amount += invoice.total_amount;
            }
        }
        Ok(stats)
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, UserAccount>>,
}

impl MemoryUserStore {
    pub fn get(&self, id: Uuid) -> Option<UserAccount> {
        self.users.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: &UserAccount) -> Result<(), AppError> {
        self.users.lock().unwrap().insert(user.id, user.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<UserAccount>, AppError> {
        Ok(self.get(id))
    }

    async fn adjust_debt(&self, id: Uuid, delta: i64) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("user {} not found", id)))?;
        user.debt_total += delta;
        user.updated_at = DateTime::now();
        Ok(())
    }

    async fn overwrite_debt(&self, id: Uuid, value: i64) -> Result<Option<i64>, AppError> {
        let mut users = self.users.lock().unwrap();
        Ok(users.get_mut(&id).map(|user| {
            let previous = user.debt_total;
            user.debt_total = value;
            user.updated_at = DateTime::now();
            previous
        }))
    }

    async fn credit_balance(&self, id: Uuid, amount: i64) -> Result<(), AppError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("user {} not found", id)))?;
        user.balance += amount;
        user.updated_at = DateTime::now();
        Ok(())
    }

    async fn debt_snapshots(&self) -> Result<Vec<DebtSnapshot>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users
            .values()
            .map(|user| DebtSnapshot {
                user_id: user.id,
                debt_total: user.debt_total,
            })
            .collect())
    }
}

/// Delegating user store that can be told to fail debt adjustments, for
/// exercising the projection-tolerance paths.
pub struct FailingUserStore {
    pub inner: Arc<MemoryUserStore>,
    pub fail_adjust_debt: AtomicBool,
}

impl FailingUserStore {
    pub fn new(inner: Arc<MemoryUserStore>) -> Self {
        Self {
            inner,
            fail_adjust_debt: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl UserStore for FailingUserStore {
    async fn insert(&self, user: &UserAccount) -> Result<(), AppError> {
        self.inner.insert(user).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<UserAccount>, AppError> {
        self.inner.find(id).await
    }

    async fn adjust_debt(&self, id: Uuid, delta: i64) -> Result<(), AppError> {
        if self.fail_adjust_debt.load(Ordering::SeqCst) {
            return Err(injected_failure("adjust_debt"));
        }
        self.inner.adjust_debt(id, delta).await
    }

    async fn overwrite_debt(&self, id: Uuid, value: i64) -> Result<Option<i64>, AppError> {
        self.inner.overwrite_debt(id, value).await
    }

    async fn credit_balance(&self, id: Uuid, amount: i64) -> Result<(), AppError> {
        self.inner.credit_balance(id, amount).await
    }

    async fn debt_snapshots(&self) -> Result<Vec<DebtSnapshot>, AppError> {
        self.inner.debt_snapshots().await
    }
}

#[derive(Default)]
pub struct MemoryPaymentStore {
    payments: Mutex<HashMap<Uuid, Payment>>,
    incomes: Mutex<Vec<IncomeRecord>>,
}

impl MemoryPaymentStore {
    pub fn get(&self, id: Uuid) -> Option<Payment> {
        self.payments.lock().unwrap().get(&id).cloned()
    }

    pub fn incomes(&self) -> Vec<IncomeRecord> {
        self.incomes.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<(), AppError> {
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Payment>, AppError> {
        Ok(self.get(id))
    }

    async fn mark_completed(&self, id: Uuid, at: DateTime) -> Result<bool, AppError> {
        let mut payments = self.payments.lock().unwrap();
        match payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Completed;
                payment.completed_at = Some(at);
                payment.updated_at = DateTime::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: Uuid, detail: Option<Document>) -> Result<bool, AppError> {
        let mut payments = self.payments.lock().unwrap();
        match payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Failed;
                if detail.is_some() {
                    payment.gateway_detail = detail;
                }
                payment.updated_at = DateTime::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn completed_for_invoices(&self, ids: &[Uuid]) -> Result<Vec<Payment>, AppError> {
        let payments = self.payments.lock().unwrap();
        Ok(payments
            .values()
            .filter(|payment| {
                payment.status == PaymentStatus::Completed && ids.contains(&payment.invoice_id)
            })
            .cloned()
            .collect())
    }

    async fn insert_income(&self, income: &IncomeRecord) -> Result<(), AppError> {
        self.incomes.lock().unwrap().push(income.clone());
        Ok(())
    }
}

/// Delegating payment store that can be told to fail income-record writes,
/// for exercising the strict-bookkeeping policy.
pub struct FailingPaymentStore {
    pub inner: Arc<MemoryPaymentStore>,
    pub fail_insert_income: AtomicBool,
}

impl FailingPaymentStore {
    pub fn new(inner: Arc<MemoryPaymentStore>) -> Self {
        Self {
            inner,
            fail_insert_income: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PaymentStore for FailingPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<(), AppError> {
        self.inner.insert(payment).await
    }

    async fn find(&self, id: Uuid) -> Result<Option<Payment>, AppError> {
        self.inner.find(id).await
    }

    async fn mark_completed(&self, id: Uuid, at: DateTime) -> Result<bool, AppError> {
        self.inner.mark_completed(id, at).await
    }

    async fn mark_failed(&self, id: Uuid, detail: Option<Document>) -> Result<bool, AppError> {
        self.inner.mark_failed(id, detail).await
    }

    async fn completed_for_invoices(&self, ids: &[Uuid]) -> Result<Vec<Payment>, AppError> {
        self.inner.completed_for_invoices(ids).await
    }

    async fn insert_income(&self, income: &IncomeRecord) -> Result<(), AppError> {
        if self.fail_insert_income.load(Ordering::SeqCst) {
            return Err(injected_failure("insert_income"));
        }
        self.inner.insert_income(income).await
    }
}

#[derive(Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), AppError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .rev()
            .take(limit.clamp(1, 500) as usize)
            .cloned()
            .collect())
    }
}

/// Concrete store handles kept alongside the `AppState` so tests can seed
/// and inspect raw contents.
pub struct TestStores {
    pub invoices: Arc<MemoryInvoiceStore>,
    pub users: Arc<MemoryUserStore>,
    pub payments: Arc<MemoryPaymentStore>,
    pub audit: Arc<MemoryAuditStore>,
}

pub fn default_policy() -> PolicyConfig {
    PolicyConfig {
        strict_bookkeeping: false,
        drift_tolerance: 0,
    }
}

pub fn memory_state(policy: &PolicyConfig) -> (AppState, TestStores) {
    let stores = TestStores {
        invoices: Arc::new(MemoryInvoiceStore::default()),
        users: Arc::new(MemoryUserStore::default()),
        payments: Arc::new(MemoryPaymentStore::default()),
        audit: Arc::new(MemoryAuditStore::default()),
    };
    let state = AppState::new(
        stores.invoices.clone(),
        stores.users.clone(),
        stores.payments.clone(),
        stores.audit.clone(),
        policy,
    );
    (state, stores)
}

/// Test application backed by the in-memory stores, listening on a random
/// local port.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub stores: TestStores,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_policy(default_policy()).await
    }

    pub async fn spawn_with_policy(policy: PolicyConfig) -> Self {
        let (state, stores) = memory_state(&policy);
        let app = router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind random port");
        let port = listener
            .local_addr()
            .expect("Failed to read local address")
            .port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            stores,
        }
    }

    pub fn admin_get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.address, path))
            .header("x-actor-id", ADMIN_ID)
            .header("x-actor-role", "admin")
    }

    pub fn admin_post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("x-actor-id", ADMIN_ID)
            .header("x-actor-role", "admin")
    }

    pub fn user_get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.address, path))
            .header("x-actor-id", "user-tester")
            .header("x-actor-role", "user")
    }

    pub fn user_post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.address, path))
            .header("x-actor-id", "user-tester")
            .header("x-actor-role", "user")
    }
}

pub fn days_ago(days: i64) -> DateTime {
    DateTime::from_millis(DateTime::now().timestamp_millis() - days * 86_400_000)
}

pub fn days_ahead(days: i64) -> DateTime {
    DateTime::from_millis(DateTime::now().timestamp_millis() + days * 86_400_000)
}

pub fn build_user(name: &str, service_number: i64) -> UserAccount {
    let now = DateTime::now();
    UserAccount {
        id: Uuid::new_v4(),
        name: name.to_string(),
        service_number,
        debt_total: 0,
        balance: 0,
        created_at: now,
        updated_at: now,
    }
}

pub fn build_invoice(
    user_id: Uuid,
    period: &str,
    number: i64,
    amount: i64,
    status: InvoiceStatus,
    due_date: DateTime,
) -> Invoice {
    let now = DateTime::now();
    let paid = status == InvoiceStatus::Paid;
    Invoice {
        id: Uuid::new_v4(),
        number,
        period: period.to_string(),
        user_id,
        issued_at: now,
        due_date,
        previous_reading: 100,
        current_reading: 110,
        consumption_m3: 10,
        total_amount: amount,
        detail: BillingDetail {
            fixed_charge: amount,
            consumption_cost: 0,
            other_charges: 0,
            discounts: 0,
            surcharges: 0,
            tariff_snapshot: Document::new(),
        },
        status,
        paid,
        paid_at: paid.then(DateTime::now),
        created_at: now,
        updated_at: now,
    }
}

pub fn build_payment(invoice: &Invoice, status: PaymentStatus) -> Payment {
    let now = DateTime::now();
    Payment {
        id: Uuid::new_v4(),
        invoice_id: invoice.id,
        user_id: invoice.user_id,
        amount: invoice.total_amount,
        method: PaymentMethod::Webpay,
        status,
        gateway_detail: None,
        completed_at: (status == PaymentStatus::Completed).then(|| now),
        created_at: now,
        updated_at: now,
    }
}
