//! MongoDB-backed store implementations.
//!
//! Invoice settlement and payment completion rely on guarded single-document
//! updates (`pagada: false`, `estado: "pendiente"` filters) so that the first
//! caller wins and every later caller observes a lost race instead of
//! double-applying balance effects.

use crate::models::{
    AuditRecord, DebtSnapshot, IncomeRecord, Invoice, InvoiceFilter, InvoiceStatus, Payment,
    PaymentStatus, UserAccount,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{AuditStore, InvoiceStore, OverdueStats, PaymentStore, UserStore};
use anyhow::anyhow;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument};
use mongodb::{Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::collections::HashMap;
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

/// Per-period sequence document in `contadores`.
#[derive(Debug, Serialize, Deserialize)]
struct Counter {
    #[serde(rename = "_id")]
    id: String,
    seq: i64,
}

fn string_ids(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Aggregation results may come back as Int32, Int64 or Double depending on
/// what the driver folded the sum into.
fn int_value(doc: &Document, key: &str) -> i64 {
    match doc.get(key) {
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

#[derive(Clone)]
pub struct MongoInvoiceStore {
    invoices: Collection<Invoice>,
    counters: Collection<Counter>,
}

impl MongoInvoiceStore {
    pub fn new(db: &Database) -> Self {
        Self {
            invoices: db.collection("boletas"),
            counters: db.collection("contadores"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let folio_index = IndexModel::builder()
            .keys(doc! { "periodo": 1, "numero": 1 })
            .options(
                IndexOptions::builder()
                    .name("periodo_numero_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let user_status_index = IndexModel::builder()
            .keys(doc! { "usuarioId": 1, "estado": 1 })
            .options(
                IndexOptions::builder()
                    .name("usuario_estado_idx".to_string())
                    .build(),
            )
            .build();

        // Serves both the due-date sweep and the overdue aggregations.
        let due_index = IndexModel::builder()
            .keys(doc! { "estado": 1, "pagada": 1, "fechaVencimiento": 1 })
            .options(
                IndexOptions::builder()
                    .name("estado_vencimiento_idx".to_string())
                    .build(),
            )
            .build();

        self.invoices
            .create_indexes([folio_index, user_status_index, due_index], None)
            .await?;

        tracing::info!("Invoice indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl InvoiceStore for MongoInvoiceStore {
    async fn insert(&self, invoice: &Invoice) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();
        self.invoices.insert_one(invoice, None).await?;
        timer.observe_duration();
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoice"])
            .start_timer();
        let invoice = self
            .invoices
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?;
        timer.observe_duration();
        Ok(invoice)
    }

    async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoices"])
            .start_timer();
        let cursor = self
            .invoices
            .find(doc! { "_id": { "$in": string_ids(ids) } }, None)
            .await?;
        let invoices = cursor.try_collect().await?;
        timer.observe_duration();
        Ok(invoices)
    }

    async fn list(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let mut query = Document::new();
        if let Some(user_id) = filter.user_id {
            query.insert("usuarioId", user_id.to_string());
        }
        if let Some(status) = filter.status {
            query.insert("estado", status.as_str());
        }
        if let Some(period) = &filter.period {
            query.insert("periodo", period.as_str());
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .limit(limit)
            .build();

        let cursor = self.invoices.find(query, options).await?;
        let invoices = cursor.try_collect().await?;
        timer.observe_duration();
        Ok(invoices)
    }

    async fn next_number(&self, period: &str) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["next_invoice_number"])
            .start_timer();
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = self
            .counters
            .find_one_and_update(
                doc! { "_id": format!("boletas:{}", period) },
                doc! { "$inc": { "seq": 1_i64 } },
                options,
            )
            .await?
            .ok_or_else(|| {
                AppError::DatabaseError(anyhow!("counter upsert returned no document"))
            })?;
        timer.observe_duration();
        Ok(counter.seq)
    }

    async fn mark_paid(&self, id: Uuid, paid_at: DateTime) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_invoice_paid"])
            .start_timer();
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        // The `pagada: false` guard is what makes settlement at-most-once.
        let before = self
            .invoices
            .find_one_and_update(
                doc! { "_id": id.to_string(), "pagada": false },
                doc! { "$set": {
                    "estado": InvoiceStatus::Paid.as_str(),
                    "pagada": true,
                    "fechaPago": paid_at,
                    "updatedAt": DateTime::now(),
                } },
                options,
            )
            .await?;
        timer.observe_duration();
        Ok(before)
    }

    async fn set_status(
        &self,
        id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_invoice_status"])
            .start_timer();
        let result = self
            .invoices
            .update_one(
                doc! { "_id": id.to_string(), "estado": from.as_str(), "pagada": false },
                doc! { "$set": { "estado": to.as_str(), "updatedAt": DateTime::now() } },
                None,
            )
            .await?;
        timer.observe_duration();
        Ok(result.modified_count == 1)
    }

    async fn due_before(&self, cutoff: DateTime) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["due_invoices"])
            .start_timer();
        let cursor = self
            .invoices
            .find(
                doc! {
                    "estado": InvoiceStatus::Pending.as_str(),
                    "pagada": false,
                    "fechaVencimiento": { "$lt": cutoff },
                },
                None,
            )
            .await?;
        let invoices = cursor.try_collect().await?;
        timer.observe_duration();
        Ok(invoices)
    }

    async fn unpaid(&self) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["unpaid_invoices"])
            .start_timer();
        let cursor = self
            .invoices
            .find(
                doc! {
                    "pagada": false,
                    "estado": { "$in": [
                        InvoiceStatus::Pending.as_str(),
                        InvoiceStatus::Overdue.as_str(),
                    ] },
                },
                None,
            )
            .await?;
        let invoices = cursor.try_collect().await?;
        timer.observe_duration();
        Ok(invoices)
    }

    async fn overdue_totals(&self) -> Result<HashMap<Uuid, i64>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["overdue_totals"])
            .start_timer();
        let pipeline = vec![
            doc! { "$match": {
                "estado": InvoiceStatus::Overdue.as_str(),
                "pagada": false,
            } },
            doc! { "$group": {
                "_id": "$usuarioId",
                "total": { "$sum": "$montoTotal" },
            } },
        ];
        let mut cursor = self.invoices.aggregate(pipeline, None).await?;

        let mut totals = HashMap::new();
        while let Some(group) = cursor.try_next().await? {
            let Some(user_id) = group
                .get_str("_id")
                .ok()
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                tracing::warn!(group = ?group, "overdue aggregation row without a parsable user id");
                continue;
            };
            totals.insert(user_id, int_value(&group, "total"));
        }
        timer.observe_duration();
        Ok(totals)
    }

    async fn overdue_stats(&self) -> Result<OverdueStats, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["overdue_stats"])
            .start_timer();
        let pipeline = vec![
            doc! { "$match": {
                "estado": InvoiceStatus::Overdue.as_str(),
                "pagada": false,
            } },
            doc! { "$group": {
                "_id": Bson::Null,
                "amount": { "$sum": "$montoTotal" },
                "invoices": { "$sum": 1_i64 },
            } },
        ];
        let mut cursor = self.invoices.aggregate(pipeline, None).await?;
        let stats = match cursor.try_next().await? {
            Some(group) => OverdueStats {
                invoices: int_value(&group, "invoices") as u64,
                amount: int_value(&group, "amount"),
            },
            None => OverdueStats::default(),
        };
        timer.observe_duration();
        Ok(stats)
    }
}

#[derive(Clone)]
pub struct MongoUserStore {
    users: Collection<UserAccount>,
}

impl MongoUserStore {
    pub fn new(db: &Database) -> Self {
        Self {
            users: db.collection("usuarios"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let service_number_index = IndexModel::builder()
            .keys(doc! { "numeroServicio": 1 })
            .options(
                IndexOptions::builder()
                    .name("numero_servicio_idx".to_string())
                    .build(),
            )
            .build();
        self.users
            .create_indexes([service_number_index], None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn insert(&self, user: &UserAccount) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_user"])
            .start_timer();
        self.users.insert_one(user, None).await?;
        timer.observe_duration();
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<UserAccount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_user"])
            .start_timer();
        let user = self
            .users
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?;
        timer.observe_duration();
        Ok(user)
    }

    async fn adjust_debt(&self, id: Uuid, delta: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["adjust_debt"])
            .start_timer();
        let result = self
            .users
            .update_one(
                doc! { "_id": id.to_string() },
                doc! {
                    "$inc": { "deudaTotal": delta },
                    "$set": { "updatedAt": DateTime::now() },
                },
                None,
            )
            .await?;
        timer.observe_duration();
        if result.matched_count == 0 {
            return Err(AppError::NotFound(anyhow!("user {} not found", id)));
        }
        Ok(())
    }

    async fn overwrite_debt(&self, id: Uuid, value: i64) -> Result<Option<i64>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["overwrite_debt"])
            .start_timer();
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let previous = self
            .users
            .find_one_and_update(
                doc! { "_id": id.to_string() },
                doc! { "$set": { "deudaTotal": value, "updatedAt": DateTime::now() } },
                options,
            )
            .await?;
        timer.observe_duration();
        Ok(previous.map(|user| user.debt_total))
    }

    async fn credit_balance(&self, id: Uuid, amount: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["credit_balance"])
            .start_timer();
        let result = self
            .users
            .update_one(
                doc! { "_id": id.to_string() },
                doc! {
                    "$inc": { "saldoActual": amount },
                    "$set": { "updatedAt": DateTime::now() },
                },
                None,
            )
            .await?;
        timer.observe_duration();
        if result.matched_count == 0 {
            return Err(AppError::NotFound(anyhow!("user {} not found", id)));
        }
        Ok(())
    }

    async fn debt_snapshots(&self) -> Result<Vec<DebtSnapshot>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["debt_snapshots"])
            .start_timer();
        let cursor = self.users.find(doc! {}, None).await?;
        let users: Vec<UserAccount> = cursor.try_collect().await?;
        timer.observe_duration();
        Ok(users
            .into_iter()
            .map(|user| DebtSnapshot {
                user_id: user.id,
                debt_total: user.debt_total,
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct MongoPaymentStore {
    payments: Collection<Payment>,
    incomes: Collection<IncomeRecord>,
}

impl MongoPaymentStore {
    pub fn new(db: &Database) -> Self {
        Self {
            payments: db.collection("pagos"),
            incomes: db.collection("ingresos"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let invoice_status_index = IndexModel::builder()
            .keys(doc! { "boletaId": 1, "estado": 1 })
            .options(
                IndexOptions::builder()
                    .name("boleta_estado_idx".to_string())
                    .build(),
            )
            .build();
        let user_index = IndexModel::builder()
            .keys(doc! { "usuarioId": 1 })
            .options(
                IndexOptions::builder()
                    .name("usuario_idx".to_string())
                    .build(),
            )
            .build();
        self.payments
            .create_indexes([invoice_status_index, user_index], None)
            .await?;

        let income_user_index = IndexModel::builder()
            .keys(doc! { "usuarioId": 1 })
            .options(
                IndexOptions::builder()
                    .name("ingreso_usuario_idx".to_string())
                    .build(),
            )
            .build();
        self.incomes
            .create_indexes([income_user_index], None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MongoPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment"])
            .start_timer();
        self.payments.insert_one(payment, None).await?;
        timer.observe_duration();
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_payment"])
            .start_timer();
        let payment = self
            .payments
            .find_one(doc! { "_id": id.to_string() }, None)
            .await?;
        timer.observe_duration();
        Ok(payment)
    }

    async fn mark_completed(&self, id: Uuid, at: DateTime) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_payment_completed"])
            .start_timer();
        let result = self
            .payments
            .update_one(
                doc! { "_id": id.to_string(), "estado": PaymentStatus::Pending.as_str() },
                doc! { "$set": {
                    "estado": PaymentStatus::Completed.as_str(),
                    "fechaCompletado": at,
                    "updatedAt": DateTime::now(),
                } },
                None,
            )
            .await?;
        timer.observe_duration();
        Ok(result.modified_count == 1)
    }

    async fn mark_failed(&self, id: Uuid, detail: Option<Document>) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_payment_failed"])
            .start_timer();
        let mut set = doc! {
            "estado": PaymentStatus::Failed.as_str(),
            "updatedAt": DateTime::now(),
        };
        if let Some(detail) = detail {
            set.insert("detalleGateway", detail);
        }
        let result = self
            .payments
            .update_one(
                doc! { "_id": id.to_string(), "estado": PaymentStatus::Pending.as_str() },
                doc! { "$set": set },
                None,
            )
            .await?;
        timer.observe_duration();
        Ok(result.modified_count == 1)
    }

    async fn completed_for_invoices(&self, ids: &[Uuid]) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["completed_payments"])
            .start_timer();
        let cursor = self
            .payments
            .find(
                doc! {
                    "boletaId": { "$in": string_ids(ids) },
                    "estado": PaymentStatus::Completed.as_str(),
                },
                None,
            )
            .await?;
        let payments = cursor.try_collect().await?;
        timer.observe_duration();
        Ok(payments)
    }

    async fn insert_income(&self, income: &IncomeRecord) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_income"])
            .start_timer();
        self.incomes.insert_one(income, None).await?;
        timer.observe_duration();
        Ok(())
    }
}

#[derive(Clone)]
pub struct MongoAuditStore {
    records: Collection<AuditRecord>,
}

impl MongoAuditStore {
    pub fn new(db: &Database) -> Self {
        Self {
            records: db.collection("auditoria"),
        }
    }

    pub async fn init_indexes(&self) -> Result<(), AppError> {
        let created_index = IndexModel::builder()
            .keys(doc! { "createdAt": -1 })
            .options(
                IndexOptions::builder()
                    .name("created_at_idx".to_string())
                    .build(),
            )
            .build();
        self.records.create_indexes([created_index], None).await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MongoAuditStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_audit"])
            .start_timer();
        self.records.insert_one(record, None).await?;
        timer.observe_duration();
        Ok(())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["recent_audit"])
            .start_timer();
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .limit(limit.clamp(1, MAX_LIST_LIMIT))
            .build();
        let cursor = self.records.find(doc! {}, options).await?;
        let records = cursor.try_collect().await?;
        timer.observe_duration();
        Ok(records)
    }
}
