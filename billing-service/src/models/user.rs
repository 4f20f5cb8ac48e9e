//! User account balances.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Balance-bearing view of a portal user. Other profile fields live with the
/// account service and are not duplicated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "numeroServicio")]
    pub service_number: i64,
    /// Sum of `montoTotal` over the user's overdue invoices, maintained
    /// incrementally and rebuilt by reconciliation.
    #[serde(rename = "deudaTotal")]
    pub debt_total: i64,
    /// Credit balance accumulated from settled payments.
    #[serde(rename = "saldoActual")]
    pub balance: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime,
}

/// Minimal projection used by reconciliation passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebtSnapshot {
    pub user_id: Uuid,
    pub debt_total: i64,
}
