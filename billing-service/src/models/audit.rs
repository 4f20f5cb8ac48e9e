//! Audit trail records for administrative actions.

use crate::models::InvoiceStatus;
use mongodb::bson::{doc, DateTime, Document};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "bulk_status_update")]
    BulkStatusUpdate,
    #[serde(rename = "debt_resync")]
    DebtResync,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::BulkStatusUpdate => "bulk_status_update",
            AuditAction::DebtResync => "debt_resync",
        }
    }
}

/// One invoice's before/after within a bulk override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    #[serde(rename = "boletaId")]
    pub invoice_id: Uuid,
    #[serde(rename = "folio")]
    pub folio: String,
    #[serde(rename = "estadoAnterior")]
    pub old_status: InvoiceStatus,
    #[serde(rename = "estadoNuevo")]
    pub new_status: InvoiceStatus,
}

/// One record per administrative batch, not per invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "actorId")]
    pub actor_id: String,
    #[serde(rename = "accion")]
    pub action: AuditAction,
    #[serde(rename = "cambios")]
    pub changes: Vec<StatusChange>,
    #[serde(rename = "usuariosAfectados")]
    pub affected_users: Vec<Uuid>,
    #[serde(rename = "detalle")]
    pub detail: Document,
    #[serde(rename = "resultado")]
    pub outcome: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime,
}

impl AuditRecord {
    pub fn bulk_status_update(
        actor_id: &str,
        new_status: InvoiceStatus,
        reason: &str,
        changes: Vec<StatusChange>,
        affected_users: Vec<Uuid>,
    ) -> Self {
        let outcome = format!("{} invoices updated", changes.len());
        Self {
            id: Uuid::new_v4(),
            actor_id: actor_id.to_string(),
            action: AuditAction::BulkStatusUpdate,
            changes,
            affected_users,
            detail: doc! {
                "reason": reason,
                "estadoNuevo": new_status.as_str(),
            },
            outcome,
            created_at: DateTime::now(),
        }
    }

    pub fn debt_resync(
        actor_id: &str,
        affected_users: Vec<Uuid>,
        detail: Document,
        outcome: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: actor_id.to_string(),
            action: AuditAction::DebtResync,
            changes: Vec::new(),
            affected_users,
            detail,
            outcome,
            created_at: DateTime::now(),
        }
    }
}
