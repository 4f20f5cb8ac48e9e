//! Invoice (boleta) model and lifecycle rules.
//!
//! Stored field names and status values keep the portal's legacy Spanish
//! vocabulary so the documents stay readable by the existing front end and
//! by operators running ad-hoc queries.

use mongodb::bson::{DateTime, Document};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Invoice status. The wire value is shared between stored documents and the
/// HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "pagada")]
    Paid,
    #[serde(rename = "vencida")]
    Overdue,
    #[serde(rename = "anulada")]
    Voided,
    #[serde(rename = "archivada")]
    Archived,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pendiente",
            InvoiceStatus::Paid => "pagada",
            InvoiceStatus::Overdue => "vencida",
            InvoiceStatus::Voided => "anulada",
            InvoiceStatus::Archived => "archivada",
        }
    }

    /// Strict parse: unknown values are rejected, never coerced to a default.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pendiente" => Some(InvoiceStatus::Pending),
            "pagada" => Some(InvoiceStatus::Paid),
            "vencida" => Some(InvoiceStatus::Overdue),
            "anulada" => Some(InvoiceStatus::Voided),
            "archivada" => Some(InvoiceStatus::Archived),
            _ => None,
        }
    }

    /// The lifecycle table. Everything not listed here is illegal, including
    /// any transition out of `Paid`.
    pub fn can_transition_to(self, to: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, to),
            (Pending, Paid)
                | (Pending, Overdue)
                | (Pending, Voided)
                | (Overdue, Paid)
                | (Overdue, Voided)
                | (Voided, Archived)
        )
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a transition check against a concrete invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCheck {
    /// Re-marking a paid invoice as paid. Nothing to do, not an error.
    NoOp,
    /// The transition is legal and should be applied.
    Apply,
}

/// Charge breakdown stored inside the invoice. Amounts are CLP minor units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingDetail {
    #[serde(rename = "cargoFijo")]
    pub fixed_charge: i64,
    #[serde(rename = "costoConsumo")]
    pub consumption_cost: i64,
    #[serde(rename = "otrosCargos")]
    pub other_charges: i64,
    #[serde(rename = "descuentos")]
    pub discounts: i64,
    #[serde(rename = "recargos")]
    pub surcharges: i64,
    /// Opaque tariff-calculation snapshot captured at issue time.
    #[serde(rename = "calculoTarifa")]
    pub tariff_snapshot: Document,
}

impl BillingDetail {
    pub fn total(&self) -> i64 {
        self.fixed_charge + self.consumption_cost + self.other_charges + self.surcharges
            - self.discounts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// Sequential number within the billing period.
    #[serde(rename = "numero")]
    pub number: i64,
    /// Billing period in `YYYY-MM` form.
    #[serde(rename = "periodo")]
    pub period: String,
    #[serde(rename = "usuarioId")]
    pub user_id: Uuid,
    #[serde(rename = "fechaEmision")]
    pub issued_at: DateTime,
    #[serde(rename = "fechaVencimiento")]
    pub due_date: DateTime,
    #[serde(rename = "lecturaAnterior")]
    pub previous_reading: i64,
    #[serde(rename = "lecturaActual")]
    pub current_reading: i64,
    #[serde(rename = "consumoM3")]
    pub consumption_m3: i64,
    #[serde(rename = "montoTotal")]
    pub total_amount: i64,
    #[serde(rename = "detalle")]
    pub detail: BillingDetail,
    #[serde(rename = "estado")]
    pub status: InvoiceStatus,
    /// Permanent settlement flag. Set exactly once, never cleared, even if
    /// `estado` were to be corrupted by hand.
    #[serde(rename = "pagada")]
    pub paid: bool,
    #[serde(rename = "fechaPago")]
    pub paid_at: Option<DateTime>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime,
}

impl Invoice {
    /// Human-facing invoice number, e.g. `2025-08-142`.
    pub fn folio(&self) -> String {
        format!("{}-{}", self.period, self.number)
    }

    /// Validates a requested status change against this snapshot.
    ///
    /// The paid flag is checked before the status table: once an invoice is
    /// settled the only accepted request is the idempotent `Paid -> Paid`.
    pub fn check_transition(&self, to: InvoiceStatus) -> Result<TransitionCheck, AppError> {
        if self.paid {
            if to == InvoiceStatus::Paid {
                return Ok(TransitionCheck::NoOp);
            }
            return Err(AppError::ImmutableInvoice {
                folio: self.folio(),
            });
        }
        if self.status.can_transition_to(to) {
            Ok(TransitionCheck::Apply)
        } else {
            Err(AppError::InvalidTransition {
                from: self.status.as_str(),
                to: to.as_str(),
            })
        }
    }

    /// True when the overdue sweep should pick this invoice up.
    pub fn is_past_due(&self, now: DateTime) -> bool {
        !self.paid && self.status == InvoiceStatus::Pending && self.due_date < now
    }
}

/// Input for issuing a new invoice, already validated at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub user_id: Uuid,
    pub period: String,
    pub due_date: DateTime,
    pub previous_reading: i64,
    pub current_reading: i64,
    /// Manual consumption figure for meter rollover or replacement cases.
    pub consumption_override: Option<i64>,
    pub fixed_charge: i64,
    pub price_per_m3: i64,
    pub other_charges: i64,
    pub discounts: i64,
    pub surcharges: i64,
    pub tariff_snapshot: Document,
}

/// Filter for invoice listings.
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub period: Option<String>,
    pub limit: Option<i64>,
}
