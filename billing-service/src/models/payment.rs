//! Payment (pago) and income record models.

use mongodb::bson::{DateTime, Document};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "webpay")]
    Webpay,
    #[serde(rename = "flow")]
    Flow,
    #[serde(rename = "mercadopago")]
    MercadoPago,
    #[serde(rename = "paypal")]
    PayPal,
    #[serde(rename = "transferencia")]
    Transfer,
    #[serde(rename = "efectivo")]
    Cash,
    #[serde(rename = "manual")]
    Manual,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Webpay => "webpay",
            PaymentMethod::Flow => "flow",
            PaymentMethod::MercadoPago => "mercadopago",
            PaymentMethod::PayPal => "paypal",
            PaymentMethod::Transfer => "transferencia",
            PaymentMethod::Cash => "efectivo",
            PaymentMethod::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "webpay" => Some(PaymentMethod::Webpay),
            "flow" => Some(PaymentMethod::Flow),
            "mercadopago" => Some(PaymentMethod::MercadoPago),
            "paypal" => Some(PaymentMethod::PayPal),
            "transferencia" => Some(PaymentMethod::Transfer),
            "efectivo" => Some(PaymentMethod::Cash),
            "manual" => Some(PaymentMethod::Manual),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "completado")]
    Completed,
    #[serde(rename = "fallido")]
    Failed,
    #[serde(rename = "reembolsado")]
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pendiente",
            PaymentStatus::Completed => "completado",
            PaymentStatus::Failed => "fallido",
            PaymentStatus::Refunded => "reembolsado",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "boletaId")]
    pub invoice_id: Uuid,
    #[serde(rename = "usuarioId")]
    pub user_id: Uuid,
    /// CLP minor units. Must equal the invoice total at registration time.
    #[serde(rename = "monto")]
    pub amount: i64,
    #[serde(rename = "metodo")]
    pub method: PaymentMethod,
    #[serde(rename = "estado")]
    pub status: PaymentStatus,
    /// Raw gateway payload, kept verbatim for dispute handling.
    #[serde(rename = "detalleGateway")]
    pub gateway_detail: Option<Document>,
    #[serde(rename = "fechaCompletado")]
    pub completed_at: Option<DateTime>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime,
}

/// Input for registering a payment attempt against an invoice.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub invoice_id: Uuid,
    pub amount: i64,
    pub method: PaymentMethod,
    pub gateway_detail: Option<Document>,
}

/// Bookkeeping entry written to `ingresos` when an administrator settles
/// invoices by hand. One record per user per batch, covering every invoice
/// of that user in the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "usuarioId")]
    pub user_id: Uuid,
    #[serde(rename = "monto")]
    pub amount: i64,
    #[serde(rename = "boletaIds")]
    pub invoice_ids: Vec<Uuid>,
    #[serde(rename = "manualPayment")]
    pub manual_payment: bool,
    #[serde(rename = "actorId")]
    pub actor_id: String,
    #[serde(rename = "reason")]
    pub reason: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime,
}
