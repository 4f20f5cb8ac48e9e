//! Domain models for billing-service.

mod audit;
mod invoice;
mod payment;
mod user;

pub use audit::{AuditAction, AuditRecord, StatusChange};
pub use invoice::{
    BillingDetail, Invoice, InvoiceFilter, InvoiceStatus, NewInvoice, TransitionCheck,
};
pub use payment::{IncomeRecord, NewPayment, Payment, PaymentMethod, PaymentStatus};
pub use user::{DebtSnapshot, UserAccount};
