//! Services module for billing-service.

pub mod admin;
pub mod debt;
pub mod invoices;
pub mod metrics;
pub mod payments;
pub mod reconcile;
pub mod repository;
pub mod store;

pub use admin::{AdminOverrideService, BulkStatusOutcome};
pub use debt::DebtProjector;
pub use invoices::{InvoiceService, SweepReport};
pub use metrics::{get_metrics, init_metrics};
pub use payments::{CompletionOutcome, PaymentService};
pub use reconcile::{
    ConsistencyReport, DebtStatistics, DebtViolation, ReconciliationService, ResyncReport,
    UnsettledPayment,
};
pub use repository::{MongoAuditStore, MongoInvoiceStore, MongoPaymentStore, MongoUserStore};
pub use store::{AuditStore, InvoiceStore, OverdueStats, PaymentStore, UserStore};
