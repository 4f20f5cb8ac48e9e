//! Prometheus metrics for billing-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, HistogramVec,
    IntCounter, TextEncoder,
};

/// Invoice counter by resulting status (creation counts as `pendiente`).
pub static INVOICES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_invoices_total",
        "Total number of invoice status events",
        &["status"]
    )
    .expect("Failed to register invoices_total")
});

/// Completed payment counter by method.
pub static PAYMENTS_COMPLETED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_payments_completed_total",
        "Total number of completed payments by method",
        &["method"]
    )
    .expect("Failed to register payments_completed_total")
});

/// Settled amount counter by method, in CLP minor units.
pub static PAYMENT_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_payment_amount_total",
        "Total settled payment amount by method",
        &["method"]
    )
    .expect("Failed to register payment_amount_total")
});

/// Invoices moved to overdue by the sweep.
pub static SWEEP_TRANSITIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "billing_sweep_transitions_total",
        "Invoices transitioned to overdue by the due-date sweep"
    )
    .expect("Failed to register sweep_transitions_total")
});

/// Reconciliation runs.
pub static RESYNC_RUNS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "billing_resync_runs_total",
        "Total number of debt resync runs"
    )
    .expect("Failed to register resync_runs_total")
});

/// Users whose stored debt was overwritten by reconciliation.
pub static DEBT_CORRECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "billing_debt_corrections_total",
        "User debt totals corrected by reconciliation"
    )
    .expect("Failed to register debt_corrections_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INVOICES_TOTAL);
    Lazy::force(&PAYMENTS_COMPLETED_TOTAL);
    Lazy::force(&PAYMENT_AMOUNT_TOTAL);
    Lazy::force(&SWEEP_TRANSITIONS_TOTAL);
    Lazy::force(&RESYNC_RUNS_TOTAL);
    Lazy::force(&DEBT_CORRECTIONS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
