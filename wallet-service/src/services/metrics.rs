//! Prometheus metrics for wallet-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Ledger entries posted, by direction and method.
pub static LEDGER_ENTRIES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_ledger_entries_total",
        "Total number of ledger entries posted",
        &["direction", "method"]
    )
    .expect("Failed to register ledger_entries_total")
});

/// Void/edit reversals posted.
pub static REVERSALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_reversals_total",
        "Total number of reversal entries posted",
        &["kind"] // void, edit
    )
    .expect("Failed to register reversals_total")
});

/// Withdrawal state transitions.
pub static WITHDRAWALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_withdrawals_total",
        "Total number of withdrawal transitions",
        &["status"] // pending, approved, rejected, completed, done
    )
    .expect("Failed to register withdrawals_total")
});

/// Collective payment items settled or left pending.
pub static COLLECTIVE_ITEMS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_collective_items_total",
        "Total number of collective payment item outcomes",
        &["status"] // paid, pending
    )
    .expect("Failed to register collective_items_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_errors_total",
        "Total number of errors by type",
        &["error_type"] // db_error, validation_error, notify_error, etc.
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "wallet_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&LEDGER_ENTRIES_TOTAL);
    Lazy::force(&REVERSALS_TOTAL);
    Lazy::force(&WITHDRAWALS_TOTAL);
    Lazy::force(&COLLECTIVE_ITEMS_TOTAL);
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
