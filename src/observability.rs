use std::net::SocketAddr;

// ── Reconciliation ──────────────────────────────────────────────

/// Counter: committed reconciliations. Labels: case.
pub const RECONCILE_TOTAL: &str = "leasestat_reconcile_total";

/// Histogram: reconciliation latency in seconds, lock wait and WAL commit included.
pub const RECONCILE_DURATION_SECONDS: &str = "leasestat_reconcile_duration_seconds";

/// Counter: reconciliations that returned an error.
pub const RECONCILE_ERRORS_TOTAL: &str = "leasestat_reconcile_errors_total";

// ── Storage ─────────────────────────────────────────────────────

/// Gauge: registered subjects.
pub const SUBJECTS_ACTIVE: &str = "leasestat_subjects_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "leasestat_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "leasestat_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "leasestat_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
