use std::net::SocketAddr;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: allocate calls. Labels: outcome.
pub const ALLOCATIONS_TOTAL: &str = "roomledger_allocations_total";

/// Counter: release calls. Labels: outcome.
pub const RELEASES_TOTAL: &str = "roomledger_releases_total";

/// Counter: transfer calls. Labels: outcome.
pub const TRANSFERS_TOTAL: &str = "roomledger_transfers_total";

/// Histogram: time from entering an engine mutation to commit, in seconds. Labels: operation.
pub const MUTATION_DURATION_SECONDS: &str = "roomledger_mutation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms whose projected status is occupied.
pub const ROOMS_OCCUPIED: &str = "roomledger_rooms_occupied";

/// Gauge: active allocations across all rooms.
pub const ACTIVE_ALLOCATIONS: &str = "roomledger_active_allocations";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomledger_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (units per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomledger_wal_flush_batch_size";

/// Counter: WAL compactions. Labels: status.
pub const WAL_COMPACTIONS_TOTAL: &str = "roomledger_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus metrics exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Outcome label for a mutation result: `ok`, or the error's code.
pub fn outcome_label<T>(result: &Result<T, EngineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    }
}
