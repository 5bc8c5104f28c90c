use std::sync::Arc;

use tracing::info;

use roomledger::audit::AuditHub;
use roomledger::clock::SystemClock;
use roomledger::compactor;
use roomledger::config::Config;
use roomledger::engine::Engine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    roomledger::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let engine = Arc::new(Engine::with_options(
        config.wal_path(),
        Arc::new(AuditHub::new()),
        Arc::new(SystemClock::new()),
        config.policy,
    )?);

    info!("roomledger started");
    info!("  data_dir: {}", config.data_dir.display());
    info!(
        "  compaction: every {} append(s), checked each {:?}",
        config.compact_threshold, config.compact_interval
    );
    info!(
        "  guests: past after {} day(s), stays up to {} day(s)",
        config.policy.past_guest_window_days, config.policy.max_guest_stay_days
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let summary = engine.allocation_summary().await;
    info!("occupancy: {}", serde_json::to_string(&summary)?);
    let violations = engine.check_invariants().await;
    if violations.is_empty() {
        info!("invariants hold after replay");
    } else {
        for v in &violations {
            tracing::error!("invariant violated after replay: {v:?}");
        }
    }

    let compactor_task = tokio::spawn(compactor::run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.compact_interval,
    ));

    // Graceful shutdown on SIGTERM/ctrl-c: stop the compactor, then leave a
    // compact log behind
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received");
    compactor_task.abort();
    if let Err(e) = engine.compact_wal().await {
        tracing::error!("final compaction failed: {e}");
    }

    info!("roomledger stopped");
    Ok(())
}
