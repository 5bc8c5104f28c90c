use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Compact the WAL once `threshold` units have been appended since the last
/// compaction. Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = match engine.appends_since_compact().await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("compactor: cannot read append count: {e}");
            return false;
        }
    };
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compactor: compacted after {appends} append(s)");
            true
        }
        Err(e) => {
            tracing::error!("compactor: {e}");
            false
        }
    }
}

/// Background task that checks the WAL every `interval`.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditHub;
    use crate::model::Capacity;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("roomledger_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::new(path, Arc::new(AuditHub::new())).unwrap();

        engine.create_room("A-1", Capacity::One, None).await.unwrap();
        engine.create_room("A-2", Capacity::Two, None).await.unwrap();
        assert!(!compact_if_due(&engine, 3).await);
        assert_eq!(engine.appends_since_compact().await.unwrap(), 2);

        engine.create_room("A-3", Capacity::Two, None).await.unwrap();
        assert!(compact_if_due(&engine, 3).await);
        assert_eq!(engine.appends_since_compact().await.unwrap(), 0);
        assert_eq!(engine.list_rooms().await.len(), 3);
    }

    #[tokio::test]
    async fn background_task_compacts() {
        let path = test_wal_path("background.wal");
        let engine = Arc::new(Engine::new(path, Arc::new(AuditHub::new())).unwrap());
        engine.create_room("A-1", Capacity::One, None).await.unwrap();

        let task = tokio::spawn(run_compactor(engine.clone(), 1, Duration::from_millis(10)));
        let mut compacted = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if engine.appends_since_compact().await.unwrap() == 0 {
                compacted = true;
                break;
            }
        }
        task.abort();
        assert!(compacted);
    }
}
