use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::Scheduler;
use crate::observability::WAL_COMPACTIONS_TOTAL;

/// Compact once `threshold` appends have piled up since the last compaction.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(scheduler: &Scheduler, threshold: u64) -> bool {
    let appends = scheduler.wal_appends_since_compact().await;
    if threshold == 0 || appends < threshold {
        return false;
    }
    match scheduler.compact_wal().await {
        Ok(()) => {
            metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
            debug!("compacted after {appends} appends");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that keeps the WAL from growing without bound.
pub async fn run_compactor(scheduler: Arc<Scheduler>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        compact_if_needed(&scheduler, threshold).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::config::SchedulerConfig;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use ulid::Ulid;

    async fn scheduler(name: &str) -> (Scheduler, SchedulerConfig) {
        let dir = std::env::temp_dir().join("appointments_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        let config = SchedulerConfig::with_wal_path(path);
        let s = Scheduler::open(&config, Arc::new(InMemoryCatalog::new()), Arc::new(NotifyHub::new()))
            .await
            .unwrap();
        (s, config)
    }

    #[tokio::test]
    async fn below_threshold_does_nothing() {
        let (s, _) = scheduler("below.wal").await;
        let pid = Ulid::new();
        let t = 1_735_689_600_000;
        s.block_slot(pid, Span::new(t, t + HOUR), None).await.unwrap();
        assert!(!compact_if_needed(&s, 5).await);
        assert_eq!(s.wal_appends_since_compact().await, 1);
    }

    #[tokio::test]
    async fn at_threshold_compacts() {
        let (s, config) = scheduler("at_threshold.wal").await;
        let pid = Ulid::new();
        let t = 1_735_689_600_000;
        for i in 0..3 {
            let slot = s
                .block_slot(pid, Span::new(t + i * HOUR, t + (i + 1) * HOUR), None)
                .await
                .unwrap();
            if i > 0 {
                s.unblock_slot(slot.id).await.unwrap();
            }
        }
        assert!(compact_if_needed(&s, 5).await);
        assert_eq!(s.wal_appends_since_compact().await, 0);

        let replayed = crate::wal::Wal::replay(&config.wal_path).unwrap();
        assert_eq!(replayed.len(), 1);
    }
}
