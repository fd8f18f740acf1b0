//! Periodic background sweep: expired versions and stale rate-limit buckets.

use std::sync::Arc;
use std::time::Duration;

use quillbin_core::DocumentService;
use tokio::task::JoinHandle;

/// Run one sweep. Returns the number of version rows removed.
pub fn sweep(service: &DocumentService, expire_after: Option<Duration>) -> usize {
    let pruned = service.prune_rate_limits();
    if pruned > 0 {
        log::debug!("Pruned {pruned} rate-limit buckets");
    }

    let Some(expire_after) = expire_after else {
        return 0;
    };
    match service.purge_expired(expire_after) {
        Ok(0) => 0,
        Ok(removed) => {
            log::info!("Expired {removed} document versions");
            removed
        }
        Err(e) => {
            log::error!("Failed to delete expired documents: {e}");
            0
        }
    }
}

/// Spawn the sweep loop. The first sweep runs after one `interval`.
pub fn spawn(
    service: Arc<DocumentService>,
    interval: Duration,
    expire_after: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let service = service.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || sweep(&service, expire_after)).await {
                log::error!("Maintenance sweep panicked: {e}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillbin_core::{
        DocumentStore, ManualClock, ServiceConfig, StoreConfig, VersionClock, LATEST_VERSION,
    };

    #[test]
    fn test_sweep_expires_old_versions() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store = DocumentStore::open_with_clock(
            StoreConfig::for_testing(dir.path().join("db")),
            VersionClock::new(clock.clone()),
        )
        .unwrap();
        let service = DocumentService::new(
            store,
            ServiceConfig {
                signing_secret: "secret".into(),
                ..ServiceConfig::default()
            },
        )
        .unwrap();

        let old = service.create("client", "old", None).unwrap();
        clock.advance(600);
        let fresh = service.create("client", "fresh", None).unwrap();

        assert_eq!(sweep(&service, None), 0);
        assert_eq!(sweep(&service, Some(Duration::from_secs(300))), 1);
        assert!(service.get(&old.document.id, LATEST_VERSION).is_err());
        assert!(service.get(&fresh.document.id, LATEST_VERSION).is_ok());
    }
}
