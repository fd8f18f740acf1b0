//! Version stamps.
//!
//! A version is the Unix time in seconds at write time. Two writes to the
//! same document inside one second would collide, so the stamp handed to the
//! store is `max(now, latest + 1)`: still a plausible timestamp, and strictly
//! greater than every version already stored for that document.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }
}

/// Clock that only moves when told to. Used by tests and benches.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Produces version stamps for document writes.
#[derive(Clone)]
pub struct VersionClock {
    clock: Arc<dyn Clock>,
}

impl VersionClock {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Version clock backed by the system clock.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// The underlying time source, for components that share it.
    pub fn source(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Current time in Unix seconds.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Current time as a version stamp. Never returns the `0` sentinel.
    pub fn next_version(&self) -> i64 {
        self.clock.now().max(1)
    }

    /// Version stamp for a write following `latest` on the same document.
    pub fn next_version_after(&self, latest: Option<i64>) -> i64 {
        let now = self.next_version();
        match latest {
            Some(latest) if latest >= now => latest + 1,
            _ => now,
        }
    }
}

impl Default for VersionClock {
    fn default() -> Self {
        Self::system()
    }
}

impl std::fmt::Debug for VersionClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionClock")
            .field("now", &self.clock.now())
            .finish()
    }
}
