//! Fixed-window rate limiting for mutating requests.
//!
//! One bucket per (client key, endpoint class). A bucket admits `requests`
//! calls per `window`; the window restarts on the first call after it
//! elapses. Read traffic never reaches the limiter.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Mutating endpoint groups that are budgeted separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Create,
    Update,
    Delete,
    Share,
}

/// Request budget. Zero in either field disables limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(requests: u32, window: Duration) -> Self {
        Self { requests, window }
    }

    pub fn is_enabled(&self) -> bool {
        self.requests > 0 && !self.window.is_zero()
    }
}

#[derive(Debug)]
struct Bucket {
    count: u32,
    window_start: Instant,
}

/// Shared limiter state. Each check is a single locked read-modify-write.
#[derive(Debug)]
pub struct RateLimiter {
    config: Option<RateLimitConfig>,
    buckets: Mutex<HashMap<(String, EndpointClass), Bucket>>,
}

impl RateLimiter {
    /// Limiter for `config`; `None` or a zero budget yields a disabled limiter.
    pub fn new(config: Option<RateLimitConfig>) -> Self {
        Self {
            config: config.filter(RateLimitConfig::is_enabled),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Admit or reject one request at the current instant.
    pub fn check(&self, client: &str, class: EndpointClass) -> Result<()> {
        self.check_at(client, class, Instant::now())
    }

    /// Admit or reject one request at `now`.
    pub fn check_at(&self, client: &str, class: EndpointClass, now: Instant) -> Result<()> {
        let Some(config) = self.config else {
            return Ok(());
        };

        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry((client.to_string(), class))
            .or_insert(Bucket {
                count: 0,
                window_start: now,
            });

        if now.saturating_duration_since(bucket.window_start) >= config.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        if bucket.count >= config.requests {
            log::debug!("Rate limit hit for {client} on {class:?}");
            return Err(Error::RateLimited);
        }
        bucket.count += 1;
        Ok(())
    }

    /// Drop buckets whose window has elapsed. Returns how many were removed.
    pub fn prune(&self, now: Instant) -> usize {
        let Some(config) = self.config else {
            return 0;
        };
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.window_start) < config.window);
        before - buckets.len()
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(requests: u32, secs: u64) -> RateLimiter {
        RateLimiter::new(Some(RateLimitConfig::new(requests, Duration::from_secs(secs))))
    }

    #[test]
    fn test_third_request_in_window_rejected() {
        let limiter = limiter(2, 60);
        let t0 = Instant::now();

        assert!(limiter.check_at("1.2.3.4", EndpointClass::Create, t0).is_ok());
        assert!(limiter
            .check_at("1.2.3.4", EndpointClass::Create, t0 + Duration::from_secs(1))
            .is_ok());
        assert!(matches!(
            limiter.check_at("1.2.3.4", EndpointClass::Create, t0 + Duration::from_secs(2)),
            Err(Error::RateLimited)
        ));
    }

    #[test]
    fn test_window_elapse_readmits() {
        let limiter = limiter(2, 60);
        let t0 = Instant::now();
        limiter.check_at("c", EndpointClass::Update, t0).unwrap();
        limiter.check_at("c", EndpointClass::Update, t0).unwrap();
        assert!(limiter.check_at("c", EndpointClass::Update, t0).is_err());

        let later = t0 + Duration::from_secs(60);
        assert!(limiter.check_at("c", EndpointClass::Update, later).is_ok());
    }

    #[test]
    fn test_buckets_are_per_client_and_class() {
        let limiter = limiter(1, 60);
        let t0 = Instant::now();
        limiter.check_at("a", EndpointClass::Create, t0).unwrap();
        assert!(limiter.check_at("a", EndpointClass::Delete, t0).is_ok());
        assert!(limiter.check_at("b", EndpointClass::Create, t0).is_ok());
        assert!(limiter.check_at("a", EndpointClass::Create, t0).is_err());
    }

    #[test]
    fn test_zero_config_disables() {
        for config in [
            None,
            Some(RateLimitConfig::new(0, Duration::from_secs(60))),
            Some(RateLimitConfig::new(5, Duration::ZERO)),
        ] {
            let limiter = RateLimiter::new(config);
            assert!(!limiter.is_enabled());
            for _ in 0..100 {
                assert!(limiter.check("c", EndpointClass::Create).is_ok());
            }
            assert_eq!(limiter.bucket_count(), 0);
        }
    }

    #[test]
    fn test_prune_drops_stale_buckets() {
        let limiter = limiter(5, 10);
        let t0 = Instant::now();
        limiter.check_at("a", EndpointClass::Create, t0).unwrap();
        limiter
            .check_at("b", EndpointClass::Create, t0 + Duration::from_secs(8))
            .unwrap();

        assert_eq!(limiter.prune(t0 + Duration::from_secs(12)), 1);
        assert_eq!(limiter.bucket_count(), 1);
    }

    #[test]
    fn test_concurrent_checks_do_not_undercount() {
        let limiter = Arc::new(limiter(100, 3600));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.check("shared", EndpointClass::Create).is_ok())
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
    }
}
