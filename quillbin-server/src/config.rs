//! Server configuration.
//!
//! Loaded from a TOML file; every field has a default so a partial file (or
//! none at all) is valid.
//!
//! ```toml
//! listen_addr = "0.0.0.0:8080"
//! max_document_size = 0        # characters, 0 = unlimited
//! jwt_secret = "change-me"
//!
//! [database]
//! path = "quillbin_data"
//! expire_after_secs = 0        # 0 = keep forever
//! cleanup_interval_secs = 60
//!
//! [rate_limit]
//! requests = 10
//! duration_secs = 60
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quillbin_core::{RateLimitConfig, ServiceConfig, StoreConfig};
use serde::Deserialize;

use crate::error::ServerError;

/// Environment variable overriding `jwt_secret`.
pub const SECRET_ENV: &str = "QUILLBIN_JWT_SECRET";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to bind to
    pub listen_addr: String,
    /// Verbose logging
    pub debug: bool,
    /// Maximum content length in characters (0 = unlimited)
    pub max_document_size: usize,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Token signing secret
    pub jwt_secret: String,
    pub database: DatabaseConfig,
    /// Mutation rate limit (absent = disabled)
    pub rate_limit: Option<RateLimitSection>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            debug: false,
            max_document_size: 0,
            request_timeout_secs: 30,
            jwt_secret: String::new(),
            database: DatabaseConfig::default(),
            rate_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// RocksDB directory
    pub path: PathBuf,
    /// Delete versions older than this many seconds (0 = never)
    pub expire_after_secs: u64,
    /// Seconds between maintenance sweeps
    pub cleanup_interval_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("quillbin_data"),
            expire_after_secs: 0,
            cleanup_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub requests: u32,
    pub duration_secs: u64,
}

impl Config {
    /// Read and parse a TOML config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ServerError> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `QUILLBIN_JWT_SECRET` if set and non-empty.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(SECRET_ENV) {
            if !secret.is_empty() {
                self.jwt_secret = secret;
            }
        }
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.jwt_secret.is_empty() {
            return Err(ServerError::MissingSecret);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Request body cap in bytes. A character is at most four UTF-8 bytes,
    /// so any document the size check admits also fits the body limit.
    /// `None` when documents are unlimited.
    pub fn body_limit(&self) -> Option<usize> {
        (self.max_document_size > 0).then(|| self.max_document_size.saturating_mul(4))
    }

    /// Expiry window, if document expiry is enabled.
    pub fn expire_after(&self) -> Option<Duration> {
        (self.database.expire_after_secs > 0)
            .then(|| Duration::from_secs(self.database.expire_after_secs))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.database.cleanup_interval_secs.max(1))
    }

    pub fn rate_limit(&self) -> Option<RateLimitConfig> {
        self.rate_limit
            .map(|r| RateLimitConfig::new(r.requests, Duration::from_secs(r.duration_secs)))
            .filter(RateLimitConfig::is_enabled)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.database.path.clone(),
            ..StoreConfig::default()
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_document_size: self.max_document_size,
            rate_limit: self.rate_limit(),
            signing_secret: self.jwt_secret.clone(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, " ListenAddr: {}", self.listen_addr)?;
        writeln!(f, " Debug: {}", self.debug)?;
        writeln!(f, " MaxDocumentSize: {}", self.max_document_size)?;
        writeln!(f, " RequestTimeout: {}s", self.request_timeout_secs)?;
        writeln!(f, " Database:")?;
        writeln!(f, "  Path: {}", self.database.path.display())?;
        writeln!(f, "  ExpireAfter: {}s", self.database.expire_after_secs)?;
        writeln!(f, "  CleanupInterval: {}s", self.database.cleanup_interval_secs)?;
        match self.rate_limit {
            Some(r) => writeln!(f, " RateLimit: {} requests / {}s", r.requests, r.duration_secs)?,
            None => writeln!(f, " RateLimit: disabled")?,
        }
        write!(f, " JWTSecret: {}", "*".repeat(self.jwt_secret.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.rate_limit().is_none());
        assert!(config.expire_after().is_none());
    }

    #[test]
    fn test_parse_full_file() {
        let config = Config::from_toml_str(
            r#"
            listen_addr = "0.0.0.0:9000"
            max_document_size = 1000
            jwt_secret = "s3cret"

            [database]
            path = "/var/lib/quillbin"
            expire_after_secs = 86400

            [rate_limit]
            requests = 10
            duration_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.database.path, PathBuf::from("/var/lib/quillbin"));
        assert_eq!(config.database.cleanup_interval_secs, 60);
        assert_eq!(config.expire_after(), Some(Duration::from_secs(86400)));
        assert_eq!(
            config.rate_limit(),
            Some(RateLimitConfig::new(10, Duration::from_secs(60)))
        );

        let service = config.service_config();
        assert_eq!(service.max_document_size, 1000);
        assert_eq!(service.signing_secret, "s3cret");
    }

    #[test]
    fn test_body_limit_follows_document_size() {
        assert_eq!(Config::default().body_limit(), None);

        let config = Config {
            max_document_size: 1000,
            ..Config::default()
        };
        assert_eq!(config.body_limit(), Some(4000));

        let config = Config {
            max_document_size: usize::MAX,
            ..Config::default()
        };
        assert_eq!(config.body_limit(), Some(usize::MAX));
    }

    #[test]
    fn test_zero_rate_limit_is_disabled() {
        let config = Config::from_toml_str("[rate_limit]\nrequests = 0\nduration_secs = 60\n").unwrap();
        assert!(config.rate_limit().is_none());
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        assert!(matches!(
            Config::from_toml_str("listen_addr = ["),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_validate_requires_secret() {
        assert!(matches!(Config::default().validate(), Err(ServerError::MissingSecret)));
    }

    #[test]
    fn test_display_masks_secret() {
        let config = Config {
            jwt_secret: "hunter2".into(),
            ..Config::default()
        };
        let shown = config.to_string();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("*******"));
    }
}
