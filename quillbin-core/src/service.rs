//! `DocumentService`: the operations request handlers call.
//!
//! Every mutation runs the same pipeline:
//!
//! ```text
//! authorize (gate) → admit (limiter) → validate → store (clock stamps version)
//! ```
//!
//! Reads skip the gate and the limiter entirely. All methods are blocking;
//! async callers should run them on a blocking thread.

use std::time::{Duration, Instant};

use crate::document::{Document, LATEST_VERSION};
use crate::error::{Error, Result};
use crate::gate;
use crate::language::resolve_language;
use crate::limiter::{EndpointClass, RateLimitConfig, RateLimiter};
use crate::storage::DocumentStore;
use crate::token::{Claims, Permission, TokenCodec};

/// Service-level settings.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Maximum content length in characters (0 = unlimited)
    pub max_document_size: usize,
    /// Mutation rate limit (None = disabled)
    pub rate_limit: Option<RateLimitConfig>,
    /// Symmetric secret for signing capability tokens
    pub signing_secret: String,
}

/// A newly created document and its owner token.
#[derive(Debug, Clone)]
pub struct CreatedDocument {
    pub document: Document,
    /// Token holding every permission on the new document
    pub token: String,
}

/// Versioned document operations behind capability tokens.
pub struct DocumentService {
    store: DocumentStore,
    codec: TokenCodec,
    limiter: RateLimiter,
    max_document_size: usize,
}

impl DocumentService {
    /// Build the service. Fails with `Invalid` when the signing secret is empty.
    pub fn new(store: DocumentStore, config: ServiceConfig) -> Result<Self> {
        let codec = TokenCodec::with_clock(&config.signing_secret, store.clock().source())?;
        let limiter = RateLimiter::new(config.rate_limit);
        if limiter.is_enabled() {
            log::info!("Rate limiting enabled: {:?}", config.rate_limit);
        }
        Ok(Self {
            store,
            codec,
            limiter,
            max_document_size: config.max_document_size,
        })
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Verify a bearer token. An absent token yields empty claims.
    pub fn verify_token(&self, token: Option<&str>) -> Result<Claims> {
        Ok(self.codec.verify(token)?)
    }

    // ─── Reads ────────────────────────────────────────────────────────

    /// Fetch a version, or the latest when `version` is [`LATEST_VERSION`].
    pub fn get(&self, id: &str, version: i64) -> Result<Document> {
        let document = if version == LATEST_VERSION {
            self.store.get_latest(id)?
        } else {
            self.store.get_version(id, version)?
        };
        Ok(document)
    }

    /// All versions of a document, oldest first. Unknown IDs are `NotFound`.
    pub fn list_versions(&self, id: &str, include_content: bool) -> Result<Vec<Document>> {
        let versions = self.store.list_versions(id, include_content)?;
        if versions.is_empty() {
            return Err(Error::NotFound);
        }
        Ok(versions)
    }

    /// Versions left for a document.
    pub fn remaining_versions(&self, id: &str) -> Result<usize> {
        Ok(self.store.count_versions(id)?)
    }

    // ─── Mutations ────────────────────────────────────────────────────

    /// Create a document and issue its owner token.
    pub fn create(&self, client: &str, content: &str, language: Option<&str>) -> Result<CreatedDocument> {
        self.limiter.check(client, EndpointClass::Create)?;
        self.validate_content(content)?;

        let language = resolve_language(language, content);
        let document = self.store.create(content, &language)?;
        let token = self.codec.issue(&document.id, Permission::ALL)?;

        log::debug!("Created document {} ({language})", document.id);
        Ok(CreatedDocument { document, token })
    }

    /// Append a new version. Requires `write`.
    pub fn update(
        &self,
        client: &str,
        claims: &Claims,
        id: &str,
        content: &str,
        language: Option<&str>,
    ) -> Result<Document> {
        gate::authorize(claims, id, Permission::Write)?;
        self.limiter.check(client, EndpointClass::Update)?;
        self.validate_content(content)?;

        let language = resolve_language(language, content);
        let document = self.store.update(id, content, &language)?;
        log::debug!("Updated document {id} to version {}", document.version);
        Ok(document)
    }

    /// Delete one version, or every version when `version` is
    /// [`LATEST_VERSION`]. Requires `delete`. Returns the versions left.
    pub fn delete(&self, client: &str, claims: &Claims, id: &str, version: i64) -> Result<usize> {
        gate::authorize(claims, id, Permission::Delete)?;
        self.limiter.check(client, EndpointClass::Delete)?;

        if version == LATEST_VERSION {
            self.store.delete_all(id)?;
            log::debug!("Deleted document {id}");
        } else {
            self.store.delete_version(id, version)?;
            log::debug!("Deleted version {version} of document {id}");
        }
        self.remaining_versions(id)
    }

    /// Issue a token carrying `requested` on `id`. Requires `share` and
    /// every requested permission.
    pub fn share(
        &self,
        client: &str,
        claims: &Claims,
        id: &str,
        requested: &[Permission],
    ) -> Result<String> {
        if requested.is_empty() {
            return Err(Error::invalid("no permissions provided"));
        }
        gate::authorize_share(claims, id, requested.iter().copied())?;
        self.limiter.check(client, EndpointClass::Share)?;

        Ok(self.codec.issue(id, requested.iter().copied())?)
    }

    // ─── Maintenance ──────────────────────────────────────────────────

    /// Delete versions older than `expire_after`. Returns rows removed.
    pub fn purge_expired(&self, expire_after: Duration) -> Result<usize> {
        let cutoff = self.store.clock().now() - expire_after.as_secs() as i64;
        Ok(self.store.delete_expired(cutoff)?)
    }

    /// Drop rate-limit buckets whose window has passed.
    pub fn prune_rate_limits(&self) -> usize {
        self.limiter.prune(Instant::now())
    }

    fn validate_content(&self, content: &str) -> Result<()> {
        if content.is_empty() {
            return Err(Error::invalid("empty request body"));
        }
        if self.max_document_size > 0 && content.chars().count() > self.max_document_size {
            return Err(Error::invalid(format!(
                "content too large, must be less than {} chars",
                self.max_document_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, VersionClock};
    use crate::storage::StoreConfig;
    use std::sync::Arc;

    const T0: i64 = 1_700_000_000;
    const CLIENT: &str = "203.0.113.7";

    fn service_with(dir: &tempfile::TempDir, config: ServiceConfig) -> (DocumentService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = DocumentStore::open_with_clock(
            StoreConfig::for_testing(dir.path().join("db")),
            VersionClock::new(clock.clone()),
        )
        .unwrap();
        (DocumentService::new(store, config).unwrap(), clock)
    }

    fn service(dir: &tempfile::TempDir) -> (DocumentService, Arc<ManualClock>) {
        service_with(
            dir,
            ServiceConfig {
                signing_secret: "secret".into(),
                ..ServiceConfig::default()
            },
        )
    }

    #[test]
    fn test_empty_secret_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(StoreConfig::for_testing(dir.path().join("db"))).unwrap();
        assert!(matches!(
            DocumentService::new(store, ServiceConfig::default()),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_create_then_get_latest() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);

        let created = svc.create(CLIENT, "hello", Some("go")).unwrap();
        let latest = svc.get(&created.document.id, LATEST_VERSION).unwrap();
        assert_eq!(latest.content, "hello");
        assert_eq!(latest.language, "Go");

        let claims = svc.verify_token(Some(&created.token)).unwrap();
        assert_eq!(claims.subject, created.document.id);
        assert_eq!(claims.permissions.len(), 3);
    }

    #[test]
    fn test_n_updates_give_n_plus_one_versions() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let created = svc.create(CLIENT, "v0", None).unwrap();
        let claims = svc.verify_token(Some(&created.token)).unwrap();
        let id = &created.document.id;

        for i in 1..=5 {
            svc.update(CLIENT, &claims, id, &format!("v{i}"), None).unwrap();
        }

        let versions = svc.list_versions(id, false).unwrap();
        assert_eq!(versions.len(), 6);
        assert!(versions.windows(2).all(|w| w[0].version <= w[1].version));
    }

    #[test]
    fn test_deleting_old_version_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, clock) = service(&dir);
        let created = svc.create(CLIENT, "one", None).unwrap();
        let claims = svc.verify_token(Some(&created.token)).unwrap();
        let id = &created.document.id;

        clock.advance(30);
        let latest = svc.update(CLIENT, &claims, id, "two", None).unwrap();

        let remaining = svc.delete(CLIENT, &claims, id, created.document.version).unwrap();
        assert_eq!(remaining, 1);
        assert_eq!(svc.get(id, LATEST_VERSION).unwrap(), latest);
    }

    #[test]
    fn test_delete_all_then_reads_fail() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let created = svc.create(CLIENT, "bye", None).unwrap();
        let claims = svc.verify_token(Some(&created.token)).unwrap();
        let id = &created.document.id;

        assert_eq!(svc.delete(CLIENT, &claims, id, LATEST_VERSION).unwrap(), 0);
        assert_eq!(svc.remaining_versions(id).unwrap(), 0);
        assert!(matches!(svc.get(id, LATEST_VERSION), Err(Error::NotFound)));
        assert!(matches!(svc.get(id, created.document.version), Err(Error::NotFound)));
        assert!(matches!(svc.list_versions(id, true), Err(Error::NotFound)));
        assert!(matches!(
            svc.update(CLIENT, &claims, id, "back", None),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_write_token_cannot_delete_or_escalate() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let created = svc.create(CLIENT, "doc", None).unwrap();
        let id = created.document.id.clone();

        let write_only = svc
            .verify_token(Some(&svc.codec.issue(&id, [Permission::Write]).unwrap()))
            .unwrap();
        assert!(matches!(
            svc.delete(CLIENT, &write_only, &id, LATEST_VERSION),
            Err(Error::NotFound)
        ));

        let write_share = svc
            .verify_token(Some(
                &svc.codec.issue(&id, [Permission::Write, Permission::Share]).unwrap(),
            ))
            .unwrap();
        assert!(matches!(
            svc.share(CLIENT, &write_share, &id, &[Permission::Delete]),
            Err(Error::Forbidden(Permission::Delete))
        ));
    }

    #[test]
    fn test_share_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let created = svc.create(CLIENT, "doc", None).unwrap();
        let claims = svc.verify_token(Some(&created.token)).unwrap();

        assert!(matches!(
            svc.share(CLIENT, &claims, &created.document.id, &[]),
            Err(Error::Invalid(_))
        ));
        assert!(matches!(
            svc.share(CLIENT, &claims, "someone-else", &[Permission::Write]),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_unauthenticated_mutations_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service(&dir);
        let created = svc.create(CLIENT, "doc", None).unwrap();
        let id = &created.document.id;
        let anonymous = svc.verify_token(None).unwrap();

        assert!(matches!(svc.update(CLIENT, &anonymous, id, "x", None), Err(Error::NotFound)));
        assert!(matches!(
            svc.delete(CLIENT, &anonymous, id, LATEST_VERSION),
            Err(Error::NotFound)
        ));
        assert!(matches!(
            svc.share(CLIENT, &anonymous, id, &[Permission::Write]),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn test_content_validation() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service_with(
            &dir,
            ServiceConfig {
                max_document_size: 5,
                signing_secret: "secret".into(),
                ..ServiceConfig::default()
            },
        );

        assert!(matches!(svc.create(CLIENT, "", None), Err(Error::Invalid(_))));
        assert!(matches!(svc.create(CLIENT, "toolong", None), Err(Error::Invalid(_))));
        // Limit counts characters, not bytes.
        assert!(svc.create(CLIENT, "ééééé", None).is_ok());
    }

    #[test]
    fn test_rate_limit_applies_to_mutations_only() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, _) = service_with(
            &dir,
            ServiceConfig {
                rate_limit: Some(RateLimitConfig::new(2, Duration::from_secs(60))),
                signing_secret: "secret".into(),
                ..ServiceConfig::default()
            },
        );

        let first = svc.create(CLIENT, "a", None).unwrap();
        svc.create(CLIENT, "b", None).unwrap();
        assert!(matches!(svc.create(CLIENT, "c", None), Err(Error::RateLimited)));
        assert!(svc.create("198.51.100.1", "d", None).is_ok());

        for _ in 0..10 {
            svc.get(&first.document.id, LATEST_VERSION).unwrap();
        }

        // Update has its own bucket.
        let claims = svc.verify_token(Some(&first.token)).unwrap();
        assert!(svc.update(CLIENT, &claims, &first.document.id, "a2", None).is_ok());
    }

    #[test]
    fn test_purge_expired() {
        let dir = tempfile::tempdir().unwrap();
        let (svc, clock) = service(&dir);
        let created = svc.create(CLIENT, "old", None).unwrap();

        clock.advance(3600);
        assert_eq!(svc.purge_expired(Duration::from_secs(7200)).unwrap(), 0);
        assert_eq!(svc.purge_expired(Duration::from_secs(1800)).unwrap(), 1);
        assert!(matches!(
            svc.get(&created.document.id, LATEST_VERSION),
            Err(Error::NotFound)
        ));
    }
}
