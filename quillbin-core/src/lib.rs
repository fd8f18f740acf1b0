//! # quillbin-core: Versioned document store with capability tokens
//!
//! Append-only versioned text documents plus the stateless authorization
//! layer that gates every mutation.
//!
//! ## Architecture
//!
//! ```text
//!   mutating request
//!          │
//!          ▼
//! ┌──────────────────┐   claims    ┌──────────────┐
//! │ AuthorizationGate│ ◄────────── │ TokenCodec   │
//! └────────┬─────────┘             │ (HS256 JWT)  │
//!          ▼                       └──────────────┘
//! ┌──────────────────┐
//! │ RateLimiter      │  (client, endpoint class) buckets
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐   stamp     ┌──────────────┐
//! │ DocumentStore    │ ◄────────── │ VersionClock │
//! │ (RocksDB)        │             └──────────────┘
//! └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`clock`]: Unix-second version stamps, strictly increasing per document
//! - [`document`]: Document rows, ID generation, version parsing
//! - [`storage`]: RocksDB store keyed by `(id, version)`
//! - [`token`]: Permission set, claims, signed token codec
//! - [`gate`]: Allow/deny decisions over verified claims
//! - [`limiter`]: Fixed-window request limiter for mutations
//! - [`language`]: Language name resolution and content detection
//! - [`service`]: `DocumentService`, the composition used by request handlers

pub mod clock;
pub mod document;
pub mod error;
pub mod gate;
pub mod language;
pub mod limiter;
pub mod service;
pub mod storage;
pub mod token;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock, VersionClock};
pub use document::{generate_id, parse_version, Document, LATEST_VERSION};
pub use error::{Error, Result};
pub use limiter::{EndpointClass, RateLimitConfig, RateLimiter};
pub use service::{CreatedDocument, DocumentService, ServiceConfig};
pub use storage::{DocumentStore, StoreConfig, StoreError};
pub use token::{Claims, Permission, TokenCodec, TokenError};
