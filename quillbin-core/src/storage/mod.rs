//! Persistent storage layer for versioned documents.
//!
//! ## Components
//!
//! - [`DocumentStore`]: RocksDB-backed append-only version log
//! - [`StoreConfig`]: Tuning knobs for the underlying database
//!
//! ## Storage Layout
//!
//! ```text
//! Column Family    Key                                Value
//! ─────────────    ──────────────────────────────     ──────────────────────
//! versions         len:u8 | id | version:u64 BE       VersionMeta (bincode)
//! contents         len:u8 | id | version:u64 BE       content (LZ4 compressed)
//! marks            len:u8 | id                        highest issued version:u64 BE
//! ```
//!
//! Both rows of a version are written and removed in one `WriteBatch`, so a
//! version is either fully present or absent. The mark is updated in the
//! same batch and dropped with the document's last version.

pub mod rocks;

pub use rocks::{DocumentStore, StoreConfig, StoreError, VersionMeta};
