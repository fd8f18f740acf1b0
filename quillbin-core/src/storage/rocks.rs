//! RocksDB-backed versioned document store.
//!
//! Column families:
//! - `versions`: Per-version metadata (bincode: language)
//! - `contents`: Per-version content (LZ4 compressed)
//! - `marks`:    Highest version ever issued per document (8 bytes BE)
//!
//! Keys are `<id length:1 byte><id bytes><version:8 bytes big-endian>`. The
//! length byte makes every ID prefix unique, so a forward scan from the
//! prefix visits exactly one document's versions in ascending order, and a
//! reverse seek from `prefix | u64::MAX` lands on the latest one.
//!
//! Rows are never overwritten: create and update insert a new key, and an
//! insert onto an existing key fails with [`StoreError::Conflict`]. The
//! `marks` row keeps a deleted version's stamp from being issued again while
//! the document still exists.
//!
//! Reference: Kleppmann, DDIA, Chapter 3 (LSM Trees, SSTables)

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use parking_lot::{Mutex, MutexGuard};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::VersionClock;
use crate::document::{generate_id, Document, MAX_ID_LENGTH};

/// Column family names.
const CF_VERSIONS: &str = "versions";
const CF_CONTENTS: &str = "contents";
const CF_MARKS: &str = "marks";

/// All column family names for initialization.
const COLUMN_FAMILIES: &[&str] = &[CF_VERSIONS, CF_CONTENTS, CF_MARKS];

/// Number of per-ID write lock stripes.
const LOCK_STRIPES: usize = 64;

/// Attempts at finding an unused ID before `create` gives up.
const ID_ATTEMPTS: usize = 8;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// Enable fsync on every write (default: false)
    pub sync_writes: bool,
    /// Max open files for RocksDB (default: 512)
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 32MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("quillbin_data"),
            block_cache_size: 64 * 1024 * 1024, // 64MB
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 512,
            write_buffer_size: 32 * 1024 * 1024, // 32MB
        }
    }
}

impl StoreConfig {
    /// Create config for testing (small caches, temp directory).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024, // 8MB
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 4 * 1024 * 1024, // 4MB
        }
    }
}

/// Metadata stored for each version row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    /// Resolved language name
    pub language: String,
}

impl VersionMeta {
    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(meta)
    }
}

/// Storage errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// RocksDB internal error
    #[error("database error: {0}")]
    Database(String),
    /// Document or version not found
    #[error("document not found: {0}")]
    NotFound(String),
    /// The (id, version) key already exists
    #[error("version {version} of document {id} already exists")]
    Conflict { id: String, version: i64 },
    /// No unused document ID could be allocated
    #[error("could not allocate a document id after {0} attempts")]
    IdExhausted(usize),
    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),
    /// Compression error
    #[error("compression error: {0}")]
    Compression(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// RocksDB-backed append-only document store.
///
/// Reads are lock-free. Writes to one ID serialize on a lock stripe so the
/// "read latest, stamp, insert" sequence cannot interleave with another
/// write to the same ID; writes to different IDs rarely share a stripe.
pub struct DocumentStore {
    /// RocksDB instance (single-threaded mode, writes serialized by stripes)
    db: DBWithThreadMode<SingleThreaded>,
    /// Store configuration
    config: StoreConfig,
    /// Version stamp source
    clock: VersionClock,
    /// Per-ID write lock stripes
    locks: Vec<Mutex<()>>,
}

impl DocumentStore {
    /// Open the document store at the configured path, stamping versions
    /// with the system clock.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        Self::open_with_clock(config, VersionClock::system())
    }

    /// Open the store with an explicit version clock.
    ///
    /// Creates the database and column families if they don't exist.
    pub fn open_with_clock(config: StoreConfig, clock: VersionClock) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);
        db_opts.increase_parallelism(num_cpus());

        let cache = Cache::new_lru_cache(config.block_cache_size);
        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config, &cache)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        log::debug!("Opened document store at {}", config.path.display());

        Ok(Self {
            db,
            config,
            clock,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Build column-family-specific options.
    fn cf_options(name: &str, config: &StoreConfig, cache: &Cache) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        block_opts.set_block_size(16 * 1024); // 16KB blocks
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_VERSIONS => {
                // Small values, prefix-scanned per document
                opts.set_compression_type(DBCompressionType::Lz4);
                opts.set_max_write_buffer_number(2);
            }
            CF_CONTENTS => {
                // Values are already LZ4 compressed
                opts.set_compression_type(DBCompressionType::None);
                opts.set_max_write_buffer_number(4);
            }
            CF_MARKS => {
                // One fixed-size value per document
                opts.set_compression_type(DBCompressionType::None);
                opts.set_max_write_buffer_number(2);
            }
            _ => {}
        }

        opts
    }

    // ─── Writes ───────────────────────────────────────────────────────

    /// Persist a new document under a freshly generated ID.
    pub fn create(&self, content: &str, language: &str) -> Result<Document, StoreError> {
        for _ in 0..ID_ATTEMPTS {
            let id = generate_id();
            let prefix = Self::key_prefix(&id)?;
            let _guard = self.lock(&id);

            if self.latest_version(&prefix)?.is_some() {
                log::debug!("Generated id {id} already in use, retrying");
                continue;
            }

            let version = self.clock.next_version_after(self.high_water(&prefix)?);
            return self.insert(&id, &prefix, version, content, language);
        }
        Err(StoreError::IdExhausted(ID_ATTEMPTS))
    }

    /// Append a new version to an existing document.
    ///
    /// Fails with `NotFound` when `id` has no versions: an update never
    /// resurrects a deleted document. The new stamp is above every version
    /// ever issued for `id`, including deleted ones.
    pub fn update(&self, id: &str, content: &str, language: &str) -> Result<Document, StoreError> {
        let prefix = Self::key_prefix(id)?;
        let _guard = self.lock(id);

        let latest = self
            .latest_version(&prefix)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let floor = self.high_water(&prefix)?.map_or(latest, |mark| mark.max(latest));
        let version = self.clock.next_version_after(Some(floor));
        self.insert(id, &prefix, version, content, language)
    }

    /// Write both rows of one version in a single atomic batch.
    fn insert(
        &self,
        id: &str,
        prefix: &[u8],
        version: i64,
        content: &str,
        language: &str,
    ) -> Result<Document, StoreError> {
        let cf_versions = self.cf(CF_VERSIONS)?;
        let cf_contents = self.cf(CF_CONTENTS)?;
        let cf_marks = self.cf(CF_MARKS)?;
        let key = Self::version_key(prefix, version);

        if self.db.get_cf(&cf_versions, &key)?.is_some() {
            return Err(StoreError::Conflict {
                id: id.to_string(),
                version,
            });
        }

        let compressed = lz4_flex::compress_prepend_size(content.as_bytes());
        let meta = VersionMeta {
            language: language.to_string(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_versions, &key, &meta.encode()?);
        batch.put_cf(&cf_contents, &key, &compressed);
        batch.put_cf(&cf_marks, prefix, (version as u64).to_be_bytes());

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        Ok(Document {
            id: id.to_string(),
            version,
            content: content.to_string(),
            language: meta.language,
        })
    }

    /// Remove every version of a document.
    pub fn delete_all(&self, id: &str) -> Result<(), StoreError> {
        let prefix = Self::key_prefix(id)?;
        let _guard = self.lock(id);

        let keys = self.version_keys(&prefix)?;
        if keys.is_empty() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.delete_keys(&keys, Some(prefix.as_slice()))
    }

    /// Remove exactly one version. Other versions are untouched.
    pub fn delete_version(&self, id: &str, version: i64) -> Result<(), StoreError> {
        let prefix = Self::key_prefix(id)?;
        if version <= 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let _guard = self.lock(id);

        let key = Self::version_key(&prefix, version);
        let cf = self.cf(CF_VERSIONS)?;
        if self.db.get_cf(&cf, &key)?.is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        // The mark goes with the last version.
        let last = self.version_keys(&prefix)?.len() == 1;
        self.delete_keys(&[key], last.then_some(prefix.as_slice()))
    }

    /// Delete every version stamped before `cutoff` (Unix seconds).
    ///
    /// Returns the number of version rows removed.
    pub fn delete_expired(&self, cutoff: i64) -> Result<usize, StoreError> {
        let cf = self.cf(CF_VERSIONS)?;

        let mut expired: BTreeMap<String, Vec<Vec<u8>>> = BTreeMap::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            if let Some((id, version)) = Self::split_key(&key) {
                if version < cutoff {
                    expired.entry(id.to_string()).or_default().push(key.to_vec());
                }
            }
        }

        let mut removed = 0;
        for (id, keys) in expired {
            let _guard = self.lock(&id);
            let mut live = Vec::with_capacity(keys.len());
            for key in keys {
                if self.db.get_cf(&cf, &key)?.is_some() {
                    live.push(key);
                }
            }
            if !live.is_empty() {
                let prefix = Self::key_prefix(&id)?;
                let last = self.version_keys(&prefix)?.len() == live.len();
                self.delete_keys(&live, last.then_some(prefix.as_slice()))?;
                removed += live.len();
                log::debug!("Expired {} version(s) of document {id}", live.len());
            }
        }

        Ok(removed)
    }

    /// Remove version rows, and the document's mark when `mark` is given.
    fn delete_keys(&self, keys: &[Vec<u8>], mark: Option<&[u8]>) -> Result<(), StoreError> {
        let cf_versions = self.cf(CF_VERSIONS)?;
        let cf_contents = self.cf(CF_CONTENTS)?;

        let mut batch = WriteBatch::default();
        for key in keys {
            batch.delete_cf(&cf_versions, key);
            batch.delete_cf(&cf_contents, key);
        }
        if let Some(prefix) = mark {
            batch.delete_cf(&self.cf(CF_MARKS)?, prefix);
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }

    // ─── Reads ────────────────────────────────────────────────────────

    /// Load the version with the highest stamp.
    pub fn get_latest(&self, id: &str) -> Result<Document, StoreError> {
        let prefix = Self::key_prefix(id)?;
        let version = self
            .latest_version(&prefix)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.read(id, &Self::version_key(&prefix, version), version)
    }

    /// Load one exact version.
    pub fn get_version(&self, id: &str, version: i64) -> Result<Document, StoreError> {
        let prefix = Self::key_prefix(id)?;
        if version <= 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.read(id, &Self::version_key(&prefix, version), version)
    }

    /// All versions of a document in ascending version order.
    ///
    /// With `include_content = false` only metadata is read and `content`
    /// is left empty. Unknown IDs yield an empty list.
    pub fn list_versions(&self, id: &str, include_content: bool) -> Result<Vec<Document>, StoreError> {
        let Ok(prefix) = Self::key_prefix(id) else {
            return Ok(Vec::new());
        };
        let cf = self.cf(CF_VERSIONS)?;

        let mut documents = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let Some((_, version)) = Self::split_key(&key) else {
                continue;
            };

            let meta = VersionMeta::decode(&value)?;
            let content = if include_content {
                self.read_content(id, &key)?
            } else {
                String::new()
            };
            documents.push(Document {
                id: id.to_string(),
                version,
                content,
                language: meta.language,
            });
        }

        Ok(documents)
    }

    /// Number of versions currently stored for a document.
    pub fn count_versions(&self, id: &str) -> Result<usize, StoreError> {
        let Ok(prefix) = Self::key_prefix(id) else {
            return Ok(0);
        };
        Ok(self.version_keys(&prefix)?.len())
    }

    /// List all document IDs that have at least one version.
    pub fn list_documents(&self) -> Result<Vec<String>, StoreError> {
        let cf = self.cf(CF_VERSIONS)?;
        let mut ids: Vec<String> = Vec::new();

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            if let Some((id, _)) = Self::split_key(&key) {
                if ids.last().map(String::as_str) != Some(id) {
                    ids.push(id.to_string());
                }
            }
        }

        Ok(ids)
    }

    fn read(&self, id: &str, key: &[u8], version: i64) -> Result<Document, StoreError> {
        let cf = self.cf(CF_VERSIONS)?;
        let meta = match self.db.get_cf(&cf, key)? {
            Some(bytes) => VersionMeta::decode(&bytes)?,
            None => return Err(StoreError::NotFound(id.to_string())),
        };
        Ok(Document {
            id: id.to_string(),
            version,
            content: self.read_content(id, key)?,
            language: meta.language,
        })
    }

    fn read_content(&self, id: &str, key: &[u8]) -> Result<String, StoreError> {
        let cf = self.cf(CF_CONTENTS)?;
        let compressed = self
            .db
            .get_cf(&cf, key)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let bytes = lz4_flex::decompress_size_prepended(&compressed)
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    /// Highest stored version under `prefix`, if any.
    fn latest_version(&self, prefix: &[u8]) -> Result<Option<i64>, StoreError> {
        let cf = self.cf(CF_VERSIONS)?;
        let mut end_key = prefix.to_vec();
        end_key.extend_from_slice(&u64::MAX.to_be_bytes());

        let mut iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&end_key, Direction::Reverse));
        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                if !key.starts_with(prefix) {
                    return Ok(None);
                }
                Ok(Self::split_key(&key).map(|(_, version)| version))
            }
            None => Ok(None),
        }
    }

    /// Highest version ever issued under `prefix`, surviving deletes of
    /// individual versions.
    fn high_water(&self, prefix: &[u8]) -> Result<Option<i64>, StoreError> {
        let cf = self.cf(CF_MARKS)?;
        match self.db.get_cf(&cf, prefix)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Deserialization(format!("bad mark of {} bytes", bytes.len()))
                })?;
                Ok(Some(u64::from_be_bytes(raw) as i64))
            }
            None => Ok(None),
        }
    }

    fn version_keys(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StoreError> {
        let cf = self.cf(CF_VERSIONS)?;
        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    // ─── Maintenance ──────────────────────────────────────────────────

    /// Flush memtables of every column family to disk.
    pub fn sync(&self) -> Result<(), StoreError> {
        for name in COLUMN_FAMILIES {
            let cf = self.cf(name)?;
            self.db.flush_cf(&cf)?;
        }
        Ok(())
    }

    /// Version stamp source used by this store.
    pub fn clock(&self) -> &VersionClock {
        &self.clock
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("Column family '{name}' not found")))
    }

    fn lock(&self, id: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        self.locks[(hasher.finish() as usize) % LOCK_STRIPES].lock()
    }

    /// Build the key prefix for a document: length byte + ID bytes.
    fn key_prefix(id: &str) -> Result<Vec<u8>, StoreError> {
        if id.is_empty() || id.len() > MAX_ID_LENGTH {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let mut prefix = Vec::with_capacity(1 + id.len() + 8);
        prefix.push(id.len() as u8);
        prefix.extend_from_slice(id.as_bytes());
        Ok(prefix)
    }

    /// Build a version key: prefix + version (8 bytes big-endian).
    fn version_key(prefix: &[u8], version: i64) -> Vec<u8> {
        let mut key = Vec::with_capacity(prefix.len() + 8);
        key.extend_from_slice(prefix);
        key.extend_from_slice(&(version as u64).to_be_bytes());
        key
    }

    /// Split a version key back into (id, version).
    fn split_key(key: &[u8]) -> Option<(&str, i64)> {
        let len = *key.first()? as usize;
        if key.len() != 1 + len + 8 {
            return None;
        }
        let id = std::str::from_utf8(&key[1..1 + len]).ok()?;
        let version = u64::from_be_bytes(key[1 + len..].try_into().ok()?);
        Some((id, version as i64))
    }
}

/// Get number of CPU cores for RocksDB parallelism.
fn num_cpus() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4)
}
