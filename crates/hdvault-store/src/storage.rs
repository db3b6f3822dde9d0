//! RocksDB-backed persistent key/value storage.
//!
//! Implements [`KvStore`] on a single `wallet` column family. Namespaces are
//! key prefixes (see [`hdvault_core::Namespace`]), so one database can hold
//! several independent managers. All mutations use an atomic [`WriteBatch`]
//! written with `sync` enabled for crash safety.
//!
//! Conditional writes are serialized by an in-process mutex. RocksDB's own
//! `LOCK` file keeps other processes out of the database while it is open.

use std::path::Path;

use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteOptions, DB};

use hdvault_core::error::StoreError;
use hdvault_core::store::{BatchOp, KvStore, WriteBatch};

// --- Column family names ---

const CF_WALLET: &str = "wallet";

/// All column family names.
const ALL_CFS: &[&str] = &[CF_WALLET];

/// RocksDB-backed persistent store.
pub struct RocksStore {
    db: DB,
    sync_writes: bool,
    /// Held across the check and the commit of `write_if_absent`.
    guard_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates the column families if they don't exist. Writes are synced to
    /// disk before [`KvStore::write`] returns.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(path, true)
    }

    /// Open with explicit control over write syncing.
    ///
    /// Unsynced writes are still atomic but may be lost on power failure.
    pub fn open_with(path: impl AsRef<Path>, sync_writes: bool) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), sync_writes, "opened wallet database");
        Ok(Self {
            db,
            sync_writes,
            guard_lock: Mutex::new(()),
        })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Trigger manual compaction of the wallet column family.
    pub fn compact(&self) -> Result<(), StoreError> {
        let cf = self.cf_handle(CF_WALLET)?;
        self.db.compact_range_cf(cf, None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }

    // --- Internal helpers ---

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {name}")))
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf_handle(CF_WALLET)?;
        self.db
            .get_cf(cf, key)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let cf = self.cf_handle(CF_WALLET)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        let mut result = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            // Keys are sorted, so the first non-matching key ends the range.
            if !key.starts_with(prefix) {
                break;
            }
            result.push((key.into_vec(), value.into_vec()));
        }
        Ok(result)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let _guard = self.guard_lock.lock();
        self.commit(batch)
    }

    fn write_if_absent(&self, guard: &[u8], batch: WriteBatch) -> Result<bool, StoreError> {
        let _guard = self.guard_lock.lock();
        if self.get(guard)?.is_some() {
            return Ok(false);
        }
        self.commit(batch)?;
        Ok(true)
    }
}

impl RocksStore {
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let cf = self.cf_handle(CF_WALLET)?;
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => rocks_batch.put_cf(cf, key, value),
                BatchOp::Delete { key } => rocks_batch.delete_cf(cf, key),
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db
            .write_opt(rocks_batch, &write_opts)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
