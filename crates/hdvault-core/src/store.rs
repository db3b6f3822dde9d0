//! Namespaced transactional key/value store contract.
//!
//! A [`KvStore`] is a flat ordered byte-keyed map with atomic batch writes.
//! [`Namespace`] partitions one store between independent users by
//! prefixing every key with `name || 0x00`, so prefix scans inside a
//! namespace never see another namespace's keys.
//!
//! [`MemoryStore`] is the in-process implementation used by tests and by
//! callers that do not need persistence; the RocksDB implementation lives in
//! `hdvault-store`.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
#[cfg(any(test, feature = "testing"))]
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::error::StoreError;

/// Byte separating a namespace name from the keys inside it.
const NAMESPACE_SEPARATOR: u8 = 0x00;

/// A single mutation inside a [`WriteBatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite a key.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Remove a key (no-op if absent).
    Delete { key: Vec<u8> },
}

/// An ordered list of mutations committed all-or-nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Queue a delete.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The queued operations in insertion order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Consume the batch, yielding its operations.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Ordered key/value storage with atomic batch commits.
///
/// Implementations must apply a [`WriteBatch`] atomically: after a crash or
/// an error either every operation is visible or none is.
pub trait KvStore: Send + Sync {
    /// Read a single key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Apply every operation in `batch` atomically.
    fn write(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Apply `batch` atomically only if `guard` is absent.
    ///
    /// The check and the commit form one step with respect to every other
    /// `write_if_absent` on the same store. Returns `false`, writing nothing,
    /// when `guard` already exists.
    fn write_if_absent(&self, guard: &[u8], batch: WriteBatch) -> Result<bool, StoreError>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        (**self).scan_prefix(prefix)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        (**self).write(batch)
    }

    fn write_if_absent(&self, guard: &[u8], batch: WriteBatch) -> Result<bool, StoreError> {
        (**self).write_if_absent(guard, batch)
    }
}

/// In-memory store for testing and ephemeral managers.
///
/// Backed by a `BTreeMap` under a single `RwLock`; a batch is applied while
/// holding the write guard so readers never observe half of it.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    #[cfg(any(test, feature = "testing"))]
    fail_next_write: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of keys across all namespaces.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Make the next [`KvStore::write`] fail with a backend error without
    /// applying any of its operations.
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.map.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let map = self.map.read();
        let range = map.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded));
        Ok(range
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.check_injected_failure()?;
        apply(&mut self.map.write(), batch);
        Ok(())
    }

    fn write_if_absent(&self, guard: &[u8], batch: WriteBatch) -> Result<bool, StoreError> {
        self.check_injected_failure()?;
        let mut map = self.map.write();
        if map.contains_key(guard) {
            return Ok(false);
        }
        apply(&mut map, batch);
        Ok(true)
    }
}

impl MemoryStore {
    #[cfg(any(test, feature = "testing"))]
    fn check_injected_failure(&self) -> Result<(), StoreError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".into()));
        }
        Ok(())
    }

    #[cfg(not(any(test, feature = "testing")))]
    fn check_injected_failure(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

fn apply(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, batch: WriteBatch) {
    for op in batch.into_ops() {
        match op {
            BatchOp::Put { key, value } => {
                map.insert(key, value);
            }
            BatchOp::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

/// A named partition of a shared [`KvStore`].
///
/// Opening a namespace never writes; it comes into existence the first time
/// a batch commits a key under it.
pub struct Namespace<S> {
    store: S,
    name: String,
    prefix: Vec<u8>,
}

impl<S: KvStore> Namespace<S> {
    /// Open (or lazily create) the namespace `name` in `store`.
    pub fn open(store: S, name: &str) -> Self {
        let mut prefix = Vec::with_capacity(name.len() + 1);
        prefix.extend_from_slice(name.as_bytes());
        prefix.push(NAMESPACE_SEPARATOR);
        Self {
            store,
            name: name.to_string(),
            prefix,
        }
    }

    /// The namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read a key inside this namespace.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.store.get(&self.full_key(key))
    }

    /// Entries whose namespace-relative key starts with `prefix`, ascending.
    ///
    /// Returned keys are namespace-relative.
    pub fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let strip = self.prefix.len();
        Ok(self
            .store
            .scan_prefix(&self.full_key(prefix))?
            .into_iter()
            .map(|(k, v)| (k[strip..].to_vec(), v))
            .collect())
    }

    /// Whether nothing has ever been committed under this namespace.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.store.scan_prefix(&self.prefix)?.is_empty())
    }

    /// Commit a batch of namespace-relative operations atomically.
    pub fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.store.write(self.scoped(batch))
    }

    /// Commit `batch` only if the namespace-relative key `guard` is absent.
    ///
    /// See [`KvStore::write_if_absent`].
    pub fn write_if_absent(&self, guard: &[u8], batch: WriteBatch) -> Result<bool, StoreError> {
        self.store
            .write_if_absent(&self.full_key(guard), self.scoped(batch))
    }

    fn scoped(&self, batch: WriteBatch) -> WriteBatch {
        let mut scoped = WriteBatch::new();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => scoped.put(self.full_key(&key), value),
                BatchOp::Delete { key } => scoped.delete(self.full_key(&key)),
            }
        }
        scoped
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.prefix.len() + key.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(key);
        full
    }
}
