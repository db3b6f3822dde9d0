//! # hdvault-store — persistent storage for the address manager.
//!
//! - [`storage::RocksStore`] — [`KvStore`](hdvault_core::KvStore) backed by RocksDB
//! - [`config::StoreConfig`] — data directory layout

pub mod config;
pub mod storage;

pub use config::StoreConfig;
pub use storage::RocksStore;
