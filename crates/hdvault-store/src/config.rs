//! On-disk layout for wallet databases.
//!
//! Provides [`StoreConfig`] with a default data directory under the
//! platform data dir. Each network gets its own database directory so a
//! mainnet and a testnet wallet never share a RocksDB instance.

use std::path::PathBuf;

/// Configuration for locating and opening a wallet database.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Whether every batch is synced to disk before returning.
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hdvault");

        Self {
            data_dir,
            sync_writes: true,
        }
    }
}

impl StoreConfig {
    /// Directory holding the wallet database for `network`.
    pub fn db_path(&self, network: &str) -> PathBuf {
        self.data_dir.join(network).join("walletdb")
    }
}
