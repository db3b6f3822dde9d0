//! Shared helpers for integration and property tests.

use std::sync::Arc;

use hdvault_core::store::MemoryStore;
use hdvault_wallet::{AddressManager, ManagerConfig, ScryptParams, Seed};

/// Cheap KDF cost so tests do not spend their time in scrypt.
pub const FAST_SCRYPT: ScryptParams = ScryptParams { n: 16, r: 8, p: 1 };

pub const PUBLIC_PASS: &[u8] = b"p1";
pub const PRIVATE_PASS: &[u8] = b"s1";

/// Mainnet config with the fast KDF.
pub fn test_config() -> ManagerConfig {
    ManagerConfig::default().with_scrypt(FAST_SCRYPT)
}

/// A 32-byte seed filled with `byte`.
pub fn seed_from(byte: u8) -> Seed {
    Seed::from_bytes(&[byte; 32]).expect("32-byte seed is valid")
}

pub type MemoryManager = AddressManager<Arc<MemoryStore>>;

/// Create a locked manager over a fresh in-memory store.
pub fn memory_manager(seed: Seed) -> (Arc<MemoryStore>, MemoryManager) {
    let store = Arc::new(MemoryStore::new());
    let mgr = AddressManager::create(store.clone(), seed, PUBLIC_PASS, PRIVATE_PASS, &test_config())
        .expect("create manager");
    (store, mgr)
}

/// Create and unlock a manager over a fresh in-memory store.
pub fn unlocked_manager(seed: Seed) -> (Arc<MemoryStore>, MemoryManager) {
    let (store, mgr) = memory_manager(seed);
    mgr.unlock(PRIVATE_PASS).expect("unlock manager");
    (store, mgr)
}

/// Reopen the manager persisted in `store`.
pub fn reopen(store: &Arc<MemoryStore>) -> MemoryManager {
    AddressManager::open(store.clone(), &test_config(), PUBLIC_PASS).expect("open manager")
}
