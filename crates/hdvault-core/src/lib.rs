//! # hdvault-core
//! Foundation types shared by the hdvault crates.
//!
//! - [`params`] — per-network chain parameter records
//! - [`address`] — pay-to-pubkey-hash address encoding
//! - [`crypto`] — hash160 / double-SHA256 helpers
//! - [`store`] — namespaced transactional key/value store contract
//! - [`error`] — `StoreError` and `AddressError`

pub mod address;
pub mod crypto;
pub mod error;
pub mod params;
pub mod store;

pub use address::Address;
pub use error::{AddressError, StoreError};
pub use params::ChainParams;
pub use store::{KvStore, MemoryStore, Namespace, WriteBatch};
