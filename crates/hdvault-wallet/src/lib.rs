//! # hdvault-wallet — encrypted HD address manager.
//!
//! Turns one seed into a recoverable BIP-44 tree of accounts and addresses
//! while keeping every extended key sealed at rest. Public key material is
//! sealed under a public passphrase so addresses can be listed and derived
//! without the private passphrase; private key material needs an explicit
//! unlock.
//!
//! # Modules
//!
//! - [`error`] — `ManagerError` enum
//! - [`kdf`] — scrypt passphrase stretching
//! - [`sealed`] — AES-256-GCM sealing and two-tier key slots
//! - [`hdtree`] — Seed, BIP-32/BIP-44 derivation
//! - [`mnemonic`] — BIP-39 phrases
//! - [`lock`] — Locked / Unlocked / WatchingOnly state machine
//! - [`account`] — account naming rules and rows
//! - [`db`] — persisted layout
//! - [`config`] — `ManagerConfig`
//! - [`manager`] — the `AddressManager` facade

pub mod account;
pub mod config;
pub mod db;
pub mod error;
pub mod hdtree;
pub mod kdf;
pub mod lock;
pub mod manager;
pub mod mnemonic;
pub mod sealed;

// Re-exports for convenient access
pub use account::{AccountInfo, DEFAULT_ACCOUNT_NAME, IMPORTED_ACCOUNT_NAME, validate_account_name};
pub use config::ManagerConfig;
pub use error::ManagerError;
pub use hdtree::{ChainKind, ManagedAddress, Seed};
pub use kdf::ScryptParams;
pub use manager::{AccountAddresses, AddressManager, PassphraseTier};
pub use mnemonic::{mnemonic_to_seed, new_mnemonic, seed_to_mnemonic};
