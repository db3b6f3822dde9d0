//! Address manager error types.

use hdvault_core::error::StoreError;
use thiserror::Error;

use crate::hdtree::ChainKind;

/// Errors that can occur in address manager operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// A manager is already stored in the target namespace.
    #[error("address manager already exists in namespace {0:?}")]
    AlreadyExists(String),

    /// The namespace holds no manager.
    #[error("no address manager in namespace {0:?}")]
    NoExist(String),

    /// The stored schema is newer than this build understands.
    #[error("schema version {found} is newer than supported version {supported}")]
    UpgradeRequired {
        /// Version found in storage.
        found: u32,
        /// Highest version this build supports.
        supported: u32,
    },

    /// Wrong passphrase, or sealed key material failed authentication.
    #[error("invalid passphrase or tampered key material")]
    AuthFailure,

    /// The operation needs private keys and the manager is locked.
    #[error("address manager is locked")]
    Locked,

    /// The operation needs private keys and the manager has none.
    #[error("address manager is watching-only")]
    WatchingOnlyViolation,

    /// An account with this name already exists.
    #[error("account name {0:?} already exists")]
    DuplicateAccount(String),

    /// The account name is empty or reserved.
    #[error("invalid account name {name:?}: {reason}")]
    InvalidAccountName {
        /// Rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// No account matches the given name or index.
    #[error("account not found: {0}")]
    InvalidAccount(String),

    /// Stored scrypt parameters disagree with a sealed key's parameters.
    #[error("scrypt parameters do not match the sealed key parameters")]
    ParamsMismatch,

    /// Underlying store failure. Committed state is left intact.
    #[error(transparent)]
    StorageFailure(#[from] StoreError),

    /// Seed length is not 16, 32 or 64 bytes.
    #[error("invalid seed length: {0} bytes")]
    InvalidSeed(usize),

    /// Scrypt parameters fail their lower bounds.
    #[error("invalid scrypt parameters: {0}")]
    InvalidParams(String),

    /// The manager was created for a different network.
    #[error("manager belongs to network magic {found:#010x}, expected {expected:#010x}")]
    WrongNetwork {
        /// Magic of the chain parameters supplied to `open`.
        expected: u32,
        /// Magic persisted at creation.
        found: u32,
    },

    /// No hardened account index remains.
    #[error("maximum number of accounts reached")]
    TooManyAccounts,

    /// The chain has run out of non-hardened indices.
    #[error("account {account} {chain} chain has no address indices left")]
    TooManyAddresses {
        /// Account index.
        account: u32,
        /// Chain that ran out.
        chain: ChainKind,
    },

    /// A persisted row is missing or undecodable.
    #[error("corrupt manager state: {0}")]
    Corrupt(String),

    /// Extended key derivation or parsing failed.
    #[error("key derivation: {0}")]
    Derivation(String),

    /// Sealing failed.
    #[error("encryption: {0}")]
    Encryption(String),

    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
}
