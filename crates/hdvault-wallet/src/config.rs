//! Manager configuration.

use hdvault_core::params::{ChainParams, MAINNET};

use crate::kdf::ScryptParams;

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "waddrmgr";

/// Everything `create` and `open` need besides the store and passphrases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Store namespace holding the manager.
    pub namespace: String,
    /// Network the manager derives addresses for.
    pub chain: ChainParams,
    /// KDF cost used by `create`. `open` reads the persisted parameters.
    pub scrypt: ScryptParams,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            chain: MAINNET,
            scrypt: ScryptParams::default(),
        }
    }
}

impl ManagerConfig {
    /// Default config for `chain`.
    pub fn for_chain(chain: ChainParams) -> Self {
        Self {
            chain,
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_scrypt(mut self, scrypt: ScryptParams) -> Self {
        self.scrypt = scrypt;
        self
    }
}
