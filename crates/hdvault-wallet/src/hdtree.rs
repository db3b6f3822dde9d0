//! Seed handling and BIP-32/BIP-44 key derivation.
//!
//! Pure functions only: no storage access and no randomness (apart from
//! [`Seed::generate`]). The derivation path is
//!
//! ```text
//! m / 44' / coin_type' / account' / chain / index
//! ```
//!
//! with `chain` 0 for external (receiving) and 1 for internal (change)
//! addresses. Account keys are hardened children of the master key, so
//! creating an account needs the master private key; address keys are
//! non-hardened, so addresses derive from the account's extended public key
//! alone.

use std::fmt;
use std::str::FromStr;

use bip32::{ChildNumber, Prefix, XPrv, XPub};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use hdvault_core::address::Address;
use hdvault_core::params::ChainParams;

use crate::error::ManagerError;

/// BIP-44 purpose level.
pub const PURPOSE: u32 = 44;

/// First hardened child index.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Seed lengths accepted for master key generation.
pub const SEED_LENGTHS: [usize; 3] = [16, 32, 64];

/// Raw seed entropy for master key derivation.
///
/// Secret material is zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: Vec<u8>,
}

impl Seed {
    /// Generate a random 32-byte seed from the OS cryptographic RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a seed from raw bytes (16, 32 or 64 of them).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ManagerError> {
        if !SEED_LENGTHS.contains(&bytes.len()) {
            return Err(ManagerError::InvalidSeed(bytes.len()));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Which branch of an account an address belongs to.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChainKind {
    /// Receiving addresses (chain 0).
    External,
    /// Change addresses (chain 1).
    Internal,
}

impl ChainKind {
    /// Both chains in derivation order.
    pub const ALL: [ChainKind; 2] = [ChainKind::External, ChainKind::Internal];

    /// BIP-44 chain index.
    pub fn index(self) -> u32 {
        match self {
            ChainKind::External => 0,
            ChainKind::Internal => 1,
        }
    }

    /// Inverse of [`ChainKind::index`].
    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(ChainKind::External),
            1 => Some(ChainKind::Internal),
            _ => None,
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::External => write!(f, "external"),
            ChainKind::Internal => write!(f, "internal"),
        }
    }
}

/// An address derived by the manager together with its derivation path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ManagedAddress {
    /// Account index.
    pub account: u32,
    /// Chain within the account.
    pub chain: ChainKind,
    /// Child index within the chain.
    pub index: u32,
    /// The pay-to-pubkey-hash address.
    pub address: Address,
    /// Base58check encoding of `address`.
    pub encoded: String,
}

impl ManagedAddress {
    /// Build from a derived address, caching its string form.
    pub fn new(account: u32, chain: ChainKind, index: u32, address: Address) -> Self {
        Self {
            account,
            chain,
            index,
            encoded: address.encode(),
            address,
        }
    }

    /// The hash160 committed to by the address.
    pub fn pubkey_hash(&self) -> [u8; 20] {
        self.address.pubkey_hash()
    }
}

fn child(index: u32, hardened: bool) -> Result<ChildNumber, ManagerError> {
    ChildNumber::new(index, hardened).map_err(|e| ManagerError::Derivation(e.to_string()))
}

/// Derive the BIP-32 master key from a seed.
pub fn master_key(seed: &Seed) -> Result<XPrv, ManagerError> {
    XPrv::new(seed.as_bytes()).map_err(|e| match e {
        bip32::Error::SeedLength => ManagerError::InvalidSeed(seed.as_bytes().len()),
        other => ManagerError::Derivation(other.to_string()),
    })
}

/// Derive `m/44'/coin_type'/account'` from the master key.
pub fn derive_account_key(
    master: &XPrv,
    coin_type: u32,
    account: u32,
) -> Result<XPrv, ManagerError> {
    master
        .derive_child(child(PURPOSE, true)?)
        .and_then(|purpose| purpose.derive_child(ChildNumber::new(coin_type, true)?))
        .and_then(|coin| coin.derive_child(ChildNumber::new(account, true)?))
        .map_err(|e| ManagerError::Derivation(e.to_string()))
}

/// Derive the chain branch `account/chain` from an account public key.
pub fn derive_chain_key(account_key: &XPub, chain: ChainKind) -> Result<XPub, ManagerError> {
    account_key
        .derive_child(child(chain.index(), false)?)
        .map_err(|e| ManagerError::Derivation(e.to_string()))
}

/// Derive the address key at `index` below a chain key.
pub fn derive_index_key(chain_key: &XPub, index: u32) -> Result<XPub, ManagerError> {
    chain_key
        .derive_child(child(index, false)?)
        .map_err(|e| ManagerError::Derivation(e.to_string()))
}

/// Derive `account/chain/index` from an account public key.
pub fn derive_address_key(
    account_key: &XPub,
    chain: ChainKind,
    index: u32,
) -> Result<XPub, ManagerError> {
    derive_index_key(&derive_chain_key(account_key, chain)?, index)
}

/// Encode an address key as a pay-to-pubkey-hash address for `params`.
pub fn derive_address(address_key: &XPub, params: &ChainParams) -> Address {
    Address::from_public_key(&address_key.to_bytes(), params)
}

fn prefix(chars: &str, version: u32) -> Result<Prefix, ManagerError> {
    // `from_parts_unchecked` panics on anything but four ASCII letters.
    if chars.len() != 4 || !chars.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(ManagerError::Derivation(format!(
            "invalid extended key prefix {chars:?}"
        )));
    }
    Ok(Prefix::from_parts_unchecked(chars, version))
}

/// Serialize an extended private key with the network's version bytes.
pub fn encode_xprv(key: &XPrv, params: &ChainParams) -> Result<Zeroizing<String>, ManagerError> {
    let prefix = prefix(params.hd_private_prefix, params.hd_private_version())?;
    Ok(key.to_string(prefix))
}

/// Serialize an extended public key with the network's version bytes.
pub fn encode_xpub(key: &XPub, params: &ChainParams) -> Result<String, ManagerError> {
    let prefix = prefix(params.hd_public_prefix, params.hd_public_version())?;
    Ok(key.to_string(prefix))
}

/// Parse an extended private key serialized by [`encode_xprv`].
pub fn decode_xprv(bytes: &[u8]) -> Result<XPrv, ManagerError> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| ManagerError::Corrupt("extended private key is not utf-8".into()))?;
    XPrv::from_str(s).map_err(|e| ManagerError::Corrupt(format!("extended private key: {e}")))
}

/// Parse an extended public key serialized by [`encode_xpub`].
pub fn decode_xpub(bytes: &[u8]) -> Result<XPub, ManagerError> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| ManagerError::Corrupt("extended public key is not utf-8".into()))?;
    XPub::from_str(s).map_err(|e| ManagerError::Corrupt(format!("extended public key: {e}")))
}
