//! Passphrase stretching with scrypt.
//!
//! A passphrase plus a per-purpose random salt is turned into a 256-bit
//! symmetric key. The cost parameters are chosen when the manager is created
//! and persisted next to the salt; every later derivation must use exactly
//! the same parameters or it silently produces a different key.

use std::fmt;

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::ManagerError;

/// Length of derived and random symmetric keys.
pub const KEY_LEN: usize = 32;

/// Length of a KDF salt.
pub const SALT_LEN: usize = 32;

/// Scrypt cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct ScryptParams {
    /// CPU/memory cost. Must be a power of two, at least 2.
    pub n: u64,
    /// Block size. At least 1.
    pub r: u32,
    /// Parallelism. At least 1.
    pub p: u32,
}

impl Default for ScryptParams {
    fn default() -> Self {
        Self {
            n: 262_144,
            r: 8,
            p: 1,
        }
    }
}

impl ScryptParams {
    /// Reject parameters below the scrypt lower bounds.
    pub fn validate(&self) -> Result<(), ManagerError> {
        self.to_scrypt().map(|_| ())
    }

    fn to_scrypt(&self) -> Result<scrypt::Params, ManagerError> {
        if self.n < 2 || !self.n.is_power_of_two() {
            return Err(ManagerError::InvalidParams(format!(
                "N must be a power of two >= 2, got {}",
                self.n
            )));
        }
        if self.r == 0 {
            return Err(ManagerError::InvalidParams("r must be >= 1".into()));
        }
        if self.p == 0 {
            return Err(ManagerError::InvalidParams("p must be >= 1".into()));
        }
        let log_n = self.n.trailing_zeros() as u8;
        scrypt::Params::new(log_n, self.r, self.p, KEY_LEN)
            .map_err(|e| ManagerError::InvalidParams(e.to_string()))
    }
}

/// A 256-bit symmetric key.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; KEY_LEN],
}

impl SecretKey {
    /// Generate a random key from the OS cryptographic RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Parse a key from a slice of exactly [`KEY_LEN`] bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, ManagerError> {
        let bytes: [u8; KEY_LEN] = slice
            .try_into()
            .map_err(|_| ManagerError::Corrupt(format!("key length {}", slice.len())))?;
        Ok(Self { bytes })
    }

    /// Raw key bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Stretch `passphrase` into a symmetric key.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &ScryptParams,
) -> Result<SecretKey, ManagerError> {
    let scrypt_params = params.to_scrypt()?;
    let mut bytes = [0u8; KEY_LEN];
    scrypt::scrypt(passphrase, salt, &scrypt_params, &mut bytes)
        .map_err(|e| ManagerError::InvalidParams(e.to_string()))?;
    let key = SecretKey::from_bytes(bytes);
    bytes.zeroize();
    Ok(key)
}

/// Salt and parameters needed to re-derive one passphrase key.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct KdfRecord {
    /// Random salt, unique per passphrase.
    pub salt: [u8; SALT_LEN],
    /// Cost parameters the key was derived with.
    pub params: ScryptParams,
}

impl KdfRecord {
    /// Fresh random salt for the given parameters.
    pub fn generate(params: ScryptParams) -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self { salt, params }
    }

    /// Derive the key for `passphrase` under this record.
    pub fn derive(&self, passphrase: &[u8]) -> Result<SecretKey, ManagerError> {
        derive_key(passphrase, &self.salt, &self.params)
    }
}
