//! AES-256-GCM sealing of key material.
//!
//! # Wire format
//! ```text
//! nonce (12 bytes) || ciphertext + auth_tag (16 bytes)
//! ```
//!
//! Key material is sealed in two tiers. A passphrase is stretched (see
//! [`crate::kdf`]) into a *master key* which seals a random *crypto key*;
//! the crypto key seals the extended keys. A [`SealedSlot`] bundles one tier:
//! its KDF record, the sealed crypto key and the sealed master extended key.
//! Changing a passphrase only reseals the crypto key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::ManagerError;
use crate::kdf::{KdfRecord, ScryptParams, SecretKey};

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn seal(plaintext: &[u8], key: &SecretKey) -> Result<Vec<u8>, ManagerError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| ManagerError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| ManagerError::Encryption(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a blob produced by [`seal`].
///
/// A wrong key, a truncated blob or any flipped bit yields
/// [`ManagerError::AuthFailure`]; garbage is never returned.
pub fn unseal(blob: &[u8], key: &SecretKey) -> Result<Zeroizing<Vec<u8>>, ManagerError> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(ManagerError::AuthFailure);
    }
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| ManagerError::Encryption(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| ManagerError::AuthFailure)
}

/// One passphrase tier of sealed key material.
#[derive(Clone, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct SealedSlot {
    /// How to re-derive the master key from the passphrase.
    pub kdf: KdfRecord,
    /// Crypto key sealed under the passphrase-derived master key.
    pub crypto_key: Vec<u8>,
    /// Serialized master extended key sealed under the crypto key.
    pub extended_key: Vec<u8>,
}

impl SealedSlot {
    /// Seal `extended_key` under `crypto_key`, and `crypto_key` under
    /// `passphrase`.
    pub fn create(
        passphrase: &[u8],
        params: ScryptParams,
        crypto_key: &SecretKey,
        extended_key: &[u8],
    ) -> Result<Self, ManagerError> {
        let kdf = KdfRecord::generate(params);
        let master = kdf.derive(passphrase)?;
        Ok(Self {
            kdf,
            crypto_key: seal(crypto_key.as_bytes(), &master)?,
            extended_key: seal(extended_key, crypto_key)?,
        })
    }

    /// Recover the crypto key with `passphrase`.
    pub fn open_crypto_key(&self, passphrase: &[u8]) -> Result<SecretKey, ManagerError> {
        let master = self.kdf.derive(passphrase)?;
        let bytes = unseal(&self.crypto_key, &master)?;
        SecretKey::from_slice(&bytes)
    }

    /// Unseal the master extended key with an already-recovered crypto key.
    pub fn open_extended_key(&self, crypto_key: &SecretKey) -> Result<Zeroizing<Vec<u8>>, ManagerError> {
        unseal(&self.extended_key, crypto_key)
    }

    /// Re-seal the crypto key under `new_passphrase` with a fresh salt.
    ///
    /// The extended key blob is untouched since the crypto key is unchanged.
    pub fn reseal(
        &self,
        crypto_key: &SecretKey,
        new_passphrase: &[u8],
    ) -> Result<Self, ManagerError> {
        let kdf = KdfRecord::generate(self.kdf.params);
        let master = kdf.derive(new_passphrase)?;
        Ok(Self {
            kdf,
            crypto_key: seal(crypto_key.as_bytes(), &master)?,
            extended_key: self.extended_key.clone(),
        })
    }
}
