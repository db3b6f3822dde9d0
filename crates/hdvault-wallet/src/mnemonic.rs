//! BIP-39 mnemonic seed backup and restoration.

use bip39::{Language, Mnemonic};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::ManagerError;
use crate::hdtree::Seed;

/// Normalize whitespace and case before parsing a phrase.
fn parse(phrase: &str) -> Result<Mnemonic, ManagerError> {
    let normalized = Zeroizing::new(
        phrase
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    );
    Mnemonic::parse_in(Language::English, normalized.as_str())
        .map_err(|e| ManagerError::InvalidMnemonic(e.to_string()))
}

/// Generate a fresh 24-word phrase from 32 bytes of OS randomness.
pub fn new_mnemonic() -> Result<Zeroizing<String>, ManagerError> {
    let mut entropy = Zeroizing::new([0u8; 32]);
    rand::rngs::OsRng.fill_bytes(&mut entropy[..]);
    let m = Mnemonic::from_entropy_in(Language::English, &entropy[..])
        .map_err(|e| ManagerError::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(m.to_string()))
}

/// Encode a 16- or 32-byte seed as a 12- or 24-word phrase.
///
/// This is a raw-entropy backup: [`mnemonic_to_seed`] recovers the same
/// bytes. 64-byte seeds have no mnemonic form.
pub fn seed_to_mnemonic(seed: &Seed) -> Result<Zeroizing<String>, ManagerError> {
    let m = Mnemonic::from_entropy_in(Language::English, seed.as_bytes())
        .map_err(|e| ManagerError::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(m.to_string()))
}

/// Recover the raw-entropy seed written by [`seed_to_mnemonic`].
pub fn mnemonic_to_seed(phrase: &str) -> Result<Seed, ManagerError> {
    let entropy = Zeroizing::new(parse(phrase)?.to_entropy());
    Seed::from_bytes(&entropy)
}

impl Seed {
    /// Standard BIP-39 seed: PBKDF2 over the phrase and `passphrase`.
    ///
    /// Always 64 bytes, so it is interoperable with other BIP-39 wallets.
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Seed, ManagerError> {
        let bytes = Zeroizing::new(parse(phrase)?.to_seed(passphrase));
        Seed::from_bytes(&bytes[..])
    }
}
