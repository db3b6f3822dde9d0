//! Pay-to-pubkey-hash address encoding.
//!
//! # Wire format
//! ```text
//! base58( version (1 byte) || hash160 (20 bytes) || checksum (4 bytes) )
//! ```
//! The version byte is the network's `pubkey_hash_addr_id`; the checksum is
//! the first four bytes of the double-SHA256 of the preceding 21 bytes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{self, HASH160_LEN};
use crate::error::AddressError;
use crate::params::ChainParams;

/// Length of a decoded address payload.
const PAYLOAD_LEN: usize = 1 + HASH160_LEN + 4;

/// A pay-to-pubkey-hash address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    version: u8,
    pubkey_hash: [u8; HASH160_LEN],
}

impl Address {
    /// Create an address from a pubkey hash for the given network.
    pub fn from_pubkey_hash(pubkey_hash: [u8; HASH160_LEN], params: &ChainParams) -> Self {
        Self {
            version: params.pubkey_hash_addr_id,
            pubkey_hash,
        }
    }

    /// Create an address from a serialized (compressed) public key.
    pub fn from_public_key(pubkey: &[u8], params: &ChainParams) -> Self {
        Self::from_pubkey_hash(crypto::hash160(pubkey), params)
    }

    /// The hash160 encoded in this address.
    pub fn pubkey_hash(&self) -> [u8; HASH160_LEN] {
        self.pubkey_hash
    }

    /// The network version byte.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Encode as a base58check string.
    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(PAYLOAD_LEN);
        payload.push(self.version);
        payload.extend_from_slice(&self.pubkey_hash);
        let sum = crypto::checksum(&payload);
        payload.extend_from_slice(&sum);
        bs58::encode(payload).into_string()
    }

    /// Decode a base58check string, requiring the network's version byte.
    pub fn decode(s: &str, params: &ChainParams) -> Result<Self, AddressError> {
        let data = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
        if data.len() != PAYLOAD_LEN {
            return Err(AddressError::InvalidLength(data.len()));
        }

        let (body, sum) = data.split_at(1 + HASH160_LEN);
        if crypto::checksum(body)[..] != *sum {
            return Err(AddressError::InvalidChecksum);
        }
        if body[0] != params.pubkey_hash_addr_id {
            return Err(AddressError::WrongNetwork {
                expected: params.pubkey_hash_addr_id,
                found: body[0],
            });
        }

        let mut pubkey_hash = [0u8; HASH160_LEN];
        pubkey_hash.copy_from_slice(&body[1..]);
        Ok(Self {
            version: body[0],
            pubkey_hash,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}
