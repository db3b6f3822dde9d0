//! Persisted layout of a manager inside its namespace.
//!
//! ```text
//! m/version                        schema version (u32 BE)
//! m/net                            chain net magic (u32 BE)
//! m/coin                           BIP-44 coin type (u32 BE)
//! m/scrypt                         ScryptParams
//! m/pub                            public-tier SealedSlot
//! m/priv                           private-tier SealedSlot (absent when watching-only)
//! m/last_account                   highest account index (u32 BE)
//! a/<account BE>                   AccountRow
//! n/<name>                         account index (u32 BE)
//! d/<account BE><chain><index BE>  AddressRow
//! ```
//!
//! Integers inside keys are big-endian so prefix scans return rows in
//! numeric order. Structured values use bincode's standard config.

use std::collections::{BTreeMap, HashMap};

use hdvault_core::store::{KvStore, Namespace, WriteBatch};

use crate::account::AccountRow;
use crate::error::ManagerError;
use crate::hdtree::ChainKind;
use crate::kdf::ScryptParams;
use crate::sealed::SealedSlot;

/// Schema version written by this build.
pub const LATEST_VERSION: u32 = 1;

pub const VERSION_KEY: &[u8] = b"m/version";
pub const NET_KEY: &[u8] = b"m/net";
pub const COIN_KEY: &[u8] = b"m/coin";
pub const SCRYPT_KEY: &[u8] = b"m/scrypt";
pub const PUB_SLOT_KEY: &[u8] = b"m/pub";
pub const PRIV_SLOT_KEY: &[u8] = b"m/priv";
pub const LAST_ACCOUNT_KEY: &[u8] = b"m/last_account";
pub const ACCOUNT_PREFIX: &[u8] = b"a/";
pub const NAME_PREFIX: &[u8] = b"n/";
pub const ADDRESS_PREFIX: &[u8] = b"d/";

/// Length of an address key after its prefix: account, chain, index.
const ADDRESS_KEY_BODY: usize = 4 + 1 + 4;

/// Persisted per-address row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct AddressRow {
    pub pubkey_hash: [u8; 20],
}

pub fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, ManagerError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ManagerError::Corrupt(format!("encode: {e}")))
}

pub fn decode<T: bincode::Decode<()>>(bytes: &[u8], what: &str) -> Result<T, ManagerError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ManagerError::Corrupt(format!("{what}: {e}")))?;
    Ok(value)
}

pub fn decode_u32(bytes: &[u8], what: &str) -> Result<u32, ManagerError> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| ManagerError::Corrupt(format!("{what}: expected 4 bytes, got {}", bytes.len())))?;
    Ok(u32::from_be_bytes(arr))
}

fn keyed(prefix: &[u8], body: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + body.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(body);
    key
}

pub fn account_key(account: u32) -> Vec<u8> {
    keyed(ACCOUNT_PREFIX, &account.to_be_bytes())
}

pub fn name_key(name: &str) -> Vec<u8> {
    keyed(NAME_PREFIX, name.as_bytes())
}

/// Prefix covering every address row of `account`.
pub fn address_prefix(account: u32) -> Vec<u8> {
    keyed(ADDRESS_PREFIX, &account.to_be_bytes())
}

pub fn address_key(account: u32, chain: ChainKind, index: u32) -> Vec<u8> {
    let mut key = address_prefix(account);
    key.push(chain.index() as u8);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// Split an address key back into `(account, chain, index)`.
pub fn parse_address_key(key: &[u8]) -> Result<(u32, ChainKind, u32), ManagerError> {
    let body = key
        .strip_prefix(ADDRESS_PREFIX)
        .filter(|body| body.len() == ADDRESS_KEY_BODY)
        .ok_or_else(|| ManagerError::Corrupt("malformed address key".into()))?;
    let account = decode_u32(&body[..4], "address key account")?;
    let chain = ChainKind::from_index(u32::from(body[4]))
        .ok_or_else(|| ManagerError::Corrupt(format!("unknown chain {}", body[4])))?;
    let index = decode_u32(&body[5..], "address key index")?;
    Ok((account, chain, index))
}

/// Manager-wide rows, everything under `m/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerRecord {
    pub version: u32,
    pub net_magic: u32,
    pub coin_type: u32,
    pub scrypt: ScryptParams,
    pub public_slot: SealedSlot,
    pub private_slot: Option<SealedSlot>,
    pub last_account: u32,
}

impl ManagerRecord {
    /// Read the manager rows.
    ///
    /// Fails with `NoExist` when the namespace has no version row and with
    /// `UpgradeRequired` when the version is newer than [`LATEST_VERSION`].
    pub fn load<S: KvStore>(ns: &Namespace<S>) -> Result<Self, ManagerError> {
        let version = match ns.get(VERSION_KEY)? {
            Some(bytes) => decode_u32(&bytes, "version")?,
            None => return Err(ManagerError::NoExist(ns.name().to_string())),
        };
        if version > LATEST_VERSION {
            return Err(ManagerError::UpgradeRequired {
                found: version,
                supported: LATEST_VERSION,
            });
        }

        let required = |key: &[u8], what: &str| -> Result<Vec<u8>, ManagerError> {
            ns.get(key)?
                .ok_or_else(|| ManagerError::Corrupt(format!("missing {what}")))
        };

        Ok(Self {
            version,
            net_magic: decode_u32(&required(NET_KEY, "net magic")?, "net magic")?,
            coin_type: decode_u32(&required(COIN_KEY, "coin type")?, "coin type")?,
            scrypt: decode(&required(SCRYPT_KEY, "scrypt params")?, "scrypt params")?,
            public_slot: decode(&required(PUB_SLOT_KEY, "public slot")?, "public slot")?,
            private_slot: ns
                .get(PRIV_SLOT_KEY)?
                .map(|bytes| decode(&bytes, "private slot"))
                .transpose()?,
            last_account: decode_u32(
                &required(LAST_ACCOUNT_KEY, "last account")?,
                "last account",
            )?,
        })
    }

    /// Queue every manager row into `batch`.
    pub fn put_into(&self, batch: &mut WriteBatch) -> Result<(), ManagerError> {
        batch.put(VERSION_KEY, self.version.to_be_bytes());
        batch.put(NET_KEY, self.net_magic.to_be_bytes());
        batch.put(COIN_KEY, self.coin_type.to_be_bytes());
        batch.put(SCRYPT_KEY, encode(&self.scrypt)?);
        batch.put(PUB_SLOT_KEY, encode(&self.public_slot)?);
        match &self.private_slot {
            Some(slot) => batch.put(PRIV_SLOT_KEY, encode(slot)?),
            None => batch.delete(PRIV_SLOT_KEY),
        }
        batch.put(LAST_ACCOUNT_KEY, self.last_account.to_be_bytes());
        Ok(())
    }
}

/// Queue an account row plus its name index entry.
pub fn put_account(
    batch: &mut WriteBatch,
    index: u32,
    row: &AccountRow,
) -> Result<(), ManagerError> {
    batch.put(account_key(index), encode(row)?);
    batch.put(name_key(&row.name), index.to_be_bytes());
    Ok(())
}

/// Every account row, by index.
pub fn load_accounts<S: KvStore>(
    ns: &Namespace<S>,
) -> Result<BTreeMap<u32, AccountRow>, ManagerError> {
    ns.scan_prefix(ACCOUNT_PREFIX)?
        .into_iter()
        .map(|(key, value)| -> Result<(u32, AccountRow), ManagerError> {
            let index = decode_u32(&key[ACCOUNT_PREFIX.len()..], "account key")?;
            Ok((index, decode(&value, "account row")?))
        })
        .collect()
}

/// The name index, name to account.
pub fn load_names<S: KvStore>(ns: &Namespace<S>) -> Result<HashMap<String, u32>, ManagerError> {
    ns.scan_prefix(NAME_PREFIX)?
        .into_iter()
        .map(|(key, value)| -> Result<(String, u32), ManagerError> {
            let name = String::from_utf8(key[NAME_PREFIX.len()..].to_vec())
                .map_err(|_| ManagerError::Corrupt("account name is not utf-8".into()))?;
            Ok((name, decode_u32(&value, "name index")?))
        })
        .collect()
}

/// Every address row of `account` in `(chain, index)` order.
pub fn load_addresses<S: KvStore>(
    ns: &Namespace<S>,
    account: u32,
) -> Result<Vec<(ChainKind, u32, AddressRow)>, ManagerError> {
    ns.scan_prefix(&address_prefix(account))?
        .into_iter()
        .map(|(key, value)| -> Result<(ChainKind, u32, AddressRow), ManagerError> {
            let (_, chain, index) = parse_address_key(&key)?;
            Ok((chain, index, decode(&value, "address row")?))
        })
        .collect()
}
