//! Chain parameter records consumed by the address manager.
//!
//! Only the fields the manager needs are carried: network magic, address
//! version bytes, extended-key version bytes and the BIP-44 coin type.
//! Records are plain values passed explicitly into the manager; there is no
//! process-wide "active network".

/// Network-specific constants for key and address encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainParams {
    /// Human-readable network name.
    pub name: &'static str,
    /// Magic value identifying the network on the wire.
    pub net_magic: u32,
    /// Version byte of pay-to-pubkey-hash addresses.
    pub pubkey_hash_addr_id: u8,
    /// Version bytes of serialized extended private keys.
    pub hd_private_key_id: [u8; 4],
    /// Version bytes of serialized extended public keys.
    pub hd_public_key_id: [u8; 4],
    /// Leading characters of a serialized extended private key.
    pub hd_private_prefix: &'static str,
    /// Leading characters of a serialized extended public key.
    pub hd_public_prefix: &'static str,
    /// BIP-44 coin type used for the hardened `coin_type'` level.
    pub hd_coin_type: u32,
}

/// Main network.
pub const MAINNET: ChainParams = ChainParams {
    name: "mainnet",
    net_magic: 0xd9b4_bef9,
    pubkey_hash_addr_id: 0x00,
    hd_private_key_id: [0x04, 0x88, 0xad, 0xe4],
    hd_public_key_id: [0x04, 0x88, 0xb2, 0x1e],
    hd_private_prefix: "xprv",
    hd_public_prefix: "xpub",
    hd_coin_type: 0,
};

/// Public test network (version 3).
pub const TESTNET3: ChainParams = ChainParams {
    name: "testnet3",
    net_magic: 0x0709_110b,
    pubkey_hash_addr_id: 0x6f,
    hd_private_key_id: [0x04, 0x35, 0x83, 0x94],
    hd_public_key_id: [0x04, 0x35, 0x87, 0xcf],
    hd_private_prefix: "tprv",
    hd_public_prefix: "tpub",
    hd_coin_type: 1,
};

/// Local regression test network.
pub const REGTEST: ChainParams = ChainParams {
    name: "regtest",
    net_magic: 0xdab5_bffa,
    pubkey_hash_addr_id: 0x6f,
    hd_private_key_id: [0x04, 0x35, 0x83, 0x94],
    hd_public_key_id: [0x04, 0x35, 0x87, 0xcf],
    hd_private_prefix: "tprv",
    hd_public_prefix: "tpub",
    hd_coin_type: 1,
};

/// Private simulation network.
pub const SIMNET: ChainParams = ChainParams {
    name: "simnet",
    net_magic: 0x1214_1c16,
    pubkey_hash_addr_id: 0x3f,
    hd_private_key_id: [0x04, 0x20, 0xb9, 0x00],
    hd_public_key_id: [0x04, 0x20, 0xbd, 0x3a],
    hd_private_prefix: "sprv",
    hd_public_prefix: "spub",
    hd_coin_type: 115,
};

/// Every built-in parameter record.
pub const ALL: &[ChainParams] = &[MAINNET, TESTNET3, REGTEST, SIMNET];

impl ChainParams {
    /// Look up a built-in record by name.
    pub fn by_name(name: &str) -> Option<ChainParams> {
        ALL.iter().copied().find(|p| p.name == name)
    }

    /// Extended private key version as a big-endian integer.
    pub fn hd_private_version(&self) -> u32 {
        u32::from_be_bytes(self.hd_private_key_id)
    }

    /// Extended public key version as a big-endian integer.
    pub fn hd_public_version(&self) -> u32 {
        u32::from_be_bytes(self.hd_public_key_id)
    }
}

impl Default for ChainParams {
    fn default() -> Self {
        MAINNET
    }
}
