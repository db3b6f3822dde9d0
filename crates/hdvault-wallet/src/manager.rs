//! The address manager facade.
//!
//! [`AddressManager`] composes the KDF, sealed slots, HD derivation and the
//! lock state over one store [`Namespace`]. It is the only type callers
//! touch; everything else in this crate is a building block.
//!
//! All in-memory state sits behind one `parking_lot::RwLock`. Mutating
//! operations hold the write guard across their store commit and only
//! update memory after the commit succeeds, so a failed write leaves both
//! the store and the instance exactly as they were. Readers take the read
//! guard and therefore see a consistent snapshot.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use bip32::{XPrv, XPub};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use hdvault_core::params::ChainParams;
use hdvault_core::store::{KvStore, Namespace, WriteBatch};

use crate::account::{
    AccountInfo, AccountRow, DEFAULT_ACCOUNT_NAME, MAX_ACCOUNT_NUM, validate_account_name,
};
use crate::config::ManagerConfig;
use crate::db::{self, AddressRow, ManagerRecord};
use crate::error::ManagerError;
use crate::hdtree::{self, ChainKind, HARDENED_OFFSET, ManagedAddress, Seed};
use crate::kdf::{ScryptParams, SecretKey};
use crate::lock::LockState;
use crate::sealed::{self, SealedSlot};

/// Upper bound on the up-front allocation for one address request.
const MAX_PREALLOCATED_ADDRESSES: usize = 1024;

/// Which passphrase [`AddressManager::change_passphrase`] replaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassphraseTier {
    /// Unseals public key material.
    Public,
    /// Unseals private key material.
    Private,
}

struct AccountState {
    row: AccountRow,
    xpub: XPub,
}

impl AccountState {
    fn next_index(&self, chain: ChainKind) -> u32 {
        match chain {
            ChainKind::External => self.row.next_external,
            ChainKind::Internal => self.row.next_internal,
        }
    }
}

struct Inner {
    lock: LockState,
    crypto_pub: SecretKey,
    scrypt: ScryptParams,
    coin_type: u32,
    public_slot: SealedSlot,
    private_slot: Option<SealedSlot>,
    accounts: BTreeMap<u32, AccountState>,
    names: HashMap<String, u32>,
    last_account: u32,
}

impl Inner {
    fn account(&self, account: u32) -> Result<&AccountState, ManagerError> {
        self.accounts
            .get(&account)
            .ok_or_else(|| ManagerError::InvalidAccount(format!("#{account}")))
    }
}

/// Encrypted hierarchical-deterministic address manager.
pub struct AddressManager<S: KvStore> {
    ns: Namespace<S>,
    chain: ChainParams,
    inner: RwLock<Inner>,
}

/// Index the next account would receive after `last`.
fn next_account_index(last: u32) -> Result<u32, ManagerError> {
    last.checked_add(1)
        .filter(|index| *index <= MAX_ACCOUNT_NUM)
        .ok_or(ManagerError::TooManyAccounts)
}

/// Seal the public and private forms of an account key.
fn seal_account(
    account_key: &XPrv,
    name: &str,
    chain: &ChainParams,
    crypto_pub: &SecretKey,
    crypto_priv: &SecretKey,
) -> Result<AccountRow, ManagerError> {
    let xpub = hdtree::encode_xpub(&account_key.public_key(), chain)?;
    let xprv = hdtree::encode_xprv(account_key, chain)?;
    Ok(AccountRow {
        name: name.to_string(),
        pub_sealed: sealed::seal(xpub.as_bytes(), crypto_pub)?,
        priv_sealed: Some(sealed::seal(xprv.as_bytes(), crypto_priv)?),
        next_external: 0,
        next_internal: 0,
    })
}

impl<S: KvStore> AddressManager<S> {
    /// Create a new manager in `config.namespace` and return it locked.
    ///
    /// The seed is consumed and dropped as soon as the master key exists.
    /// Account 0 is created as `"default"`. Everything is committed in a
    /// single batch.
    pub fn create(
        store: S,
        seed: Seed,
        public_passphrase: &[u8],
        private_passphrase: &[u8],
        config: &ManagerConfig,
    ) -> Result<Self, ManagerError> {
        config.scrypt.validate()?;
        let ns = Namespace::open(store, &config.namespace);
        if !ns.is_empty()? {
            return Err(ManagerError::AlreadyExists(config.namespace.clone()));
        }

        let chain = config.chain;
        let master = hdtree::master_key(&seed)?;
        drop(seed);

        let crypto_pub = SecretKey::generate();
        let crypto_priv = SecretKey::generate();
        let public_slot = SealedSlot::create(
            public_passphrase,
            config.scrypt,
            &crypto_pub,
            hdtree::encode_xpub(&master.public_key(), &chain)?.as_bytes(),
        )?;
        let private_slot = SealedSlot::create(
            private_passphrase,
            config.scrypt,
            &crypto_priv,
            hdtree::encode_xprv(&master, &chain)?.as_bytes(),
        )?;

        let account_key = hdtree::derive_account_key(&master, chain.hd_coin_type, 0)?;
        let row = seal_account(
            &account_key,
            DEFAULT_ACCOUNT_NAME,
            &chain,
            &crypto_pub,
            &crypto_priv,
        )?;

        let record = ManagerRecord {
            version: db::LATEST_VERSION,
            net_magic: chain.net_magic,
            coin_type: chain.hd_coin_type,
            scrypt: config.scrypt,
            public_slot,
            private_slot: Some(private_slot),
            last_account: 0,
        };
        let mut batch = WriteBatch::new();
        record.put_into(&mut batch)?;
        db::put_account(&mut batch, 0, &row)?;
        // A concurrent create may have committed while the KDF ran.
        if !ns.write_if_absent(db::VERSION_KEY, batch)? {
            return Err(ManagerError::AlreadyExists(config.namespace.clone()));
        }

        info!(namespace = %config.namespace, network = chain.name, "manager: created");

        let mut accounts = BTreeMap::new();
        accounts.insert(
            0,
            AccountState {
                row,
                xpub: account_key.public_key(),
            },
        );
        let mut names = HashMap::new();
        names.insert(DEFAULT_ACCOUNT_NAME.to_string(), 0);

        Ok(Self {
            ns,
            chain,
            inner: RwLock::new(Inner {
                lock: LockState::Locked,
                crypto_pub,
                scrypt: record.scrypt,
                coin_type: record.coin_type,
                public_slot: record.public_slot,
                private_slot: record.private_slot,
                accounts,
                names,
                last_account: 0,
            }),
        })
    }

    /// Open an existing manager with its public passphrase.
    ///
    /// The result is `Locked`, or `WatchingOnly` if the private tier has
    /// been discarded.
    pub fn open(
        store: S,
        config: &ManagerConfig,
        public_passphrase: &[u8],
    ) -> Result<Self, ManagerError> {
        let ns = Namespace::open(store, &config.namespace);
        let record = ManagerRecord::load(&ns)?;

        if record.net_magic != config.chain.net_magic {
            return Err(ManagerError::WrongNetwork {
                expected: config.chain.net_magic,
                found: record.net_magic,
            });
        }
        let slot_params_match = record.public_slot.kdf.params == record.scrypt
            && record
                .private_slot
                .as_ref()
                .is_none_or(|slot| slot.kdf.params == record.scrypt);
        if !slot_params_match {
            return Err(ManagerError::ParamsMismatch);
        }

        let crypto_pub = match record.public_slot.open_crypto_key(public_passphrase) {
            Ok(key) => key,
            Err(e) => {
                warn!(namespace = %config.namespace, "manager: open rejected public passphrase");
                return Err(e);
            }
        };
        let master_xpub = record.public_slot.open_extended_key(&crypto_pub)?;
        hdtree::decode_xpub(&master_xpub)?;

        let rows = db::load_accounts(&ns)?;
        let names = db::load_names(&ns)?;
        let contiguous = rows.keys().copied().eq(0..=record.last_account);
        let indexed = names.len() == rows.len()
            && rows
                .iter()
                .all(|(index, row)| names.get(&row.name) == Some(index));
        if !contiguous || !indexed {
            return Err(ManagerError::Corrupt(
                "account table and name index disagree".into(),
            ));
        }

        let mut accounts = BTreeMap::new();
        for (index, row) in rows {
            let xpub = hdtree::decode_xpub(&sealed::unseal(&row.pub_sealed, &crypto_pub)?)?;
            accounts.insert(index, AccountState { row, xpub });
        }

        let lock = match record.private_slot {
            Some(_) => LockState::Locked,
            None => LockState::WatchingOnly,
        };
        info!(
            namespace = %config.namespace,
            accounts = accounts.len(),
            watching_only = lock.is_watching_only(),
            "manager: opened"
        );

        Ok(Self {
            ns,
            chain: config.chain,
            inner: RwLock::new(Inner {
                lock,
                crypto_pub,
                scrypt: record.scrypt,
                coin_type: record.coin_type,
                public_slot: record.public_slot,
                private_slot: record.private_slot,
                accounts,
                names,
                last_account: record.last_account,
            }),
        })
    }

    /// Unlock private key operations.
    ///
    /// A wrong passphrase fails with `AuthFailure` and leaves the state as
    /// it was, including an already unlocked manager.
    pub fn unlock(&self, private_passphrase: &[u8]) -> Result<(), ManagerError> {
        let slot = {
            let inner = self.inner.read();
            inner.lock.require_private_tier()?;
            let slot = inner
                .private_slot
                .clone()
                .ok_or(ManagerError::WatchingOnlyViolation)?;
            if slot.kdf.params != inner.scrypt {
                return Err(ManagerError::ParamsMismatch);
            }
            slot
        };

        // The KDF runs without holding the lock.
        let crypto_priv = match slot.open_crypto_key(private_passphrase) {
            Ok(key) => key,
            Err(e) => {
                warn!(namespace = %self.ns.name(), "manager: unlock failed");
                return Err(e);
            }
        };
        hdtree::decode_xprv(&slot.open_extended_key(&crypto_priv)?)?;

        self.inner.write().lock.unlock(crypto_priv)?;
        debug!(namespace = %self.ns.name(), "manager: unlocked");
        Ok(())
    }

    /// Drop the private-tier key from memory. Always succeeds.
    pub fn lock(&self) {
        self.inner.write().lock.lock();
        debug!(namespace = %self.ns.name(), "manager: locked");
    }

    /// True unless private key operations are currently possible.
    pub fn is_locked(&self) -> bool {
        self.inner.read().lock.is_locked()
    }

    pub fn is_watching_only(&self) -> bool {
        self.inner.read().lock.is_watching_only()
    }

    /// Chain parameters addresses are encoded for.
    pub fn chain_params(&self) -> &ChainParams {
        &self.chain
    }

    /// Store namespace holding this manager.
    pub fn namespace(&self) -> &str {
        self.ns.name()
    }

    /// Create the next account and return its index.
    ///
    /// Requires an unlocked manager. Checks run in order: lock state, name
    /// validity, name uniqueness, index space.
    pub fn new_account(&self, name: &str) -> Result<u32, ManagerError> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;

        let crypto_priv = inner.lock.require_unlocked()?;
        validate_account_name(name)?;
        if inner.names.contains_key(name) {
            return Err(ManagerError::DuplicateAccount(name.to_string()));
        }
        let index = next_account_index(inner.last_account)?;

        let private_slot = inner
            .private_slot
            .as_ref()
            .ok_or(ManagerError::WatchingOnlyViolation)?;
        let master = hdtree::decode_xprv(&private_slot.open_extended_key(crypto_priv)?)?;
        let account_key = hdtree::derive_account_key(&master, inner.coin_type, index)?;
        drop(master);
        let row = seal_account(
            &account_key,
            name,
            &self.chain,
            &inner.crypto_pub,
            crypto_priv,
        )?;

        let mut batch = WriteBatch::new();
        db::put_account(&mut batch, index, &row)?;
        batch.put(db::LAST_ACCOUNT_KEY, index.to_be_bytes());
        self.ns.write(batch)?;

        inner.names.insert(name.to_string(), index);
        inner.accounts.insert(
            index,
            AccountState {
                row,
                xpub: account_key.public_key(),
            },
        );
        inner.last_account = index;

        info!(
            namespace = %self.ns.name(),
            account = index,
            account_name = name,
            "manager: created account"
        );
        Ok(index)
    }

    /// Index of the account called `name`.
    pub fn lookup_account(&self, name: &str) -> Result<u32, ManagerError> {
        self.inner
            .read()
            .names
            .get(name)
            .copied()
            .ok_or_else(|| ManagerError::InvalidAccount(name.to_string()))
    }

    /// Highest assigned account index.
    pub fn last_account(&self) -> u32 {
        self.inner.read().last_account
    }

    pub fn account_name(&self, account: u32) -> Result<String, ManagerError> {
        Ok(self.inner.read().account(account)?.row.name.clone())
    }

    /// Name, counters and xpub of one account.
    pub fn account_info(&self, account: u32) -> Result<AccountInfo, ManagerError> {
        let inner = self.inner.read();
        self.info_for(account, inner.account(account)?)
    }

    /// Every account in index order.
    pub fn accounts(&self) -> Result<Vec<AccountInfo>, ManagerError> {
        let inner = self.inner.read();
        inner
            .accounts
            .iter()
            .map(|(index, state)| self.info_for(*index, state))
            .collect()
    }

    fn info_for(&self, index: u32, state: &AccountState) -> Result<AccountInfo, ManagerError> {
        Ok(AccountInfo {
            index,
            name: state.row.name.clone(),
            external_count: state.row.next_external,
            internal_count: state.row.next_internal,
            xpub: hdtree::encode_xpub(&state.xpub, &self.chain)?,
        })
    }

    /// Every address derived so far for `account`, external chain first,
    /// each chain in index order.
    ///
    /// The rows are read as one snapshot; the returned iterator can be
    /// cloned to walk the same snapshot again. No unlock is needed.
    pub fn account_addresses(&self, account: u32) -> Result<AccountAddresses, ManagerError> {
        let inner = self.inner.read();
        inner.account(account)?;
        let rows = db::load_addresses(&self.ns, account)?;
        Ok(AccountAddresses {
            account,
            chain: self.chain,
            rows: rows.into(),
            pos: 0,
        })
    }

    /// Visit every address of `account` in `(chain, index)` order.
    ///
    /// The first error returned by `visit` stops the walk and is returned
    /// unchanged.
    pub fn for_each_account_address<E, F>(&self, account: u32, mut visit: F) -> Result<(), E>
    where
        E: From<ManagerError>,
        F: FnMut(&ManagedAddress) -> Result<(), E>,
    {
        for address in self.account_addresses(account)? {
            visit(&address)?;
        }
        Ok(())
    }

    /// Derive, persist and return the next `n` receiving addresses.
    pub fn next_external_addresses(
        &self,
        account: u32,
        n: usize,
    ) -> Result<Vec<ManagedAddress>, ManagerError> {
        self.next_addresses(account, ChainKind::External, n)
    }

    /// Derive, persist and return the next `n` change addresses.
    pub fn next_internal_addresses(
        &self,
        account: u32,
        n: usize,
    ) -> Result<Vec<ManagedAddress>, ManagerError> {
        self.next_addresses(account, ChainKind::Internal, n)
    }

    fn next_addresses(
        &self,
        account: u32,
        chain: ChainKind,
        n: usize,
    ) -> Result<Vec<ManagedAddress>, ManagerError> {
        let mut inner = self.inner.write();
        let state = inner.account(account)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let exhausted = ManagerError::TooManyAddresses { account, chain };
        let start = state.next_index(chain);
        let end = u32::try_from(n)
            .ok()
            .and_then(|n| start.checked_add(n))
            .filter(|end| *end <= HARDENED_OFFSET)
            .ok_or(exhausted)?;

        let chain_key = hdtree::derive_chain_key(&state.xpub, chain)?;
        let mut addresses = Vec::with_capacity(n.min(MAX_PREALLOCATED_ADDRESSES));
        let mut batch = WriteBatch::new();
        for index in start..end {
            let key = hdtree::derive_index_key(&chain_key, index)?;
            let address = hdtree::derive_address(&key, &self.chain);
            let row = AddressRow {
                pubkey_hash: address.pubkey_hash(),
            };
            batch.put(db::address_key(account, chain, index), db::encode(&row)?);
            addresses.push(ManagedAddress::new(account, chain, index, address));
        }

        let mut row = state.row.clone();
        match chain {
            ChainKind::External => row.next_external = end,
            ChainKind::Internal => row.next_internal = end,
        }
        batch.put(db::account_key(account), db::encode(&row)?);
        self.ns.write(batch)?;

        if let Some(state) = inner.accounts.get_mut(&account) {
            state.row = row;
        }
        debug!(
            namespace = %self.ns.name(),
            account,
            %chain,
            first = start,
            count = n,
            "manager: derived addresses"
        );
        Ok(addresses)
    }

    /// Replace the public or private passphrase.
    ///
    /// Only the tier's crypto key is resealed, under a fresh salt. The write
    /// guard is held across both KDF runs.
    pub fn change_passphrase(
        &self,
        old: &[u8],
        new: &[u8],
        tier: PassphraseTier,
    ) -> Result<(), ManagerError> {
        let mut inner = self.inner.write();
        let slot = match tier {
            PassphraseTier::Public => &inner.public_slot,
            PassphraseTier::Private => {
                inner.lock.require_private_tier()?;
                inner
                    .private_slot
                    .as_ref()
                    .ok_or(ManagerError::WatchingOnlyViolation)?
            }
        };
        let crypto_key = slot.open_crypto_key(old)?;
        let resealed = slot.reseal(&crypto_key, new)?;

        let key = match tier {
            PassphraseTier::Public => db::PUB_SLOT_KEY,
            PassphraseTier::Private => db::PRIV_SLOT_KEY,
        };
        let mut batch = WriteBatch::new();
        batch.put(key, db::encode(&resealed)?);
        self.ns.write(batch)?;

        match tier {
            PassphraseTier::Public => inner.public_slot = resealed,
            PassphraseTier::Private => inner.private_slot = Some(resealed),
        }
        info!(namespace = %self.ns.name(), ?tier, "manager: passphrase changed");
        Ok(())
    }

    /// Permanently discard all private key material.
    ///
    /// Deletes the private slot and every account's sealed xprv in one
    /// batch. Calling it on a watching-only manager does nothing.
    pub fn convert_to_watching_only(&self) -> Result<(), ManagerError> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if inner.lock.is_watching_only() {
            return Ok(());
        }

        let mut stripped = Vec::with_capacity(inner.accounts.len());
        let mut batch = WriteBatch::new();
        batch.delete(db::PRIV_SLOT_KEY);
        for (index, state) in &inner.accounts {
            let row = AccountRow {
                priv_sealed: None,
                ..state.row.clone()
            };
            batch.put(db::account_key(*index), db::encode(&row)?);
            stripped.push((*index, row));
        }
        self.ns.write(batch)?;

        for (index, row) in stripped {
            if let Some(state) = inner.accounts.get_mut(&index) {
                state.row = row;
            }
        }
        inner.private_slot = None;
        inner.lock.make_watching_only();
        info!(namespace = %self.ns.name(), "manager: converted to watching-only");
        Ok(())
    }
}

impl<S: KvStore> fmt::Debug for AddressManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        let state = match inner.lock {
            LockState::WatchingOnly => "watching-only",
            LockState::Locked => "locked",
            LockState::Unlocked(_) => "unlocked",
        };
        f.debug_struct("AddressManager")
            .field("namespace", &self.ns.name())
            .field("network", &self.chain.name)
            .field("state", &state)
            .field("accounts", &inner.accounts.len())
            .finish()
    }
}

/// Snapshot of an account's derived addresses.
///
/// Yields addresses in `(chain, index)` order, encoding each one lazily.
/// Cloning is cheap and restarts from the clone's position.
#[derive(Clone, Debug)]
pub struct AccountAddresses {
    account: u32,
    chain: ChainParams,
    rows: Arc<[(ChainKind, u32, AddressRow)]>,
    pos: usize,
}

impl AccountAddresses {
    /// Rewind to the first address.
    pub fn restart(&mut self) {
        self.pos = 0;
    }
}

impl Iterator for AccountAddresses {
    type Item = ManagedAddress;

    fn next(&mut self) -> Option<ManagedAddress> {
        let (chain, index, row) = *self.rows.get(self.pos)?;
        self.pos += 1;
        let address = hdvault_core::Address::from_pubkey_hash(row.pubkey_hash, &self.chain);
        Some(ManagedAddress::new(self.account, chain, index, address))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rows.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for AccountAddresses {}

#[cfg(test)]
mod tests {
    use super::*;
    use hdvault_core::params::{MAINNET, SIMNET, TESTNET3};
    use hdvault_core::store::MemoryStore;

    const FAST: ScryptParams = ScryptParams { n: 16, r: 8, p: 1 };

    type Manager = AddressManager<Arc<MemoryStore>>;

    fn config() -> ManagerConfig {
        ManagerConfig::default().with_scrypt(FAST)
    }

    fn seed() -> Seed {
        Seed::from_bytes(&[7u8; 32]).unwrap()
    }

    fn create(store: &Arc<MemoryStore>) -> Manager {
        AddressManager::create(store.clone(), seed(), b"p1", b"s1", &config()).unwrap()
    }

    fn unlocked(store: &Arc<MemoryStore>) -> Manager {
        let mgr = create(store);
        mgr.unlock(b"s1").unwrap();
        mgr
    }

    fn raw_ns(store: &Arc<MemoryStore>) -> Namespace<Arc<MemoryStore>> {
        Namespace::open(store.clone(), &config().namespace)
    }

    #[test]
    fn scenario_create_open_unlock_new_account() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));

        let mgr = AddressManager::open(store.clone(), &config(), b"p1").unwrap();
        assert_eq!(mgr.lookup_account("default").unwrap(), 0);

        mgr.unlock(b"s1").unwrap();
        assert_eq!(mgr.new_account("acct-create").unwrap(), 1);
        assert_eq!(mgr.last_account(), 1);

        assert_eq!(mgr.unlock(b"wrong").unwrap_err(), ManagerError::AuthFailure);
        assert!(!mgr.is_locked());
    }

    #[test]
    fn create_returns_locked_manager() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        assert!(mgr.is_locked());
        assert!(!mgr.is_watching_only());
        assert_eq!(mgr.last_account(), 0);
        assert_eq!(mgr.account_name(0).unwrap(), "default");
    }

    #[test]
    fn create_twice_fails() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));
        let before = store.len();
        let err = AddressManager::create(store.clone(), seed(), b"p", b"s", &config()).unwrap_err();
        assert_eq!(err, ManagerError::AlreadyExists("waddrmgr".into()));
        assert_eq!(store.len(), before);
    }

    #[test]
    fn concurrent_create_has_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (1u8..=4)
                .map(|i| {
                    let store = store.clone();
                    s.spawn(move || {
                        let seed = Seed::from_bytes(&[i; 32]).unwrap();
                        (i, AddressManager::create(store, seed, &[i], b"s", &config()))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut winners = Vec::new();
        for (i, result) in results {
            match result {
                Ok(mgr) => winners.push((i, mgr)),
                Err(err) => assert_eq!(err, ManagerError::AlreadyExists("waddrmgr".into())),
            }
        }
        assert_eq!(winners.len(), 1);

        // The stored manager is exactly the one the winner holds.
        let (i, mgr) = winners.pop().unwrap();
        let reopened = AddressManager::open(store.clone(), &config(), &[i]).unwrap();
        assert_eq!(
            reopened.account_info(0).unwrap().xpub,
            mgr.account_info(0).unwrap().xpub
        );
        assert_eq!(
            mgr.next_external_addresses(0, 2).unwrap(),
            reopened.account_addresses(0).unwrap().collect::<Vec<_>>()
        );
    }

    #[test]
    fn simnet_keys_use_custom_version_bytes() {
        let store = Arc::new(MemoryStore::new());
        let simnet = ManagerConfig::for_chain(SIMNET).with_scrypt(FAST);
        let mgr = AddressManager::create(store.clone(), seed(), b"p1", b"s1", &simnet).unwrap();
        assert!(mgr.account_info(0).unwrap().xpub.starts_with("spub"));
        drop(mgr);

        let mgr = AddressManager::open(store, &simnet, b"p1").unwrap();
        mgr.unlock(b"s1").unwrap();
        assert_eq!(mgr.new_account("sim").unwrap(), 1);
        assert!(mgr.account_info(1).unwrap().xpub.starts_with("spub"));
        let addr = mgr.next_external_addresses(1, 1).unwrap();
        assert_eq!(addr[0].address.version(), SIMNET.pubkey_hash_addr_id);
    }

    #[test]
    fn create_in_other_namespace_is_independent() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));
        let other = config().with_namespace("second");
        let mgr = AddressManager::create(store.clone(), seed(), b"x", b"y", &other).unwrap();
        assert_eq!(mgr.namespace(), "second");
        assert!(AddressManager::open(store.clone(), &other, b"x").is_ok());
        assert!(AddressManager::open(store.clone(), &config(), b"p1").is_ok());
    }

    #[test]
    fn create_rejects_bad_scrypt_params() {
        let store = Arc::new(MemoryStore::new());
        let cfg = config().with_scrypt(ScryptParams { n: 1, r: 8, p: 1 });
        let err = AddressManager::create(store.clone(), seed(), b"p", b"s", &cfg).unwrap_err();
        assert!(matches!(err, ManagerError::InvalidParams(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn open_missing_namespace() {
        let store = Arc::new(MemoryStore::new());
        let err = AddressManager::open(store, &config(), b"p1").unwrap_err();
        assert_eq!(err, ManagerError::NoExist("waddrmgr".into()));
    }

    #[test]
    fn open_wrong_public_passphrase() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));
        let err = AddressManager::open(store, &config(), b"nope").unwrap_err();
        assert_eq!(err, ManagerError::AuthFailure);
    }

    #[test]
    fn open_wrong_network() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));
        let cfg = ManagerConfig::for_chain(TESTNET3).with_scrypt(FAST);
        let err = AddressManager::open(store, &cfg, b"p1").unwrap_err();
        assert_eq!(
            err,
            ManagerError::WrongNetwork {
                expected: TESTNET3.net_magic,
                found: MAINNET.net_magic,
            }
        );
    }

    #[test]
    fn open_newer_schema_requires_upgrade() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));
        let mut batch = WriteBatch::new();
        batch.put(db::VERSION_KEY, 2u32.to_be_bytes());
        raw_ns(&store).write(batch).unwrap();

        let err = AddressManager::open(store, &config(), b"p1").unwrap_err();
        assert_eq!(err, ManagerError::UpgradeRequired { found: 2, supported: 1 });
    }

    #[test]
    fn open_detects_params_mismatch() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));
        let mut batch = WriteBatch::new();
        batch.put(db::SCRYPT_KEY, db::encode(&ScryptParams { n: 32, ..FAST }).unwrap());
        raw_ns(&store).write(batch).unwrap();

        let err = AddressManager::open(store, &config(), b"p1").unwrap_err();
        assert_eq!(err, ManagerError::ParamsMismatch);
    }

    #[test]
    fn open_detects_tampered_public_slot() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));
        let ns = raw_ns(&store);
        let bytes = ns.get(db::PUB_SLOT_KEY).unwrap().unwrap();
        let mut slot: SealedSlot = db::decode(&bytes, "slot").unwrap();
        slot.extended_key[20] ^= 0x01;
        let mut batch = WriteBatch::new();
        batch.put(db::PUB_SLOT_KEY, db::encode(&slot).unwrap());
        ns.write(batch).unwrap();

        let err = AddressManager::open(store, &config(), b"p1").unwrap_err();
        assert_eq!(err, ManagerError::AuthFailure);
    }

    #[test]
    fn open_detects_name_index_drift() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));
        let mut batch = WriteBatch::new();
        batch.delete(db::name_key("default"));
        raw_ns(&store).write(batch).unwrap();

        let err = AddressManager::open(store, &config(), b"p1").unwrap_err();
        assert!(matches!(err, ManagerError::Corrupt(_)));
    }

    #[test]
    fn unlock_wrong_passphrase_stays_locked() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        assert_eq!(mgr.unlock(b"wrong").unwrap_err(), ManagerError::AuthFailure);
        assert!(mgr.is_locked());
        assert_eq!(mgr.new_account("x").unwrap_err(), ManagerError::Locked);
    }

    #[test]
    fn lock_and_relock() {
        let store = Arc::new(MemoryStore::new());
        let mgr = unlocked(&store);
        assert!(!mgr.is_locked());
        mgr.lock();
        assert!(mgr.is_locked());
        mgr.lock();
        assert!(mgr.is_locked());
        mgr.unlock(b"s1").unwrap();
        mgr.unlock(b"s1").unwrap();
        assert!(!mgr.is_locked());
    }

    #[test]
    fn new_account_requires_unlock() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        assert_eq!(mgr.new_account("savings").unwrap_err(), ManagerError::Locked);
        assert_eq!(mgr.last_account(), 0);
    }

    #[test]
    fn new_account_name_rules() {
        let store = Arc::new(MemoryStore::new());
        let mgr = unlocked(&store);
        for name in ["", "imported"] {
            assert!(matches!(
                mgr.new_account(name),
                Err(ManagerError::InvalidAccountName { .. })
            ));
        }
        assert_eq!(
            mgr.new_account("default").unwrap_err(),
            ManagerError::DuplicateAccount("default".into())
        );
        assert_eq!(mgr.new_account("savings").unwrap(), 1);
        assert_eq!(
            mgr.new_account("savings").unwrap_err(),
            ManagerError::DuplicateAccount("savings".into())
        );
        assert_eq!(mgr.last_account(), 1);
    }

    #[test]
    fn lock_check_precedes_name_check() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        assert_eq!(mgr.new_account("").unwrap_err(), ManagerError::Locked);
    }

    #[test]
    fn accounts_survive_reopen() {
        let store = Arc::new(MemoryStore::new());
        let mgr = unlocked(&store);
        mgr.new_account("a").unwrap();
        mgr.new_account("b").unwrap();
        let xpub = mgr.account_info(2).unwrap().xpub;
        drop(mgr);

        let mgr = AddressManager::open(store, &config(), b"p1").unwrap();
        assert_eq!(mgr.last_account(), 2);
        assert_eq!(mgr.lookup_account("b").unwrap(), 2);
        assert_eq!(mgr.account_info(2).unwrap().xpub, xpub);
        let names: Vec<_> = mgr.accounts().unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["default", "a", "b"]);
    }

    #[test]
    fn lookup_misses() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        assert_eq!(
            mgr.lookup_account("nope").unwrap_err(),
            ManagerError::InvalidAccount("nope".into())
        );
        assert!(matches!(mgr.account_info(5), Err(ManagerError::InvalidAccount(_))));
        assert!(matches!(mgr.account_addresses(5), Err(ManagerError::InvalidAccount(_))));
        assert!(matches!(
            mgr.next_external_addresses(5, 1),
            Err(ManagerError::InvalidAccount(_))
        ));
    }

    #[test]
    fn next_addresses_work_while_locked() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        let ext = mgr.next_external_addresses(0, 3).unwrap();
        let int = mgr.next_internal_addresses(0, 2).unwrap();
        assert_eq!(ext.iter().map(|a| a.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(int.iter().map(|a| a.index).collect::<Vec<_>>(), vec![0, 1]);
        assert!(ext.iter().all(|a| a.chain == ChainKind::External));
        assert!(ext[0].encoded.starts_with('1'));

        let more = mgr.next_external_addresses(0, 1).unwrap();
        assert_eq!(more[0].index, 3);
        let info = mgr.account_info(0).unwrap();
        assert_eq!((info.external_count, info.internal_count), (4, 2));
    }

    #[test]
    fn next_addresses_zero_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        let before = store.len();
        assert!(mgr.next_external_addresses(0, 0).unwrap().is_empty());
        assert_eq!(store.len(), before);
    }

    #[test]
    fn next_addresses_match_iteration() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        let int = mgr.next_internal_addresses(0, 2).unwrap();
        let ext = mgr.next_external_addresses(0, 5).unwrap();

        let listed: Vec<_> = mgr.account_addresses(0).unwrap().collect();
        assert_eq!(listed.len(), 7);
        assert_eq!(&listed[..5], &ext[..]);
        assert_eq!(&listed[5..], &int[..]);
    }

    #[test]
    fn address_iteration_is_restartable() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        mgr.next_external_addresses(0, 3).unwrap();

        let mut iter = mgr.account_addresses(0).unwrap();
        assert_eq!(iter.len(), 3);
        let snapshot = iter.clone();
        let first: Vec<_> = iter.by_ref().collect();
        assert_eq!(iter.len(), 0);
        iter.restart();
        assert_eq!(iter.collect::<Vec<_>>(), first);
        assert_eq!(snapshot.collect::<Vec<_>>(), first);

        // Later derivations are not visible to an existing snapshot.
        let older = mgr.account_addresses(0).unwrap();
        mgr.next_external_addresses(0, 1).unwrap();
        assert_eq!(older.count(), 3);
    }

    #[test]
    fn for_each_surfaces_visitor_error() {
        #[derive(Debug, PartialEq)]
        enum VisitError {
            Stop(u32),
            Manager(ManagerError),
        }
        impl From<ManagerError> for VisitError {
            fn from(e: ManagerError) -> Self {
                VisitError::Manager(e)
            }
        }

        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        mgr.next_external_addresses(0, 5).unwrap();

        let mut seen = Vec::new();
        let result = mgr.for_each_account_address(0, |addr| {
            if addr.index == 2 {
                return Err(VisitError::Stop(addr.index));
            }
            seen.push(addr.index);
            Ok(())
        });
        assert_eq!(result, Err(VisitError::Stop(2)));
        assert_eq!(seen, vec![0, 1]);

        let missing = mgr.for_each_account_address(9, |_| Ok::<(), VisitError>(()));
        assert!(matches!(
            missing,
            Err(VisitError::Manager(ManagerError::InvalidAccount(_)))
        ));
    }

    #[test]
    fn derivation_is_deterministic_across_managers() {
        let a = unlocked(&Arc::new(MemoryStore::new()));
        let b = unlocked(&Arc::new(MemoryStore::new()));
        a.new_account("one").unwrap();
        b.new_account("uno").unwrap();
        let from_a = a.next_external_addresses(1, 4).unwrap();
        let from_b = b.next_external_addresses(1, 4).unwrap();
        assert_eq!(from_a[3].encoded, from_b[3].encoded);
        assert_eq!(a.account_info(1).unwrap().xpub, b.account_info(1).unwrap().xpub);
    }

    #[test]
    fn addresses_match_direct_derivation() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        let addrs = mgr.next_internal_addresses(0, 2).unwrap();

        let master = hdtree::master_key(&seed()).unwrap();
        let account = hdtree::derive_account_key(&master, MAINNET.hd_coin_type, 0)
            .unwrap()
            .public_key();
        let key = hdtree::derive_address_key(&account, ChainKind::Internal, 1).unwrap();
        assert_eq!(addrs[1].address, hdtree::derive_address(&key, &MAINNET));
    }

    #[test]
    fn address_space_exhaustion() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));
        let ns = raw_ns(&store);
        let bytes = ns.get(&db::account_key(0)).unwrap().unwrap();
        let mut row: AccountRow = db::decode(&bytes, "row").unwrap();
        row.next_external = HARDENED_OFFSET - 1;
        let mut batch = WriteBatch::new();
        batch.put(db::account_key(0), db::encode(&row).unwrap());
        ns.write(batch).unwrap();

        let mgr = AddressManager::open(store, &config(), b"p1").unwrap();
        assert_eq!(
            mgr.next_external_addresses(0, 2).unwrap_err(),
            ManagerError::TooManyAddresses {
                account: 0,
                chain: ChainKind::External,
            }
        );
        let last = mgr.next_external_addresses(0, 1).unwrap();
        assert_eq!(last[0].index, HARDENED_OFFSET - 1);
        assert!(mgr.next_external_addresses(0, 1).is_err());
        assert_eq!(mgr.next_internal_addresses(0, 1).unwrap()[0].index, 0);
    }

    #[test]
    fn large_requests_past_preallocation() {
        let store = Arc::new(MemoryStore::new());
        drop(create(&store));
        let count = MAX_PREALLOCATED_ADDRESSES + 10;
        let ns = raw_ns(&store);
        let bytes = ns.get(&db::account_key(0)).unwrap().unwrap();
        let mut row: AccountRow = db::decode(&bytes, "row").unwrap();
        row.next_internal = HARDENED_OFFSET - count as u32;
        let mut batch = WriteBatch::new();
        batch.put(db::account_key(0), db::encode(&row).unwrap());
        ns.write(batch).unwrap();

        let mgr = AddressManager::open(store, &config(), b"p1").unwrap();
        assert_eq!(
            mgr.next_internal_addresses(0, usize::MAX).unwrap_err(),
            ManagerError::TooManyAddresses {
                account: 0,
                chain: ChainKind::Internal,
            }
        );
        let addrs = mgr.next_internal_addresses(0, count).unwrap();
        assert_eq!(addrs.len(), count);
        assert_eq!(addrs[count - 1].index, HARDENED_OFFSET - 1);
    }

    #[test]
    fn account_index_space() {
        assert_eq!(next_account_index(0).unwrap(), 1);
        assert_eq!(next_account_index(MAX_ACCOUNT_NUM - 1).unwrap(), MAX_ACCOUNT_NUM);
        assert_eq!(
            next_account_index(MAX_ACCOUNT_NUM).unwrap_err(),
            ManagerError::TooManyAccounts
        );
        assert!(next_account_index(u32::MAX).is_err());
    }

    #[test]
    fn failed_new_account_commit_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mgr = unlocked(&store);
        store.fail_next_write();
        let err = mgr.new_account("savings").unwrap_err();
        assert!(matches!(err, ManagerError::StorageFailure(_)));
        assert_eq!(mgr.last_account(), 0);
        assert!(mgr.lookup_account("savings").is_err());

        let reopened = AddressManager::open(store.clone(), &config(), b"p1").unwrap();
        assert_eq!(reopened.last_account(), 0);

        assert_eq!(mgr.new_account("savings").unwrap(), 1);
    }

    #[test]
    fn failed_address_commit_is_retryable() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        store.fail_next_write();
        assert!(matches!(
            mgr.next_external_addresses(0, 3),
            Err(ManagerError::StorageFailure(_))
        ));
        assert_eq!(mgr.account_addresses(0).unwrap().count(), 0);
        assert_eq!(mgr.account_info(0).unwrap().external_count, 0);

        let addrs = mgr.next_external_addresses(0, 3).unwrap();
        assert_eq!(addrs[0].index, 0);
    }

    #[test]
    fn change_public_passphrase() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        assert_eq!(
            mgr.change_passphrase(b"bad", b"p2", PassphraseTier::Public).unwrap_err(),
            ManagerError::AuthFailure
        );
        mgr.change_passphrase(b"p1", b"p2", PassphraseTier::Public).unwrap();
        drop(mgr);

        assert_eq!(
            AddressManager::open(store.clone(), &config(), b"p1").unwrap_err(),
            ManagerError::AuthFailure
        );
        let mgr = AddressManager::open(store, &config(), b"p2").unwrap();
        mgr.unlock(b"s1").unwrap();
    }

    #[test]
    fn change_private_passphrase() {
        let store = Arc::new(MemoryStore::new());
        let mgr = unlocked(&store);
        mgr.change_passphrase(b"s1", b"s2", PassphraseTier::Private).unwrap();
        assert!(!mgr.is_locked());
        mgr.lock();
        assert_eq!(mgr.unlock(b"s1").unwrap_err(), ManagerError::AuthFailure);
        mgr.unlock(b"s2").unwrap();
        assert_eq!(mgr.new_account("after").unwrap(), 1);
    }

    #[test]
    fn watching_only_conversion() {
        let store = Arc::new(MemoryStore::new());
        let mgr = unlocked(&store);
        mgr.new_account("savings").unwrap();
        mgr.convert_to_watching_only().unwrap();
        mgr.convert_to_watching_only().unwrap();

        assert!(mgr.is_watching_only());
        assert!(mgr.is_locked());
        assert_eq!(
            mgr.new_account("x").unwrap_err(),
            ManagerError::WatchingOnlyViolation
        );
        assert_eq!(mgr.unlock(b"s1").unwrap_err(), ManagerError::WatchingOnlyViolation);
        assert_eq!(
            mgr.change_passphrase(b"s1", b"s2", PassphraseTier::Private).unwrap_err(),
            ManagerError::WatchingOnlyViolation
        );
        assert_eq!(mgr.next_external_addresses(1, 2).unwrap().len(), 2);

        let ns = raw_ns(&store);
        assert!(ns.get(db::PRIV_SLOT_KEY).unwrap().is_none());
        for (_, row) in db::load_accounts(&ns).unwrap() {
            assert!(row.priv_sealed.is_none());
        }
        drop(mgr);

        let mgr = AddressManager::open(store, &config(), b"p1").unwrap();
        assert!(mgr.is_watching_only());
        assert_eq!(mgr.unlock(b"s1").unwrap_err(), ManagerError::WatchingOnlyViolation);
        assert_eq!(mgr.lookup_account("savings").unwrap(), 1);
        assert_eq!(mgr.account_addresses(1).unwrap().count(), 2);
    }

    #[test]
    fn account_private_keys_are_sealed_under_private_tier() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        let xpub = mgr.account_info(0).unwrap().xpub;
        let ns = raw_ns(&store);
        let accounts = db::load_accounts(&ns).unwrap();
        let sealed_xprv = accounts[&0].priv_sealed.as_ref().unwrap();

        let bytes = ns.get(db::PRIV_SLOT_KEY).unwrap().unwrap();
        let slot: SealedSlot = db::decode(&bytes, "slot").unwrap();
        let crypto_priv = slot.open_crypto_key(b"s1").unwrap();
        let xprv = hdtree::decode_xprv(&sealed::unseal(sealed_xprv, &crypto_priv).unwrap()).unwrap();
        assert_eq!(hdtree::encode_xpub(&xprv.public_key(), &MAINNET).unwrap(), xpub);

        // The public crypto key cannot open it.
        let bytes = ns.get(db::PUB_SLOT_KEY).unwrap().unwrap();
        let public: SealedSlot = db::decode(&bytes, "slot").unwrap();
        let crypto_pub = public.open_crypto_key(b"p1").unwrap();
        assert!(sealed::unseal(sealed_xprv, &crypto_pub).is_err());
    }

    #[test]
    fn no_plaintext_keys_in_store() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        let xpub = mgr.account_info(0).unwrap().xpub;
        let ns = raw_ns(&store);
        for (_, value) in ns.scan_prefix(b"").unwrap() {
            assert!(!value.windows(4).any(|w| w == b"xprv"));
            assert!(!value.windows(xpub.len()).any(|w| w == xpub.as_bytes()));
        }
    }

    #[test]
    fn concurrent_address_requests_never_collide() {
        let store = Arc::new(MemoryStore::new());
        let mgr = create(&store);
        let mut all: Vec<u32> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| mgr.next_external_addresses(0, 5).unwrap()))
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .map(|a| a.index)
                .collect()
        });
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn debug_is_redacted() {
        let store = Arc::new(MemoryStore::new());
        let mgr = unlocked(&store);
        let debug = format!("{mgr:?}");
        assert!(debug.contains("unlocked"));
        assert!(!debug.contains("xprv"));
        assert!(!debug.contains("SecretKey"));
    }
}
