//! hdvault-cli — command-line shell over the encrypted address manager.
//!
//! Every command opens the RocksDB wallet database for the selected network,
//! performs one manager operation and exits. Passphrases are read without
//! echo unless given as flags.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use hdvault_core::params::ChainParams;
use hdvault_store::{RocksStore, StoreConfig};
use hdvault_wallet::{
    AddressManager, ManagedAddress, ManagerConfig, PassphraseTier, ScryptParams, Seed,
};
use zeroize::Zeroizing;

type Manager = AddressManager<Arc<RocksStore>>;

/// Encrypted HD address manager.
#[derive(Parser)]
#[command(name = "hdvault-cli")]
#[command(version, about = "Encrypted hierarchical-deterministic address manager")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Network: mainnet, testnet3, regtest or simnet.
    #[arg(short, long, default_value = "mainnet", global = true)]
    network: String,

    /// Data directory (default: platform data dir/hdvault).
    #[arg(long, global = true)]
    datadir: Option<PathBuf>,

    /// Store namespace holding the manager.
    #[arg(long, default_value = hdvault_wallet::config::DEFAULT_NAMESPACE, global = true)]
    namespace: String,

    /// Public passphrase. Prompted for when omitted.
    #[arg(long, global = true)]
    public_passphrase: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new manager.
    Create(CreateArgs),
    /// List accounts.
    Accounts,
    /// Create a new account.
    NewAccount {
        /// Account name.
        name: String,
    },
    /// Derive new addresses.
    NewAddress(NewAddressArgs),
    /// List every address derived for an account.
    Addresses {
        /// Account index.
        #[arg(short, long, default_value_t = 0)]
        account: u32,
    },
    /// Change the public or private passphrase.
    ChangePassphrase {
        /// Change the private passphrase instead of the public one.
        #[arg(long)]
        private: bool,
    },
    /// Permanently delete all private key material.
    WatchingOnly {
        /// Required confirmation.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args)]
struct CreateArgs {
    /// Restore from a BIP-39 mnemonic or a hex seed instead of generating one.
    #[arg(long)]
    seed: Option<String>,

    /// Optional BIP-39 passphrase used with a restored mnemonic.
    #[arg(long, default_value = "")]
    mnemonic_passphrase: String,

    /// Scrypt cost N (power of two).
    #[arg(long, default_value_t = ScryptParams::default().n)]
    scrypt_n: u64,
}

#[derive(Args)]
struct NewAddressArgs {
    /// Account index.
    #[arg(short, long, default_value_t = 0)]
    account: u32,

    /// Number of addresses.
    #[arg(short, long, default_value_t = 1)]
    count: usize,

    /// Derive change addresses.
    #[arg(long)]
    internal: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let global = &cli.global;

    match &cli.command {
        Commands::Create(args) => create(global, args),
        Commands::Accounts => accounts(global),
        Commands::NewAccount { name } => new_account(global, name),
        Commands::NewAddress(args) => new_address(global, args),
        Commands::Addresses { account } => addresses(global, *account),
        Commands::ChangePassphrase { private } => change_passphrase(global, *private),
        Commands::WatchingOnly { yes } => watching_only(global, *yes),
    }
}

/// Create a manager from a fresh or restored seed.
fn create(global: &GlobalArgs, args: &CreateArgs) -> Result<()> {
    let (seed, phrase) = match &args.seed {
        Some(input) => (parse_seed_input(input, &args.mnemonic_passphrase)?, None),
        None => {
            let phrase = hdvault_wallet::new_mnemonic().context("Failed to generate mnemonic")?;
            let seed = Seed::from_mnemonic(&phrase, "").context("Failed to derive seed")?;
            (seed, Some(phrase))
        }
    };

    let public = match &global.public_passphrase {
        Some(p) => Zeroizing::new(p.clone()),
        None => prompt_confirmed("Public passphrase")?,
    };
    let private = prompt_confirmed("Private passphrase")?;

    let mut config = manager_config(global)?;
    config.scrypt.n = args.scrypt_n;

    let store = open_store(global, &config.chain)?;
    let mgr = AddressManager::create(store, seed, public.as_bytes(), private.as_bytes(), &config)
        .context("Failed to create manager")?;

    println!("\n=== MANAGER CREATED ===");
    println!("Network:   {}", config.chain.name);
    println!("Namespace: {}", mgr.namespace());
    if let Some(phrase) = phrase {
        println!("\nSEED PHRASE (BACKUP THIS, 24 WORDS):");
        println!("  {}", phrase.as_str());
        println!("\nWARNING: This seed phrase will NOT be shown again.");
    }
    Ok(())
}

/// List every account.
fn accounts(global: &GlobalArgs) -> Result<()> {
    let mgr = open_manager(global)?;
    let accounts = mgr.accounts()?;
    if global.json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }
    for acct in accounts {
        println!(
            "{:>4}  {:<20} ext {:>6}  int {:>6}  {}",
            acct.index, acct.name, acct.external_count, acct.internal_count, acct.xpub
        );
    }
    Ok(())
}

/// Create an account, unlocking the manager for the duration of the call.
fn new_account(global: &GlobalArgs, name: &str) -> Result<()> {
    let mgr = open_manager(global)?;
    let private = prompt_password("Private passphrase")?;
    mgr.unlock(private.as_bytes())
        .context("Failed to unlock manager")?;
    let index = mgr.new_account(name);
    mgr.lock();
    let index = index.with_context(|| format!("Failed to create account {name:?}"))?;
    println!("{index}");
    Ok(())
}

/// Derive and print new addresses.
fn new_address(global: &GlobalArgs, args: &NewAddressArgs) -> Result<()> {
    let mgr = open_manager(global)?;
    let addrs = if args.internal {
        mgr.next_internal_addresses(args.account, args.count)?
    } else {
        mgr.next_external_addresses(args.account, args.count)?
    };
    print_addresses(global, &addrs)
}

/// Print every address derived so far for an account.
fn addresses(global: &GlobalArgs, account: u32) -> Result<()> {
    let mgr = open_manager(global)?;
    let addrs: Vec<ManagedAddress> = mgr.account_addresses(account)?.collect();
    print_addresses(global, &addrs)
}

fn change_passphrase(global: &GlobalArgs, private: bool) -> Result<()> {
    let mgr = open_manager(global)?;
    let (tier, label) = if private {
        (PassphraseTier::Private, "private")
    } else {
        (PassphraseTier::Public, "public")
    };
    let old = prompt_password(&format!("Current {label} passphrase"))?;
    let new = prompt_confirmed(&format!("New {label} passphrase"))?;
    mgr.change_passphrase(old.as_bytes(), new.as_bytes(), tier)
        .context("Failed to change passphrase")?;
    println!("{label} passphrase changed");
    Ok(())
}

fn watching_only(global: &GlobalArgs, yes: bool) -> Result<()> {
    if !yes {
        bail!("This deletes all private keys; re-run with --yes to confirm");
    }
    let mgr = open_manager(global)?;
    mgr.convert_to_watching_only()
        .context("Failed to convert to watching-only")?;
    println!("Manager is now watching-only");
    Ok(())
}

fn print_addresses(global: &GlobalArgs, addrs: &[ManagedAddress]) -> Result<()> {
    if global.json {
        println!("{}", serde_json::to_string_pretty(addrs)?);
        return Ok(());
    }
    for addr in addrs {
        println!("{}/{}/{}  {}", addr.account, addr.chain.index(), addr.index, addr.encoded);
    }
    Ok(())
}

/// Parse seed input as either a BIP-39 mnemonic (multi-word) or hex string.
fn parse_seed_input(input: &str, mnemonic_passphrase: &str) -> Result<Seed> {
    let trimmed = input.trim();
    if trimmed.split_whitespace().count() > 1 {
        return Seed::from_mnemonic(trimmed, mnemonic_passphrase).context("Invalid mnemonic");
    }
    let bytes = Zeroizing::new(hex::decode(trimmed).context("Invalid hex seed")?);
    Seed::from_bytes(&bytes).context("Seed must be 16, 32 or 64 bytes")
}

fn manager_config(global: &GlobalArgs) -> Result<ManagerConfig> {
    let chain = ChainParams::by_name(&global.network)
        .with_context(|| format!("Unknown network {:?}", global.network))?;
    Ok(ManagerConfig::for_chain(chain).with_namespace(global.namespace.clone()))
}

fn open_store(global: &GlobalArgs, chain: &ChainParams) -> Result<Arc<RocksStore>> {
    let mut store_config = StoreConfig::default();
    if let Some(dir) = &global.datadir {
        store_config.data_dir = dir.clone();
    }
    let path = store_config.db_path(chain.name);
    tracing::debug!(path = %path.display(), "cli: opening wallet database");
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    let store = RocksStore::open_with(&path, store_config.sync_writes)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn open_manager(global: &GlobalArgs) -> Result<Manager> {
    let config = manager_config(global)?;
    let store = open_store(global, &config.chain)?;
    let public = match &global.public_passphrase {
        Some(p) => Zeroizing::new(p.clone()),
        None => prompt_password("Public passphrase")?,
    };
    AddressManager::open(store, &config, public.as_bytes()).context("Failed to open manager")
}

/// Prompt for a password securely (no echo).
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    rpassword::prompt_password(format!("{prompt}: "))
        .map(Zeroizing::new)
        .context("Failed to read password")
}

/// Prompt twice and require both entries to match.
fn prompt_confirmed(prompt: &str) -> Result<Zeroizing<String>> {
    let first = prompt_password(prompt)?;
    let second = prompt_password("Confirm")?;
    if first != second {
        bail!("Passphrases do not match");
    }
    Ok(first)
}
