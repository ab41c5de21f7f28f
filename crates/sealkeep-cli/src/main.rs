//! sealkeep: encrypted credential wallet CLI
//!
//! Commands:
//!   init                              - create the wallet database and its keys
//!   put <type> <name> <value> [-t k=v] - store a record
//!   get <type> <name>                 - print one record
//!   list [<type>]                     - print every record (optionally of one type)
//!   update <type> <name> <value>      - replace a record's value and tags
//!   rm <type> <name>                  - delete a record
//!   count                             - number of stored records
//!   find-tag <type> <tag> <value>     - search by tag (exact, or --prefix)
//!   export <file>                     - write an encrypted backup
//!   import <file>                     - restore an encrypted backup
//!   config show                       - display current configuration

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sealkeep_core::config::{expand_tilde, SealkeepConfig};
use sealkeep_core::WalletRecord;
use sealkeep_crypto::KdfParams;
use sealkeep_wallet::{export, restore, BackupConfig, Transfer, TransferEvent, Wallet, WalletService};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealkeep",
    version,
    about = "Encrypted credential wallet",
    long_about = "sealkeep: store DIDs, keys and credentials in an encrypted, tag-searchable wallet"
)]
struct Cli {
    /// Path to sealkeep.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SEALKEEP_CONFIG",
        default_value = "~/.config/sealkeep/config.toml"
    )]
    config: PathBuf,

    /// Wallet database path (overrides config)
    #[arg(long, env = "SEALKEEP_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new wallet
    ///
    /// The wallet passphrase is read from SEALKEEP_PASSPHRASE or prompted for.
    Init,

    /// Store a new record
    Put {
        record_type: String,
        name: String,
        value: String,
        /// Tag as name=value (repeatable). Names starting with `~` are searchable by prefix.
        #[arg(long = "tag", short = 't', value_parser = parse_tag)]
        tags: Vec<(String, String)>,
    },

    /// Print one record
    Get {
        record_type: String,
        name: String,
        /// Print as JSON (value base64-encoded)
        #[arg(long)]
        json: bool,
    },

    /// Print every record, or every record of one type
    List {
        record_type: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Replace the value and tags of an existing record
    Update {
        record_type: String,
        name: String,
        value: String,
        #[arg(long = "tag", short = 't', value_parser = parse_tag)]
        tags: Vec<(String, String)>,
    },

    /// Delete a record and its tags
    Rm { record_type: String, name: String },

    /// Number of stored records
    Count,

    /// Find records of a type by tag
    FindTag {
        record_type: String,
        tag: String,
        value: String,
        /// Match tag values starting with VALUE (plaintext tags only)
        #[arg(long)]
        prefix: bool,
        #[arg(long)]
        json: bool,
    },

    /// Export every record to an encrypted backup file
    ///
    /// The backup passphrase is read from SEALKEEP_BACKUP_PASSPHRASE or prompted for.
    /// A bare file name is placed in the configured backup directory.
    Export { file: PathBuf },

    /// Restore records from an encrypted backup file
    ///
    /// All records are restored or none are.
    Import { file: PathBuf },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Display current configuration
    Show,
}

fn parse_tag(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got {s:?}")),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let mut config = SealkeepConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;
    if let Some(db) = cli.db {
        config.wallet.db_path = db;
    }

    init_logging(&config.logging.level, &config.logging.format);
    // load() runs before any subscriber exists, so repeat its warning here
    if let Some(notice) = missing_config_notice(&config_path) {
        tracing::warn!("{notice}");
    }
    tracing::debug!(config = %config_path.display(), wallet = %config.wallet.id, "sealkeep starting");

    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Put { record_type, name, value, tags } => {
            let wallet = open_wallet(&config)?;
            let record = build_record(record_type, name, value, tags);
            wallet.add_record(&record)?;
            println!("stored {}/{}", record.record_type, record.name);
            Ok(())
        }
        Commands::Get { record_type, name, json } => {
            let wallet = open_wallet(&config)?;
            let record = wallet
                .find_record(&record_type, &name)?
                .with_context(|| format!("no record {record_type}/{name}"))?;
            print_records(&[record], json)
        }
        Commands::List { record_type, json } => {
            let wallet = open_wallet(&config)?;
            let records = match record_type {
                Some(t) => wallet.find_records(&t)?,
                None => wallet.find_all_records()?,
            };
            print_records(&records, json)
        }
        Commands::Update { record_type, name, value, tags } => {
            let wallet = open_wallet(&config)?;
            let record = build_record(record_type, name, value, tags);
            wallet.update_record(&record)?;
            println!("updated {}/{}", record.record_type, record.name);
            Ok(())
        }
        Commands::Rm { record_type, name } => {
            let wallet = open_wallet(&config)?;
            wallet.delete_record(&record_type, &name)?;
            println!("deleted {record_type}/{name}");
            Ok(())
        }
        Commands::Count => {
            let wallet = open_wallet(&config)?;
            println!("{}", wallet.count()?);
            Ok(())
        }
        Commands::FindTag { record_type, tag, value, prefix, json } => {
            let wallet = open_wallet(&config)?;
            let records = if prefix {
                wallet.find_by_tag_prefix(&record_type, &tag, &value)?
            } else {
                wallet.find_by_tag(&record_type, &tag, &value)?
            };
            print_records(&records, json)
        }
        Commands::Export { file } => cmd_export(&config, &file).await,
        Commands::Import { file } => cmd_import(&config, &file).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    match format {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn missing_config_notice(path: &Path) -> Option<String> {
    (!path.exists()).then(|| format!("config file not found: {}  (using defaults)", path.display()))
}

// ── Passphrases ───────────────────────────────────────────────────────────────

fn read_passphrase(env_var: &str, prompt: &str, confirm: bool) -> Result<SecretString> {
    if let Ok(value) = std::env::var(env_var) {
        return Ok(SecretString::from(value));
    }

    let first = rpassword::prompt_password(prompt).context("reading passphrase")?;
    if first.is_empty() {
        bail!("passphrase must not be empty");
    }
    if confirm {
        let second = rpassword::prompt_password("Confirm: ").context("reading passphrase")?;
        if first != second {
            bail!("passphrases do not match");
        }
    }
    Ok(SecretString::from(first))
}

fn wallet_passphrase(confirm: bool) -> Result<SecretString> {
    read_passphrase("SEALKEEP_PASSPHRASE", "Wallet passphrase: ", confirm)
}

fn backup_passphrase(confirm: bool) -> Result<SecretString> {
    read_passphrase("SEALKEEP_BACKUP_PASSPHRASE", "Backup passphrase: ", confirm)
}

// ── Wallet helpers ────────────────────────────────────────────────────────────

fn kdf_params(config: &SealkeepConfig) -> KdfParams {
    KdfParams {
        mem_cost_kib: config.crypto.argon2_mem_cost_kib,
        time_cost: config.crypto.argon2_time_cost,
        parallelism: config.crypto.argon2_parallelism,
    }
}

fn open_wallet(config: &SealkeepConfig) -> Result<Arc<Wallet>> {
    let mut service = WalletService::from_config(config);
    let passphrase = wallet_passphrase(false)?;
    service
        .open(&passphrase)
        .with_context(|| format!("opening wallet: {}", service.db_path().display()))
}

fn build_record(
    record_type: String,
    name: String,
    value: String,
    tags: Vec<(String, String)>,
) -> WalletRecord {
    tags.into_iter().fold(
        WalletRecord::new(record_type, name, value.into_bytes()),
        |record, (k, v)| record.with_tag(k, v),
    )
}

fn print_records(records: &[WalletRecord], json: bool) -> Result<()> {
    if json {
        let rendered = serde_json::to_string_pretty(records).context("serializing records")?;
        println!("{rendered}");
        return Ok(());
    }

    for record in records {
        println!(
            "{}/{}  {}",
            record.record_type,
            record.name,
            String::from_utf8_lossy(&record.value)
        );
        for (k, v) in &record.tags {
            println!("    {k} = {v}");
        }
    }
    Ok(())
}

/// Bare file names land in the configured backup directory.
fn resolve_backup_path(config: &SealkeepConfig, file: &Path) -> PathBuf {
    let bare = file
        .parent()
        .map(|p| p.as_os_str().is_empty())
        .unwrap_or(true);
    if bare && !file.is_absolute() {
        expand_tilde(&config.backup.dir).join(file)
    } else {
        file.to_path_buf()
    }
}

// ── Progress display ──────────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Drive a transfer to completion, updating `pb` on each progress event.
/// Ctrl-C cancels the transfer at the next record boundary.
async fn follow(
    mut transfer: Transfer,
    pb: &ProgressBar,
    on_progress: impl Fn(&ProgressBar, u64),
) -> Result<u64> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = transfer.next() => match event {
                Some(TransferEvent::Progress(n)) => on_progress(pb, n),
                Some(TransferEvent::Completed(total)) => {
                    pb.finish_with_message("done");
                    return Ok(total);
                }
                Some(TransferEvent::Failed(err)) => {
                    pb.abandon_with_message("failed");
                    return Err(err.into());
                }
                None => bail!("transfer ended without a result"),
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                pb.set_message("cancelling...");
                transfer.cancel();
            }
        }
    }
}

// ── `sealkeep init` ───────────────────────────────────────────────────────────

fn cmd_init(config: &SealkeepConfig) -> Result<()> {
    let mut service = WalletService::from_config(config);
    let passphrase = wallet_passphrase(true)?;

    let spinner = make_spinner("init");
    spinner.set_message("deriving keys");
    let result = service.create(&passphrase, kdf_params(config));
    spinner.finish_and_clear();

    result.with_context(|| format!("creating wallet: {}", service.db_path().display()))?;
    println!("created wallet at {}", service.db_path().display());
    Ok(())
}

// ── `sealkeep export` / `sealkeep import` ─────────────────────────────────────

async fn cmd_export(config: &SealkeepConfig, file: &Path) -> Result<()> {
    let wallet = open_wallet(config)?;
    let path = resolve_backup_path(config, file);
    let passphrase = backup_passphrase(true)?;

    let total = wallet.count()?;
    let pb = make_progress_bar(total, "export");
    let transfer = export(wallet, BackupConfig::from_config(config, &path, passphrase));

    let written = follow(transfer, &pb, |pb, remaining| {
        pb.set_position(total.saturating_sub(remaining))
    })
    .await
    .with_context(|| format!("exporting to {}", path.display()))?;

    println!("exported {written} records to {}", path.display());
    Ok(())
}

async fn cmd_import(config: &SealkeepConfig, file: &Path) -> Result<()> {
    let wallet = open_wallet(config)?;
    let path = resolve_backup_path(config, file);
    let passphrase = backup_passphrase(false)?;

    let pb = make_spinner("import");
    let transfer = restore(wallet, BackupConfig::from_config(config, &path, passphrase));

    let restored = follow(transfer, &pb, |pb, n| pb.set_message(format!("{n} records")))
        .await
        .with_context(|| format!("importing {}", path.display()))?;

    println!("imported {restored} records from {}", path.display());
    Ok(())
}

// ── `sealkeep config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &SealkeepConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
