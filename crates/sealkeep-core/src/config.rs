use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{WalletError, WalletResult};
use crate::types::TagPolicy;

/// Top-level configuration (loaded from sealkeep.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealkeepConfig {
    pub wallet: WalletConfig,
    pub crypto: CryptoConfig,
    pub backup: BackupSettings,
    pub tags: TagPolicy,
    pub logging: LoggingConfig,
}

impl SealkeepConfig {
    /// Load from a TOML file, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> WalletResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| WalletError::Config(format!("parsing {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Wallet identifier, used in log fields
    pub id: String,
    /// SQLite database path
    pub db_path: PathBuf,
}

/// Argon2id cost parameters used when creating wallets and backups
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Plaintext bytes per encrypted chunk (default: 1024)
    pub chunk_size: u32,
    /// Default directory for backup files
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            db_path: PathBuf::from("~/.local/share/sealkeep/wallet.db"),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            dir: PathBuf::from("~/.local/share/sealkeep/backups"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(home).join(rest)
        }
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[wallet]
id = "fido"
db_path = "/var/lib/sealkeep/fido.db"

[crypto]
argon2_mem_cost_kib = 131072
argon2_time_cost = 4
argon2_parallelism = 8

[backup]
chunk_size = 4096
dir = "/tmp/backups"

[tags]
plaintext_prefix = "@"
plaintext_names = ["rp_id"]

[logging]
level = "debug"
format = "json"
"#;
        let config: SealkeepConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.wallet.id, "fido");
        assert_eq!(config.wallet.db_path, PathBuf::from("/var/lib/sealkeep/fido.db"));
        assert_eq!(config.crypto.argon2_mem_cost_kib, 131072);
        assert_eq!(config.crypto.argon2_parallelism, 8);
        assert_eq!(config.backup.chunk_size, 4096);
        assert_eq!(config.tags.plaintext_prefix, "@");
        assert_eq!(config.tags.plaintext_names, vec!["rp_id".to_string()]);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: SealkeepConfig = toml::from_str("").unwrap();

        assert_eq!(config.wallet.id, "default");
        assert_eq!(config.crypto.argon2_mem_cost_kib, 65536);
        assert_eq!(config.crypto.argon2_time_cost, 3);
        assert_eq!(config.backup.chunk_size, 1024);
        assert_eq!(config.tags.plaintext_prefix, "~");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[backup]
chunk_size = 65536
"#;
        let config: SealkeepConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.backup.chunk_size, 65536);
        // Defaults
        assert_eq!(config.backup.dir, PathBuf::from("~/.local/share/sealkeep/backups"));
        assert_eq!(config.crypto.argon2_time_cost, 3);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SealkeepConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.backup.chunk_size, 1024);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[backup]\nchunk_size = \"big\"\n").unwrap();

        let err = SealkeepConfig::load(&path).unwrap_err();
        assert!(matches!(err, WalletError::Config(_)));
    }

    #[test]
    fn test_expand_tilde() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_tilde(Path::new("~/wallet.db")),
            PathBuf::from("/home/tester/wallet.db")
        );
        assert_eq!(expand_tilde(Path::new("/abs/wallet.db")), PathBuf::from("/abs/wallet.db"));
    }
}
