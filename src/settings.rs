//! Handles settings for the farm ledger. Configuration is read from
//! `grain-ledger.toml` (optional) and `GRAIN_LEDGER__*` environment
//! variables, on top of built-in defaults.
//!
//! ```toml
//! [storage]
//! backend = "csv"       # or "sqlite"
//! data_dir = "."
//!
//! [backup]
//! dir = "backups"
//! keep = 20
//! policy = "session"    # never | session | every_write
//! ```
use crate::backup::{BackupManager, BackupPolicy};
use crate::error::LedgerResult;
use crate::storage::{CsvStore, LedgerStore, SqliteStore};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "grain-ledger";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Csv,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub sqlite_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Farm {
    pub seed_bins: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Backup {
    pub dir: PathBuf,
    pub keep: usize,
    pub policy: BackupPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub storage: Storage,
    pub farm: Farm,
    pub backup: Backup,
    pub log: Log,
    pub server: Server,
}

impl Settings {
    /// Load settings; `path` overrides the default config file name.
    pub fn new(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .set_default("storage.backend", "csv")?
            .set_default("storage.data_dir", ".")?
            .set_default("storage.sqlite_path", "grain_ledger.db")?
            .set_default("farm.seed_bins", 31)?
            .set_default("backup.dir", "backups")?
            .set_default("backup.keep", 20)?
            .set_default("backup.policy", "session")?
            .set_default("log.level", "info")?
            .set_default("server.bind", "127.0.0.1:3000")?
            .add_source(file)
            .add_source(
                Environment::with_prefix("GRAIN_LEDGER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Open the configured store
    pub fn open_store(&self) -> LedgerResult<Box<dyn LedgerStore>> {
        Ok(match self.storage.backend {
            Backend::Csv => Box::new(CsvStore::open(&self.storage.data_dir)?),
            Backend::Sqlite => Box::new(SqliteStore::open(&self.storage.sqlite_path)?),
        })
    }

    pub fn backup_manager(&self) -> Option<BackupManager> {
        if self.backup.policy == BackupPolicy::Never && self.backup.keep == 0 {
            return None;
        }
        Some(BackupManager::new(&self.backup.dir, self.backup.keep))
    }

    /// `tracing` filter directive for this crate's binaries
    pub fn log_filter(&self) -> String {
        format!(
            "grain_ledger={level},grain_server={level},tower_http={level}",
            level = self.log.level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config_file() {
        let settings = Settings::new(Some(Path::new("/nonexistent/grain-ledger.toml")));
        assert!(settings.is_err(), "an explicit path must exist");

        let dir = std::env::temp_dir().join(format!("grain-ledger-settings-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("farm.toml");
        std::fs::write(&path, "[farm]\nseed_bins = 12\n\n[backup]\npolicy = \"every_write\"\n").unwrap();

        let settings = Settings::new(Some(&path)).unwrap();
        assert_eq!(settings.farm.seed_bins, 12);
        assert_eq!(settings.backup.policy, BackupPolicy::EveryWrite);
        assert_eq!(settings.storage.backend, Backend::Csv);
        assert_eq!(settings.backup.keep, 20);
        assert_eq!(settings.server.bind, "127.0.0.1:3000");
        assert!(settings.log_filter().starts_with("grain_ledger=info"));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_sqlite_backend_from_file() {
        let dir = std::env::temp_dir().join(format!("grain-ledger-settings-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("farm.toml");
        let db = dir.join("farm.db");
        std::fs::write(
            &path,
            format!(
                "[storage]\nbackend = \"sqlite\"\nsqlite_path = \"{}\"\n",
                db.display()
            ),
        )
        .unwrap();

        let settings = Settings::new(Some(&path)).unwrap();
        assert_eq!(settings.storage.backend, Backend::Sqlite);
        let store = settings.open_store().unwrap();
        assert!(store.describe().starts_with("sqlite:"));

        std::fs::remove_dir_all(dir).ok();
    }
}
