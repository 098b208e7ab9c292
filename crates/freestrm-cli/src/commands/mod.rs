//! CLI subcommands
//!
//! Every command receives a [`CliContext`] and loads what it needs from the
//! configuration file itself.

pub mod clear;
pub mod config;
pub mod history;
pub mod ls;
pub mod run;
pub mod tasks;
pub mod url;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use freestrm_core::config::Config;
use freestrm_history::{HistoryLimits, JsonHistoryStore};
use freestrm_sync::engine::SyncEngine;
use tracing::{debug, info};

use crate::output::OutputFormat;

/// Global options shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config_path: PathBuf,
    pub format: OutputFormat,
}

impl CliContext {
    /// Load the configuration file, or the defaults when it does not exist.
    pub fn load_config(&self) -> Result<Config> {
        if !self.config_path.exists() {
            debug!(config_path = %self.config_path.display(), "No configuration file, using defaults");
            return Ok(Config::default());
        }
        let config = Config::load(&self.config_path).with_context(|| {
            format!(
                "Failed to load configuration from {}",
                self.config_path.display()
            )
        })?;
        info!(config_path = %self.config_path.display(), "Loaded configuration");
        Ok(config)
    }

    pub async fn open_history(&self, config: &Config) -> Result<Arc<JsonHistoryStore>> {
        let store = JsonHistoryStore::open(&config.history.file, HistoryLimits::from(&config.history))
            .await
            .with_context(|| {
                format!(
                    "Failed to open task history at {}",
                    config.history.file.display()
                )
            })?;
        Ok(Arc::new(store))
    }

    pub async fn open_engine(&self) -> Result<SyncEngine> {
        let config = self.load_config()?;
        let history = self.open_history(&config).await?;
        Ok(SyncEngine::new(config, history))
    }
}

/// Account to browse: the given name, or the first configured account.
pub fn pick_account(config: &Config, name: Option<&str>) -> Result<String> {
    match name {
        Some(name) => Ok(name.to_string()),
        None => config
            .accounts
            .first()
            .map(|a| a.name.clone())
            .context("No accounts configured. Add one under `accounts` in the configuration file."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freestrm_core::domain::AccountCredential;

    fn ctx(path: PathBuf) -> CliContext {
        CliContext {
            config_path: path,
            format: OutputFormat::Human,
        }
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ctx(dir.path().join("absent.yaml")).load_config().unwrap();
        assert!(config.tasks.is_empty());
    }

    #[test]
    fn test_broken_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync: [not, a, map").unwrap();
        assert!(ctx(path).load_config().is_err());
    }

    #[test]
    fn test_pick_account() {
        let mut config = Config::default();
        assert!(pick_account(&config, None).is_err());
        config.accounts.push(AccountCredential::pan115("main", "UID=1"));
        assert_eq!(pick_account(&config, None).unwrap(), "main");
        assert_eq!(pick_account(&config, Some("alt")).unwrap(), "alt");
    }
}
