//! Config command - View and validate FreeStrm configuration
//!
//! Provides the `freestrm config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON) with secrets redacted
//! 2. Validates the configuration file and reports errors
//! 3. Prints the configuration file location

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use freestrm_core::config::Config;
use tracing::info;

use super::CliContext;
use crate::output::{get_formatter, plural};

const REDACTED: &str = "<redacted>";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

/// Configuration as JSON with cookies, passwords and API keys masked.
fn redacted(config: &Config) -> Result<serde_json::Value> {
    let mut value =
        serde_json::to_value(config).context("Failed to serialize configuration to JSON")?;
    if let Some(accounts) = value.get_mut("accounts").and_then(|a| a.as_array_mut()) {
        for account in accounts.iter_mut().filter_map(|a| a.as_object_mut()) {
            for key in ["cookie", "password"] {
                if let Some(secret) = account.get_mut(key) {
                    *secret = REDACTED.into();
                }
            }
        }
    }
    if let Some(key) = value.pointer_mut("/emby/api_key") {
        *key = REDACTED.into();
    }
    Ok(value)
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Validate => self.execute_validate(ctx),
            ConfigCommand::Path => {
                if ctx.format.is_json() {
                    get_formatter(ctx.format).print_json(&serde_json::json!({
                        "config_path": ctx.config_path.display().to_string(),
                        "exists": ctx.config_path.exists(),
                    }));
                } else {
                    println!("{}", ctx.config_path.display());
                }
                Ok(())
            }
        }
    }

    fn execute_show(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let config = ctx.load_config()?;
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        let value = redacted(&config)?;
        if ctx.format.is_json() {
            formatter.print_json(&value);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");
            let yaml =
                serde_yaml::to_string(&value).context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let path = &ctx.config_path;

        if !path.exists() {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": path.display().to_string(),
                    "errors": ["Configuration file not found. Using defaults."],
                }));
            } else {
                formatter.info(&format!("Configuration file not found at {}", path.display()));
                formatter.info("Using default configuration.");
            }
            return Ok(());
        }

        let config = match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {}", e)],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {}", e));
                    formatter.info(&format!("File: {}", path.display()));
                }
                bail!("invalid configuration");
            }
        };

        info!(config_path = %path.display(), "Validating configuration");
        let errors = config.validate();

        if ctx.format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            formatter.error(&format!("Configuration has {}:", plural(errors.len(), "error")));
            formatter.info(&format!("File: {}", path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        if !errors.is_empty() {
            bail!("invalid configuration");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freestrm_core::config::ConfigBuilder;
    use freestrm_core::domain::AccountCredential;

    #[test]
    fn test_show_redacts_secrets() {
        let config = ConfigBuilder::new()
            .account(AccountCredential::pan115("main", "UID=1; CID=secret"))
            .account(AccountCredential::open_list("nas", "http://nas:5244", "admin", "hunter2"))
            .emby("http://emby:8096", "k3y")
            .build();

        let value = redacted(&config).unwrap();
        let text = value.to_string();
        assert!(!text.contains("secret"));
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("k3y"));
        assert_eq!(value["accounts"][0]["cookie"], REDACTED);
        assert_eq!(value["accounts"][1]["username"], "admin");
        assert_eq!(value["emby"]["api_key"], REDACTED);
    }
}
