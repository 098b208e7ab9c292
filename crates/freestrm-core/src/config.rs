//! Configuration module for FreeStrm.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! Every section is optional in the file; missing values fall back to defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::account::AccountCredential;
use crate::domain::task::{normalize_extension, SyncTask};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for FreeStrm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory task target paths are resolved against.
    pub data_root: PathBuf,
    pub drive: DriveConfig,
    pub rate_limiting: RateLimitingConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub history: HistoryConfig,
    /// Media server refreshed after each completed run.
    pub emby: Option<EmbyConfig>,
    pub accounts: Vec<AccountCredential>,
    pub tasks: Vec<SyncTask>,
}

/// 115 endpoint and protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// User-Agent sent with every request.
    pub user_agent: String,
    pub webapi_base_url: String,
    pub proapi_base_url: String,
    /// Seconds to wait for a directory export to finish.
    pub export_timeout_secs: u64,
    /// Milliseconds between export status polls.
    pub export_poll_interval_ms: u64,
    /// Entries requested per listing page.
    pub list_page_size: u32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

/// Delay growth between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    Exponential,
}

/// Throughput limits for one operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationLimits {
    /// Starts allowed in any rolling second, shared by accounts of one backend.
    pub per_second: u32,
    /// Operations in flight at once, per account.
    pub concurrent: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub backoff: Backoff,
}

impl Default for OperationLimits {
    fn default() -> Self {
        Self {
            per_second: 2,
            concurrent: 2,
            max_retries: 3,
            retry_delay_ms: 2000,
            backoff: Backoff::Fixed,
        }
    }
}

impl OperationLimits {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Rate limiting per operation kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Directory lookups, listings and export jobs.
    pub listing: OperationLimits,
    /// Pickcode and download URL resolution.
    pub link: OperationLimits,
    /// Literal file transfers.
    pub download: OperationLimits,
}

/// Defaults applied to every task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub strm_extensions: Vec<String>,
    pub download_extensions: Vec<String>,
    pub strm_prefix: String,
    /// Literal downloads in flight per run.
    pub max_in_flight: usize,
    /// Progress records kept for late subscribers.
    pub log_buffer: usize,
}

/// TTLs of the remote metadata caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir_id_ttl_secs: u64,
    pub listing_ttl_secs: u64,
    pub pickcode_ttl_secs: u64,
    /// Upper bound on entries per cache.
    pub max_entries: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Task history storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub file: PathBuf,
    pub max_records: usize,
    /// A record whose log grows past this is trimmed...
    pub max_logs_per_record: usize,
    /// ...down to this many newest lines.
    pub retained_logs: usize,
    pub retention_days: u32,
}

/// Emby (or Jellyfin) server refreshed after a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbyConfig {
    pub url: String,
    pub api_key: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/freestrm/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("freestrm")
            .join("config.yaml")
    }

    pub fn account(&self, name: &str) -> Option<&AccountCredential> {
        self.accounts.iter().find(|a| a.name == name)
    }

    pub fn task(&self, id: &str) -> Option<&SyncTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Local folder a task mirrors into.
    pub fn task_root(&self, task: &SyncTask) -> PathBuf {
        self.data_root.join(task.target_path.trim_matches('/'))
    }

    /// `task` with empty fields filled from the `sync` section.
    pub fn effective_task(&self, task: &SyncTask) -> SyncTask {
        task.clone().with_defaults(
            &self.sync.strm_extensions,
            &self.sync.download_extensions,
            &self.sync.strm_prefix,
        )
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("freestrm")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: data_dir().join("data"),
            drive: DriveConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            sync: SyncConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
            history: HistoryConfig::default(),
            emby: None,
            accounts: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
                         AppleWebKit/605.1.15 (KHTML, like Gecko) Mobile/15E148 \
                         115wangpan_ios/36.2.20"
                .to_string(),
            webapi_base_url: "https://webapi.115.com".to_string(),
            proapi_base_url: "https://proapi.115.com".to_string(),
            export_timeout_secs: 300,
            export_poll_interval_ms: 1000,
            list_page_size: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            listing: OperationLimits::default(),
            link: OperationLimits::default(),
            download: OperationLimits {
                max_retries: 10,
                ..OperationLimits::default()
            },
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        let strm = [".mkv", ".mp4", ".avi", ".ts", ".iso", ".rmvb", ".mov", ".m2ts", ".flac", ".mp3"];
        let download = [".srt", ".ass", ".ssa", ".sub", ".nfo", ".jpg", ".png"];
        Self {
            strm_extensions: strm.iter().map(|s| s.to_string()).collect(),
            download_extensions: download.iter().map(|s| s.to_string()).collect(),
            strm_prefix: String::new(),
            max_in_flight: 10,
            log_buffer: 20_000,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir_id_ttl_secs: 600,
            listing_ttl_secs: 300,
            pickcode_ttl_secs: 1800,
            max_entries: 10_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            file: data_dir().join("task-history.json"),
            max_records: 1000,
            max_logs_per_record: 5000,
            retained_logs: 3000,
            retention_days: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.max_in_flight"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

fn check_limits(errors: &mut Vec<ValidationError>, section: &str, limits: &OperationLimits) {
    positive(errors, &format!("rate_limiting.{section}.per_second"), limits.per_second.into());
    positive(errors, &format!("rate_limiting.{section}.concurrent"), limits.concurrent.into());
}

fn check_extensions(errors: &mut Vec<ValidationError>, field: &str, list: &[String]) {
    for ext in list {
        if let Err(e) = normalize_extension(ext) {
            errors.push(ValidationError {
                field: field.into(),
                message: e.to_string(),
            });
        }
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- drive ---
        positive(&mut errors, "drive.export_timeout_secs", self.drive.export_timeout_secs);
        positive(&mut errors, "drive.export_poll_interval_ms", self.drive.export_poll_interval_ms);
        positive(&mut errors, "drive.list_page_size", self.drive.list_page_size.into());
        positive(&mut errors, "drive.request_timeout_secs", self.drive.request_timeout_secs);
        if self.drive.user_agent.trim().is_empty() {
            errors.push(ValidationError {
                field: "drive.user_agent".into(),
                message: "must not be empty".into(),
            });
        }

        // --- rate_limiting ---
        check_limits(&mut errors, "listing", &self.rate_limiting.listing);
        check_limits(&mut errors, "link", &self.rate_limiting.link);
        check_limits(&mut errors, "download", &self.rate_limiting.download);

        // --- sync ---
        positive(&mut errors, "sync.max_in_flight", self.sync.max_in_flight as u64);
        positive(&mut errors, "sync.log_buffer", self.sync.log_buffer as u64);
        check_extensions(&mut errors, "sync.strm_extensions", &self.sync.strm_extensions);
        check_extensions(&mut errors, "sync.download_extensions", &self.sync.download_extensions);

        // --- cache ---
        positive(&mut errors, "cache.dir_id_ttl_secs", self.cache.dir_id_ttl_secs);
        positive(&mut errors, "cache.listing_ttl_secs", self.cache.listing_ttl_secs);
        positive(&mut errors, "cache.pickcode_ttl_secs", self.cache.pickcode_ttl_secs);

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        // --- history ---
        positive(&mut errors, "history.max_records", self.history.max_records as u64);
        if self.history.retained_logs == 0
            || self.history.retained_logs > self.history.max_logs_per_record
        {
            errors.push(ValidationError {
                field: "history.retained_logs".into(),
                message: format!(
                    "must be in range 1..={}",
                    self.history.max_logs_per_record
                ),
            });
        }

        // --- emby ---
        if let Some(emby) = &self.emby {
            if url::Url::parse(&emby.url).is_err() {
                errors.push(ValidationError {
                    field: "emby.url".into(),
                    message: format!("not a valid URL: {}", emby.url),
                });
            }
        }

        // --- accounts ---
        let mut names = HashSet::new();
        for account in &self.accounts {
            if !names.insert(account.name.as_str()) {
                errors.push(ValidationError {
                    field: "accounts".into(),
                    message: format!("duplicate account name '{}'", account.name),
                });
            }
        }

        // --- tasks ---
        let mut ids = HashSet::new();
        for task in &self.tasks {
            let field = format!("tasks.{}", task.id);
            if !ids.insert(task.id.as_str()) {
                errors.push(ValidationError {
                    field: field.clone(),
                    message: "duplicate task id".into(),
                });
            }
            if self.account(&task.account).is_none() {
                errors.push(ValidationError {
                    field: field.clone(),
                    message: format!("unknown account '{}'", task.account),
                });
            }
            if let Err(e) = task.validate() {
                errors.push(ValidationError {
                    field,
                    message: e.to_string(),
                });
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use freestrm_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .data_root(PathBuf::from("/srv/media"))
///     .sync_max_in_flight(4)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn data_root(mut self, root: PathBuf) -> Self {
        self.config.data_root = root;
        self
    }

    // --- drive ---

    pub fn drive_user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.drive.user_agent = ua.into();
        self
    }

    pub fn drive_base_urls(mut self, webapi: impl Into<String>, proapi: impl Into<String>) -> Self {
        self.config.drive.webapi_base_url = webapi.into();
        self.config.drive.proapi_base_url = proapi.into();
        self
    }

    pub fn drive_export_timeout_secs(mut self, secs: u64) -> Self {
        self.config.drive.export_timeout_secs = secs;
        self
    }

    pub fn drive_export_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.drive.export_poll_interval_ms = ms;
        self
    }

    // --- rate_limiting ---

    pub fn rate_limiting_listing(mut self, limits: OperationLimits) -> Self {
        self.config.rate_limiting.listing = limits;
        self
    }

    pub fn rate_limiting_link(mut self, limits: OperationLimits) -> Self {
        self.config.rate_limiting.link = limits;
        self
    }

    pub fn rate_limiting_download(mut self, limits: OperationLimits) -> Self {
        self.config.rate_limiting.download = limits;
        self
    }

    // --- sync ---

    pub fn sync_strm_extensions(mut self, exts: Vec<String>) -> Self {
        self.config.sync.strm_extensions = exts;
        self
    }

    pub fn sync_download_extensions(mut self, exts: Vec<String>) -> Self {
        self.config.sync.download_extensions = exts;
        self
    }

    pub fn sync_strm_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.sync.strm_prefix = prefix.into();
        self
    }

    pub fn sync_max_in_flight(mut self, n: usize) -> Self {
        self.config.sync.max_in_flight = n;
        self
    }

    pub fn sync_log_buffer(mut self, n: usize) -> Self {
        self.config.sync.log_buffer = n;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_json(mut self, json: bool) -> Self {
        self.config.logging.json = json;
        self
    }

    // --- history ---

    pub fn history_file(mut self, file: PathBuf) -> Self {
        self.config.history.file = file;
        self
    }

    // --- emby ---

    pub fn emby(mut self, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.config.emby = Some(EmbyConfig {
            url: url.into(),
            api_key: api_key.into(),
        });
        self
    }

    // --- accounts / tasks ---

    pub fn account(mut self, account: AccountCredential) -> Self {
        self.config.accounts.push(account);
        self
    }

    pub fn task(mut self, task: SyncTask) -> Self {
        self.config.tasks.push(task);
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
