//! 115 drive HTTP client
//!
//! Wraps `reqwest::Client` with the cookie and User-Agent headers the 115 web
//! API expects, decodes its JSON envelopes, and exposes the operations the
//! sync engine needs: directory id lookup, paged listings, pickcode and
//! download URL resolution, and the directory export job.
//!
//! Every request runs through the shared [`RateLimitedQueue`]; lookups that
//! rarely change are served from [`DriveCaches`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use freestrm_core::config::{DriveConfig, RateLimitingConfig};
//! use freestrm_core::domain::AccountCredential;
//! use freestrm_drive::cache::DriveCaches;
//! use freestrm_drive::client::Pan115Client;
//! use freestrm_drive::rate_limit::RateLimitedQueue;
//!
//! # async fn example() -> Result<(), freestrm_core::domain::DriveError> {
//! let account = AccountCredential::pan115("main", "UID=...; CID=...; SEID=...");
//! let queue = Arc::new(RateLimitedQueue::new(RateLimitingConfig::default()));
//! let client = Pan115Client::new(&account, DriveConfig::default(), DriveCaches::default(), queue)?;
//! let url = client.resolve_path_download_url("/media/tv/ep1.mkv").await?;
//! println!("{url}");
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use freestrm_core::config::DriveConfig;
use freestrm_core::domain::account::{AccountCredential, Credential, Identity};
use freestrm_core::domain::errors::DriveError;
use freestrm_core::domain::tree::TreeRecord;
use freestrm_core::ports::cloud_drive::Download;
use futures_util::TryStreamExt;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::cache::{scoped_key, DriveCaches};
use crate::crypto::CryptoCodec;
use crate::rate_limit::{OperationKind, RateLimitedQueue};
use crate::tree::{decode_export, records_from_export};

/// Export target every client uses.
const EXPORT_TARGET: &str = "U_1_0";

/// Markers of the page served instead of JSON when an account is blocked.
const BLOCK_MARKERS: &[&str] = &[
    "<!doctypehtml>",
    "<!doctype html>",
    "您的访问被阻断",
    "potential threats to the server",
];

// ============================================================================
// Response types
// ============================================================================

/// One item of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    /// Set for files
    pub file_id: Option<String>,
    /// A folder's own id, or a file's parent folder id
    pub dir_id: Option<String>,
    pub pickcode: Option<String>,
    /// Inferred from the absence of a content hash.
    ///
    /// Zero-byte files can come back without one and then read as folders.
    pub is_dir: bool,
}

/// One page of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<FileEntry>,
    /// Total entries in the directory, across pages
    pub count: u64,
}

/// Where a finished export left its artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    pub export_id: String,
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub pickcode: String,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    n: String,
    #[serde(default)]
    fid: Option<Value>,
    #[serde(default)]
    cid: Option<Value>,
    #[serde(default)]
    pc: Option<String>,
    #[serde(default)]
    sha: Option<String>,
}

impl From<RawEntry> for FileEntry {
    fn from(raw: RawEntry) -> Self {
        let is_dir = raw.sha.as_deref().map_or(true, str::is_empty);
        FileEntry {
            name: raw.n,
            file_id: raw.fid.as_ref().and_then(id_string),
            dir_id: raw.cid.as_ref().and_then(id_string),
            pickcode: raw.pc.filter(|p| !p.is_empty()),
            is_dir,
        }
    }
}

/// Ids arrive as strings or numbers depending on the endpoint.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fail on an error envelope: non-zero `errno` or `state: false`.
pub fn ensure_ok(body: &Value) -> Result<(), DriveError> {
    let errno_set = match body.get("errno") {
        Some(Value::Number(n)) => n.as_i64() != Some(0),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        _ => false,
    };
    let state_false = body.get("state") == Some(&Value::Bool(false));
    if errno_set || state_false {
        let message = ["error", "msg", "message"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());
        return Err(DriveError::Protocol(message));
    }
    Ok(())
}

/// Detect the block page the API serves to flagged accounts.
pub fn detect_block(status: StatusCode, body: &str) -> Option<DriveError> {
    if status == StatusCode::METHOD_NOT_ALLOWED {
        return Some(DriveError::AccountBlocked("HTTP 405".into()));
    }
    let lowered = body.to_lowercase();
    BLOCK_MARKERS
        .iter()
        .find(|m| lowered.contains(*m))
        .map(|m| DriveError::AccountBlocked(format!("response contained '{m}'")))
}

/// Find the download URL in a decrypted payload.
///
/// Seen shapes: `{"url": "..."}`, `{"url": {"url": "..."}}`, and both nested
/// one level under a file id key.
fn extract_url(value: &Value) -> Option<String> {
    match value.get("url") {
        Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
        Some(Value::Object(inner)) => {
            if let Some(Value::String(s)) = inner.get("url") {
                return Some(s.clone());
            }
        }
        _ => {}
    }
    value
        .as_object()?
        .values()
        .filter(|v| v.is_object())
        .find_map(|v| match v.get("url") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(inner)) => inner.get("url").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
}

pub(crate) fn network_error(err: reqwest::Error) -> DriveError {
    if err.is_timeout() {
        DriveError::Timeout(err.to_string())
    } else {
        DriveError::Network(err.to_string())
    }
}

// ============================================================================
// Pan115Client
// ============================================================================

/// HTTP client for one 115 account
pub struct Pan115Client {
    http: Client,
    cookie: String,
    identity: Identity,
    fingerprint: String,
    config: DriveConfig,
    codec: CryptoCodec,
    caches: DriveCaches,
    queue: Arc<RateLimitedQueue>,
}

impl std::fmt::Debug for Pan115Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pan115Client")
            .field("identity", &self.identity)
            .field("webapi", &self.config.webapi_base_url)
            .field("proapi", &self.config.proapi_base_url)
            .finish()
    }
}

impl Pan115Client {
    /// Build a client for a cookie-authenticated account.
    ///
    /// Base URLs come from `config`, so tests can point them at a mock server.
    pub fn new(
        account: &AccountCredential,
        config: DriveConfig,
        caches: DriveCaches,
        queue: Arc<RateLimitedQueue>,
    ) -> Result<Self, DriveError> {
        let Credential::Pan115 { cookie } = &account.credential else {
            return Err(DriveError::Protocol(format!(
                "account '{}' is not a 115 account",
                account.name
            )));
        };
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(network_error)?;
        Ok(Self {
            http,
            cookie: cookie.clone(),
            identity: account.identity(),
            fingerprint: account.fingerprint(),
            config,
            codec: CryptoCodec::default(),
            caches,
            queue,
        })
    }

    /// Replace the payload codec.
    pub fn with_codec(mut self, codec: CryptoCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn caches(&self) -> &DriveCaches {
        &self.caches
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(header::USER_AGENT, &self.config.user_agent)
            .header(header::ACCEPT, "application/json, text/plain, */*")
            .header(header::REFERER, "https://115.com/")
            .header(header::ORIGIN, "https://115.com")
            .header(header::COOKIE, &self.cookie)
    }

    fn webapi(&self, path: &str) -> String {
        format!("{}{}", self.config.webapi_base_url.trim_end_matches('/'), path)
    }

    fn proapi(&self, path: &str) -> String {
        format!("{}{}", self.config.proapi_base_url.trim_end_matches('/'), path)
    }

    /// Send and decode a JSON envelope, classifying failures.
    async fn send_json(&self, builder: RequestBuilder) -> Result<Value, DriveError> {
        let response = self.request(builder).send().await.map_err(network_error)?;
        let status = response.status();
        let body = response.text().await.map_err(network_error)?;

        if let Some(blocked) = detect_block(status, &body) {
            warn!(identity = %self.identity, "115 served a block page");
            return Err(blocked);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(DriveError::Protocol(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(DriveError::Protocol(format!("HTTP {status}: {body}")));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| DriveError::Decode(format!("invalid JSON response: {e}")))?;
        ensure_ok(&value)?;
        Ok(value)
    }

    async fn get_json(&self, url: String, query: Vec<(&'static str, String)>) -> Result<Value, DriveError> {
        self.send_json(self.http.get(url).query(&query)).await
    }

    async fn post_form(&self, url: String, form: Vec<(String, String)>) -> Result<Value, DriveError> {
        self.send_json(self.http.post(url).form(&form)).await
    }

    // ========================================================================
    // Directory ids and listings
    // ========================================================================

    /// Id of the directory at `path`. The drive root is `"0"`.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn resolve_directory_id(&self, path: &str) -> Result<String, DriveError> {
        let path = normalize_path(path);
        if path == "/" {
            return Ok("0".to_string());
        }
        let key = scoped_key("dir_id", &path, &self.fingerprint);
        if let Some(id) = self.caches.dir_ids.get(&key) {
            debug!(path = %path, id = %id, "Directory id cache hit");
            return Ok(id);
        }

        let url = self.webapi("/files/getid");
        let body = self
            .queue
            .schedule(&self.identity, OperationKind::Listing, || {
                self.get_json(url.clone(), vec![("path", path.clone())])
            })
            .await?;

        let id = body
            .get("id")
            .and_then(id_string)
            .filter(|id| id != "0")
            .ok_or_else(|| DriveError::NotFound(format!("directory {path}")))?;
        self.caches.dir_ids.insert(key, id.clone());
        Ok(id)
    }

    /// One page of the directory `dir_id`.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn list_directory(
        &self,
        dir_id: &str,
        limit: u32,
        offset: u64,
    ) -> Result<Arc<ListPage>, DriveError> {
        let key = scoped_key("list", &format!("{dir_id}:{limit}:{offset}"), &self.fingerprint);
        if let Some(page) = self.caches.listings.get(&key) {
            return Ok(page);
        }

        let url = self.webapi("/files");
        let query = vec![
            ("cid", dir_id.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("show_dir", "1".to_string()),
        ];
        let body = self
            .queue
            .schedule(&self.identity, OperationKind::Listing, || {
                self.get_json(url.clone(), query.clone())
            })
            .await?;

        let entries: Vec<RawEntry> = match body.get("data") {
            Some(data @ Value::Array(_)) => serde_json::from_value(data.clone())
                .map_err(|e| DriveError::Decode(format!("invalid listing: {e}")))?,
            _ => Vec::new(),
        };
        let count = body.get("count").and_then(Value::as_u64).unwrap_or(entries.len() as u64);
        let page = Arc::new(ListPage {
            entries: entries.into_iter().map(FileEntry::from).collect(),
            count,
        });
        debug!(dir_id, entries = page.entries.len(), count, "Listed directory page");
        self.caches.listings.insert(key, page.clone());
        Ok(page)
    }

    /// Every entry of the directory `dir_id`, following pages.
    pub async fn list_all(&self, dir_id: &str) -> Result<Vec<FileEntry>, DriveError> {
        let limit = self.config.list_page_size.max(1);
        let mut offset = 0u64;
        let mut entries = Vec::new();
        loop {
            let page = self.list_directory(dir_id, limit, offset).await?;
            let received = page.entries.len() as u64;
            entries.extend(page.entries.iter().cloned());
            offset += received;
            if received == 0 || offset >= page.count {
                break;
            }
        }
        Ok(entries)
    }

    /// Sub-directories of `path`.
    pub async fn list_subdirectories(&self, path: &str) -> Result<Vec<FileEntry>, DriveError> {
        let dir_id = self.resolve_directory_id(path).await?;
        Ok(self
            .list_all(&dir_id)
            .await?
            .into_iter()
            .filter(|e| e.is_dir)
            .collect())
    }

    // ========================================================================
    // Pickcodes and download URLs
    // ========================================================================

    /// Pickcode of the file `file_id`.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn resolve_pickcode(&self, file_id: &str) -> Result<String, DriveError> {
        let key = scoped_key("pickcode", file_id, &self.fingerprint);
        if let Some(pc) = self.caches.pickcodes.get(&key) {
            return Ok(pc);
        }

        let url = self.webapi("/files/file");
        let body = self
            .queue
            .schedule(&self.identity, OperationKind::Link, || {
                self.get_json(url.clone(), vec![("file_id", file_id.to_string())])
            })
            .await?;

        let pickcode = body
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|d| d.get("pick_code"))
            .and_then(Value::as_str)
            .filter(|pc| !pc.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DriveError::NotFound(format!("pickcode for file {file_id}")))?;
        self.caches.pickcodes.insert(key, pickcode.clone());
        Ok(pickcode)
    }

    /// Short-lived URL for `pickcode`. Never cached.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn resolve_download_url(&self, pickcode: &str) -> Result<String, DriveError> {
        let url = self.proapi("/android/2.0/ufile/download");
        let payload = serde_json::json!({ "pick_code": pickcode }).to_string();

        let body = self
            .queue
            .schedule(&self.identity, OperationKind::Link, || {
                let form = vec![("data".to_string(), self.codec.encrypt(&payload))];
                self.post_form(url.clone(), form)
            })
            .await?;

        let encrypted = body
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| DriveError::Decode("download response has no data field".into()))?;
        let decrypted = self.codec.decrypt(encrypted)?;
        let value: Value = serde_json::from_str(&decrypted)
            .map_err(|e| DriveError::Decode(format!("decrypted payload is not JSON: {e}")))?;
        extract_url(&value).ok_or_else(|| DriveError::NotFound(format!("download URL for {pickcode}")))
    }

    /// File entry named `name` in the directory `dir_id`.
    pub async fn find_entry(&self, dir_id: &str, name: &str) -> Result<FileEntry, DriveError> {
        let limit = self.config.list_page_size.max(1);
        let mut offset = 0u64;
        loop {
            let page = self.list_directory(dir_id, limit, offset).await?;
            if let Some(entry) = page.entries.iter().find(|e| e.name == name && !e.is_dir) {
                return Ok(entry.clone());
            }
            let received = page.entries.len() as u64;
            offset += received;
            if received == 0 || offset >= page.count {
                return Err(DriveError::NotFound(format!("{name} in directory {dir_id}")));
            }
        }
    }

    /// Remote path -> parent id -> listing -> pickcode -> URL.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn resolve_path_download_url(&self, path: &str) -> Result<String, DriveError> {
        let path = normalize_path(path);
        let (parent, name) = path
            .rsplit_once('/')
            .filter(|(_, name)| !name.is_empty())
            .ok_or_else(|| DriveError::NotFound(format!("file {path}")))?;
        let parent = if parent.is_empty() { "/" } else { parent };

        let dir_id = self.resolve_directory_id(parent).await?;
        let entry = self.find_entry(&dir_id, name).await?;
        let pickcode = match entry.pickcode {
            Some(pc) => pc,
            None => {
                let file_id = entry
                    .file_id
                    .ok_or_else(|| DriveError::NotFound(format!("file id of {path}")))?;
                self.resolve_pickcode(&file_id).await?
            }
        };
        self.resolve_download_url(&pickcode).await
    }

    // ========================================================================
    // Export jobs
    // ========================================================================

    /// Start exporting the tree under `dir_id`. Returns the export id.
    pub async fn submit_export(
        &self,
        dir_id: &str,
        layer_limit: Option<u32>,
    ) -> Result<String, DriveError> {
        let url = self.proapi("/android/2.0/ufile/export_dir");
        let mut form = vec![
            ("file_ids".to_string(), dir_id.to_string()),
            ("target".to_string(), EXPORT_TARGET.to_string()),
        ];
        if let Some(limit) = layer_limit.filter(|l| *l > 0) {
            form.push(("layer_limit".to_string(), limit.to_string()));
        }

        let body = self
            .queue
            .schedule(&self.identity, OperationKind::Listing, || {
                self.post_form(url.clone(), form.clone())
            })
            .await?;

        let export_id = body
            .get("data")
            .and_then(|d| d.get("export_id"))
            .and_then(id_string)
            .ok_or_else(|| DriveError::Protocol("export job returned no export_id".into()))?;
        info!(identity = %self.identity, dir_id, export_id = %export_id, "Submitted directory export");
        Ok(export_id)
    }

    /// Poll until the export is ready or `timeout` passes.
    pub async fn poll_export(
        &self,
        export_id: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<ExportResult, DriveError> {
        let url = self.webapi("/files/export_dir");
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let body = self
                .queue
                .schedule(&self.identity, OperationKind::Listing, || {
                    self.get_json(url.clone(), vec![("export_id", export_id.to_string())])
                })
                .await?;

            if let Some(result) = export_ready(&body) {
                debug!(export_id, pickcode = %result.pickcode, "Export finished");
                return Ok(result);
            }
            if tokio::time::Instant::now() + interval > deadline {
                return Err(DriveError::Timeout(format!(
                    "export {export_id} not ready after {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Move the export artifact to the recycle bin.
    pub async fn delete_export(&self, file_id: &str) -> Result<(), DriveError> {
        let url = self.webapi("/rb/delete");
        self.queue
            .schedule(&self.identity, OperationKind::Listing, || {
                self.post_form(url.clone(), vec![("fid[0]".to_string(), file_id.to_string())])
            })
            .await?;
        Ok(())
    }

    /// Export the tree under `dir_id` and parse it into records.
    ///
    /// The artifact is deleted afterwards whether or not parsing succeeded;
    /// failures to delete are logged and swallowed.
    #[instrument(skip(self), fields(identity = %self.identity))]
    pub async fn fetch_export_tree(&self, dir_id: &str) -> Result<Vec<TreeRecord>, DriveError> {
        let export_id = self.submit_export(dir_id, None).await?;
        let result = self
            .poll_export(
                &export_id,
                Duration::from_secs(self.config.export_timeout_secs),
                Duration::from_millis(self.config.export_poll_interval_ms),
            )
            .await?;

        let records = self.consume_export(&result).await;

        match result.file_id.as_deref() {
            Some(file_id) => {
                if let Err(e) = self.delete_export(file_id).await {
                    warn!(file_id, error = %e, "Failed to delete export artifact");
                }
            }
            None => warn!(export_id = %result.export_id, "Export result has no file id to delete"),
        }
        records
    }

    async fn consume_export(&self, result: &ExportResult) -> Result<Vec<TreeRecord>, DriveError> {
        let url = self.resolve_download_url(&result.pickcode).await?;
        let url = url.as_str();
        let bytes = self
            .queue
            .schedule(&self.identity, OperationKind::Download, move || async move {
                let response = self
                    .http
                    .get(url)
                    .header(header::USER_AGENT, &self.config.user_agent)
                    .header(header::COOKIE, &self.cookie)
                    .send()
                    .await
                    .map_err(network_error)?;
                if !response.status().is_success() {
                    return Err(DriveError::Transfer(format!(
                        "export download returned HTTP {}",
                        response.status()
                    )));
                }
                response.bytes().await.map_err(network_error)
            })
            .await?;

        let text = decode_export(&bytes);
        let records = records_from_export(&text);
        info!(records = records.len(), bytes = bytes.len(), "Parsed export listing");
        Ok(records)
    }

    // ========================================================================
    // Downloads
    // ========================================================================

    /// Open a download of `url` as a byte stream.
    pub async fn open_download(&self, url: &str) -> Result<Download, DriveError> {
        let response = self
            .http
            .get(url)
            .header(header::USER_AGENT, &self.config.user_agent)
            .header(header::COOKIE, &self.cookie)
            .send()
            .await
            .map_err(network_error)?;
        open_stream(response)
    }
}

/// Turn a response into a [`Download`], mapping HTTP failures.
pub(crate) fn open_stream(response: reqwest::Response) -> Result<Download, DriveError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(DriveError::NotFound(format!("download {}", response.url())));
    }
    if !status.is_success() {
        return Err(DriveError::Transfer(format!("download returned HTTP {status}")));
    }
    let content_length = response.content_length();
    let body = response
        .bytes_stream()
        .map_err(|e| DriveError::Transfer(e.to_string()));
    Ok(Download {
        content_length,
        body: Box::pin(body),
    })
}

fn export_ready(body: &Value) -> Option<ExportResult> {
    let data = body.get("data")?;
    let export_id = data.get("export_id").and_then(id_string)?;
    let pickcode = data
        .get("pick_code")
        .and_then(Value::as_str)
        .filter(|pc| !pc.is_empty())?
        .to_string();
    Some(ExportResult {
        export_id,
        file_id: data.get("file_id").and_then(id_string),
        file_name: data.get("file_name").and_then(Value::as_str).map(str::to_string),
        pickcode,
    })
}

/// Collapse duplicate slashes and drop a trailing one; always absolute.
pub fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_ok() {
        assert!(ensure_ok(&serde_json::json!({"state": true, "errno": 0})).is_ok());
        assert!(ensure_ok(&serde_json::json!({"id": 1})).is_ok());

        let err = ensure_ok(&serde_json::json!({"state": false, "error": "目录不存在"})).unwrap_err();
        assert_eq!(err, DriveError::Protocol("目录不存在".into()));

        let err = ensure_ok(&serde_json::json!({"errno": 990, "msg": "busy"})).unwrap_err();
        assert_eq!(err, DriveError::Protocol("busy".into()));
    }

    #[test]
    fn test_detect_block() {
        assert!(detect_block(StatusCode::METHOD_NOT_ALLOWED, "").is_some());
        assert!(detect_block(StatusCode::OK, "<!DOCTYPE html><p>您的访问被阻断</p>").is_some());
        assert!(detect_block(StatusCode::OK, "...potential threats to the server...").is_some());
        assert!(detect_block(StatusCode::OK, r#"{"state":true}"#).is_none());
    }

    #[test]
    fn test_raw_entry_folder_heuristic() {
        let file: RawEntry = serde_json::from_value(serde_json::json!({
            "n": "ep1.mkv", "fid": "100", "cid": 7, "pc": "pc1", "sha": "ABC"
        }))
        .unwrap();
        let entry = FileEntry::from(file);
        assert!(!entry.is_dir);
        assert_eq!(entry.file_id.as_deref(), Some("100"));
        assert_eq!(entry.dir_id.as_deref(), Some("7"));

        let folder: RawEntry =
            serde_json::from_value(serde_json::json!({"n": "tv", "cid": "7"})).unwrap();
        assert!(FileEntry::from(folder).is_dir);
    }

    #[test]
    fn test_extract_url_shapes() {
        let flat = serde_json::json!({"url": "https://a/1"});
        assert_eq!(extract_url(&flat).as_deref(), Some("https://a/1"));

        let nested = serde_json::json!({"url": {"url": "https://a/2"}});
        assert_eq!(extract_url(&nested).as_deref(), Some("https://a/2"));

        let keyed = serde_json::json!({"12345": {"file_name": "x", "url": {"url": "https://a/3"}}});
        assert_eq!(extract_url(&keyed).as_deref(), Some("https://a/3"));

        assert_eq!(extract_url(&serde_json::json!({"state": true})), None);
    }

    #[test]
    fn test_export_ready_requires_pickcode() {
        let pending = serde_json::json!({"state": true, "data": {"export_id": "e1"}});
        assert!(export_ready(&pending).is_none());

        let done = serde_json::json!({"state": true, "data": {
            "export_id": "e1", "file_id": 555, "file_name": "tree.txt", "pick_code": "pcx"
        }});
        let result = export_ready(&done).unwrap();
        assert_eq!(result.file_id.as_deref(), Some("555"));
        assert_eq!(result.pickcode, "pcx");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("media//tv/"), "/media/tv");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
    }
}
