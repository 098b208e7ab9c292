//! ICloudDrive implementations for the 115 and OpenList clients
//!
//! Wraps [`Pan115Client`] and [`OpenListClient`] to fulfil the
//! [`ICloudDrive`] port contract, and [`connect`] picks the adapter for an
//! account.
//!
//! ## Design Notes
//!
//! - `fetch_tree` must return records whose single top-level node is the
//!   origin folder. An OpenList walk already has that shape; a 115 export may
//!   carry the full path from the drive root, so [`reroot`] cuts it down.
//! - Download URLs are never cached; they expire within minutes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use freestrm_core::config::Config;
use freestrm_core::domain::account::{AccountCredential, BackendKind, Identity};
use freestrm_core::domain::errors::DriveError;
use freestrm_core::domain::tree::{TreeRecord, ROOT_KEY};
use freestrm_core::ports::cloud_drive::{Download, ICloudDrive, RemoteEntry};

use crate::cache::DriveCaches;
use crate::client::{normalize_path, Pan115Client};
use crate::openlist::OpenListClient;
use crate::rate_limit::RateLimitedQueue;

// ============================================================================
// Tree re-rooting
// ============================================================================

/// Cut `records` down to the subtree of `origin_path`.
///
/// When the records spell out the whole origin path from the root, the
/// origin node becomes the single top-level node and everything outside it
/// is dropped. When the origin is the drive root, a top-level node named `/`
/// is inserted above the existing nodes. Anything else is returned unchanged.
pub fn reroot(records: Vec<TreeRecord>, origin_path: &str) -> Vec<TreeRecord> {
    let components: Vec<&str> = origin_path.split('/').filter(|p| !p.is_empty()).collect();
    if components.is_empty() {
        return wrap_root(records);
    }

    let mut parent = ROOT_KEY;
    let mut origin = None;
    for (depth, name) in components.iter().enumerate() {
        match records
            .iter()
            .find(|r| !r.is_root() && r.parent_key == parent && r.name == *name && r.depth == depth as u32)
        {
            Some(node) => {
                parent = node.key;
                origin = Some(node);
            }
            None => return records,
        }
    }
    let Some(origin) = origin else {
        return records;
    };
    if origin.depth == 0 {
        return records;
    }

    let shift = origin.depth;
    let origin_key = origin.key;
    let mut keep: HashSet<u64> = HashSet::from([origin_key]);
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        if record.is_root() {
            out.push(record);
        } else if record.key == origin_key {
            out.push(TreeRecord {
                depth: 0,
                parent_key: ROOT_KEY,
                ..record
            });
        } else if keep.contains(&record.parent_key) {
            keep.insert(record.key);
            out.push(TreeRecord {
                depth: record.depth - shift,
                ..record
            });
        }
    }
    debug!(origin = origin_path, records = out.len(), "Re-rooted tree at origin");
    out
}

fn wrap_root(records: Vec<TreeRecord>) -> Vec<TreeRecord> {
    let top_level = records
        .iter()
        .filter(|r| !r.is_root() && r.parent_key == ROOT_KEY)
        .count();
    if top_level <= 1 && records.iter().any(|r| !r.is_root() && r.name == "/") {
        return records;
    }
    let wrapper_key = records.iter().map(|r| r.key).max().unwrap_or(ROOT_KEY) + 1;
    let mut out = Vec::with_capacity(records.len() + 1);
    out.push(TreeRecord::root());
    out.push(TreeRecord {
        depth: 0,
        key: wrapper_key,
        name: "/".to_string(),
        parent_key: ROOT_KEY,
    });
    out.extend(records.into_iter().filter(|r| !r.is_root()).map(|r| TreeRecord {
        depth: r.depth + 1,
        parent_key: if r.parent_key == ROOT_KEY { wrapper_key } else { r.parent_key },
        ..r
    }));
    out
}

// ============================================================================
// 115
// ============================================================================

#[async_trait]
impl ICloudDrive for Pan115Client {
    fn identity(&self) -> Identity {
        Pan115Client::identity(self).clone()
    }

    async fn fetch_tree(&self, origin_path: &str) -> Result<Vec<TreeRecord>, DriveError> {
        let origin = normalize_path(origin_path);
        let dir_id = self.resolve_directory_id(&origin).await?;
        let records = self.fetch_export_tree(&dir_id).await?;
        Ok(reroot(records, &origin))
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, DriveError> {
        let dir_id = self.resolve_directory_id(path).await?;
        let entries = self.list_all(&dir_id).await?;
        Ok(entries
            .into_iter()
            .map(|e| RemoteEntry {
                id: if e.is_dir { e.dir_id } else { e.file_id }.unwrap_or_default(),
                name: e.name,
                is_dir: e.is_dir,
            })
            .collect())
    }

    async fn resolve_download_url(&self, remote_path: &str) -> Result<String, DriveError> {
        self.resolve_path_download_url(remote_path).await
    }

    async fn open_download(&self, url: &str) -> Result<Download, DriveError> {
        Pan115Client::open_download(self, url).await
    }
}

// ============================================================================
// OpenList
// ============================================================================

#[async_trait]
impl ICloudDrive for OpenListClient {
    fn identity(&self) -> Identity {
        OpenListClient::identity(self).clone()
    }

    async fn fetch_tree(&self, origin_path: &str) -> Result<Vec<TreeRecord>, DriveError> {
        OpenListClient::fetch_tree(self, origin_path).await
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, DriveError> {
        let base = normalize_path(path);
        let objects = self.list_objects(&base).await?;
        Ok(objects
            .into_iter()
            .map(|o| RemoteEntry {
                id: format!("{}/{}", base.trim_end_matches('/'), o.name),
                name: o.name,
                is_dir: o.is_dir,
            })
            .collect())
    }

    async fn resolve_download_url(&self, remote_path: &str) -> Result<String, DriveError> {
        self.raw_url(remote_path).await
    }

    async fn open_download(&self, url: &str) -> Result<Download, DriveError> {
        OpenListClient::open_download(self, url).await
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Build the drive adapter for `account`.
pub fn connect(
    account: &AccountCredential,
    config: &Config,
    caches: DriveCaches,
    queue: Arc<RateLimitedQueue>,
) -> Result<Arc<dyn ICloudDrive>, DriveError> {
    match account.backend() {
        BackendKind::Pan115 => Ok(Arc::new(Pan115Client::new(
            account,
            config.drive.clone(),
            caches,
            queue,
        )?)),
        BackendKind::OpenList => Ok(Arc::new(OpenListClient::new(
            account,
            Duration::from_secs(config.drive.request_timeout_secs),
            queue,
        )?)),
    }
}
