//! Cloud drive port (driven/secondary port)
//!
//! The sync engine talks to every backend through [`ICloudDrive`]. Adapters
//! live in `freestrm-drive`; tests substitute in-memory fakes.
//!
//! ## Design Notes
//!
//! - Errors are typed with [`DriveError`] rather than `anyhow` because the
//!   engine branches on them (retry, per-file failure, account block).
//! - Downloads are exposed as a byte stream plus the declared length so the
//!   executor can report progress and write chunks as they arrive.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::domain::account::Identity;
use crate::domain::errors::DriveError;
use crate::domain::tree::TreeRecord;

/// Body of a download
pub type ByteStream = BoxStream<'static, Result<Bytes, DriveError>>;

/// An opened download
pub struct Download {
    /// Length declared by the server, if any
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    /// Backend-specific identifier (a directory or file id, or a path)
    pub id: String,
    pub is_dir: bool,
}

/// Cloud drive operations used by the sync engine
#[async_trait]
pub trait ICloudDrive: Send + Sync {
    /// Scope this drive's throughput is bounded by.
    fn identity(&self) -> Identity;

    /// Full tree under `origin_path` as pre-order flat records.
    ///
    /// The origin folder itself is the single top-level record (parent key 0);
    /// everything below it hangs off that record.
    async fn fetch_tree(&self, origin_path: &str) -> Result<Vec<TreeRecord>, DriveError>;

    /// Direct children of `path`.
    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, DriveError>;

    /// Short-lived URL the file at `remote_path` can be fetched from.
    async fn resolve_download_url(&self, remote_path: &str) -> Result<String, DriveError>;

    /// Start fetching `url`.
    async fn open_download(&self, url: &str) -> Result<Download, DriveError>;
}
