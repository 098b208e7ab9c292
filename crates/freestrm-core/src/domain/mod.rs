//! Domain entities
//!
//! - Accounts and the identity throughput is bounded by
//! - Sync task definitions and file classification
//! - Flat remote tree records
//! - Progress records and execution history
//! - Error taxonomy

pub mod account;
pub mod errors;
pub mod history;
pub mod progress;
pub mod task;
pub mod tree;

pub use account::{AccountCredential, BackendKind, Credential, Identity};
pub use errors::{DomainError, DriveError};
pub use history::{RunStatus, RunSummary, SummaryUpdate, TaskExecutionHistory, TaskInfo};
pub use progress::{format_percent, ProgressEvent};
pub use task::{FileAction, SyncTask, STRM_EXTENSION};
pub use tree::{TreeRecord, ROOT_KEY};
