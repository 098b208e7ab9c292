//! FreeStrm Sync - strm mirroring engine
//!
//! Provides:
//! - Planning a run from a remote tree and a local scan
//! - Writing `.strm` reference files and downloading literal copies
//! - Live progress with replay for late subscribers
//! - Exclusive run bookkeeping and cooperative cancellation
//!
//! ## Modules
//!
//! - [`planner`] - remote tree classification and the missing/extra diff
//! - [`filesystem`] - task root scanning, writes and pruning
//! - [`progress`] - progress bus with a bounded replay log
//! - [`registry`] - active runs, exclusivity and cancellation
//! - [`executor`] - per-file work of one run
//! - [`engine`] - run setup, remote browsing and maintenance
//! - [`notify`] - media server library refresh

pub mod engine;
pub mod executor;
pub mod filesystem;
pub mod notify;
pub mod planner;
pub mod progress;
pub mod registry;

use thiserror::Error;

use freestrm_core::domain::errors::{DomainError, DriveError};

/// Errors that can occur while setting up or managing a run
#[derive(Debug, Error)]
pub enum SyncError {
    /// No task with this id is configured
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// No account with this name is configured
    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    /// The task already has an active run
    #[error("Task {0} is already running")]
    AlreadyRunning(String),

    /// Another task is running against the same account
    #[error("Account {account} is busy with task {task}")]
    AccountBusy {
        /// Account both tasks use
        account: String,
        /// Task currently running
        task: String,
    },

    /// A remote operation failed
    #[error(transparent)]
    Drive(#[from] DriveError),

    /// The task definition is invalid
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// An I/O error occurred under the task root
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The history store rejected a write
    #[error("History error: {0}")]
    History(String),

    /// The run's task panicked or was aborted
    #[error("Run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Text for users, with guidance for blocked accounts.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Drive(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
