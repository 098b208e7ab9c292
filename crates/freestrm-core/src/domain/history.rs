//! Task execution history records
//!
//! One record per run. It is created when file work starts, receives
//! milestone log lines, and is completed with a final status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::SyncTask;

/// Lifecycle status of a recorded run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Counters kept on a history record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_files: u64,
    pub downloaded_files: u64,
    pub deleted_files: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Partial update merged into a [`RunSummary`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryUpdate {
    pub total_files: Option<u64>,
    pub downloaded_files: Option<u64>,
    pub deleted_files: Option<u64>,
    pub error_message: Option<String>,
}

impl RunSummary {
    pub fn apply(&mut self, update: &SummaryUpdate) {
        if let Some(n) = update.total_files {
            self.total_files = n;
        }
        if let Some(n) = update.downloaded_files {
            self.downloaded_files = n;
        }
        if let Some(n) = update.deleted_files {
            self.deleted_files = n;
        }
        if let Some(msg) = &update.error_message {
            self.error_message = Some(msg.clone());
        }
    }
}

/// Snapshot of the task a run executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub account: String,
    pub origin_path: String,
    pub target_path: String,
    pub remove_extra_files: bool,
}

impl From<&SyncTask> for TaskInfo {
    fn from(task: &SyncTask) -> Self {
        Self {
            account: task.account.clone(),
            origin_path: task.origin_path.clone(),
            target_path: task.target_path.clone(),
            remove_extra_files: task.remove_extra_files,
        }
    }
}

/// Persisted summary of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskExecutionHistory {
    pub id: String,
    pub task_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default)]
    pub logs: Vec<String>,
    pub summary: RunSummary,
    pub task_info: TaskInfo,
}

impl TaskExecutionHistory {
    /// New running record for `task`.
    pub fn start(task: &SyncTask) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{}_{}", task.id, uuid::Uuid::new_v4().simple()),
            task_id: task.id.clone(),
            start_time: now,
            end_time: None,
            status: RunStatus::Running,
            logs: Vec::new(),
            summary: RunSummary::default(),
            task_info: TaskInfo::from(task),
        }
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}
