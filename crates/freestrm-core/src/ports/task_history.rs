//! Task history port
//!
//! Stores [`TaskExecutionHistory`] records. The engine touches the store only
//! at checkpoints: create when file work starts, append a log line for each
//! milestone record, update the summary, and complete with a final status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::history::{RunStatus, SummaryUpdate, TaskExecutionHistory};

#[async_trait]
pub trait ITaskHistoryStore: Send + Sync {
    /// Persist a new record.
    async fn create(&self, record: &TaskExecutionHistory) -> anyhow::Result<()>;

    /// Append one log line to a record.
    async fn append_log(&self, id: &str, line: &str) -> anyhow::Result<()>;

    /// Merge counters into a record's summary.
    async fn update_summary(&self, id: &str, update: &SummaryUpdate) -> anyhow::Result<()>;

    /// Set the final status and end time, merging the summary.
    async fn complete(
        &self,
        id: &str,
        status: RunStatus,
        update: &SummaryUpdate,
    ) -> anyhow::Result<()>;

    async fn get(&self, id: &str) -> anyhow::Result<Option<TaskExecutionHistory>>;

    /// Records newest first, optionally for one task.
    async fn list(&self, task_id: Option<&str>) -> anyhow::Result<Vec<TaskExecutionHistory>>;

    async fn delete(&self, id: &str) -> anyhow::Result<bool>;

    async fn clear(&self) -> anyhow::Result<()>;

    /// Drop records started before `cutoff`. Returns how many were removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize>;
}
