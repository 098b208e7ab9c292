//! HistoryRecorder - checkpoint writer for one run
//!
//! Wraps an [`ITaskHistoryStore`] and the id of the record a run writes to.
//! Creating the record is fallible so a run never starts without one; every
//! later checkpoint is non-fatal: store errors are logged via
//! `tracing::warn!` but never break the run.

use std::sync::Arc;

use freestrm_core::domain::history::{RunStatus, SummaryUpdate, TaskExecutionHistory};
use freestrm_core::domain::progress::ProgressEvent;
use freestrm_core::domain::task::SyncTask;
use freestrm_core::ports::task_history::ITaskHistoryStore;

#[derive(Clone)]
pub struct HistoryRecorder {
    store: Arc<dyn ITaskHistoryStore>,
    id: String,
}

impl std::fmt::Debug for HistoryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRecorder").field("id", &self.id).finish()
    }
}

impl HistoryRecorder {
    /// Create the running record for `task`.
    pub async fn begin(store: Arc<dyn ITaskHistoryStore>, task: &SyncTask) -> anyhow::Result<Self> {
        let record = TaskExecutionHistory::start(task);
        store.create(&record).await?;
        tracing::info!(task_id = %task.id, history_id = %record.id, "Created history record");
        Ok(Self {
            store,
            id: record.id,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append `event` to the record's log if it is a milestone.
    pub async fn milestone(&self, event: &ProgressEvent) {
        if !event.is_milestone() {
            return;
        }
        if let Err(e) = self.store.append_log(&self.id, &event.to_json()).await {
            tracing::warn!(history_id = %self.id, error = %e, "Failed to append history log");
        }
    }

    pub async fn update(&self, update: SummaryUpdate) {
        if let Err(e) = self.store.update_summary(&self.id, &update).await {
            tracing::warn!(history_id = %self.id, error = %e, "Failed to update history summary");
        }
    }

    pub async fn finish(&self, status: RunStatus, update: SummaryUpdate) {
        if let Err(e) = self.store.complete(&self.id, status, &update).await {
            tracing::warn!(history_id = %self.id, error = %e, "Failed to complete history record");
        }
    }
}
