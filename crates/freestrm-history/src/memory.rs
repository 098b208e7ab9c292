//! In-memory history store
//!
//! Used when no history file is wanted, and by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use freestrm_core::domain::history::{RunStatus, SummaryUpdate, TaskExecutionHistory};
use freestrm_core::ports::task_history::ITaskHistoryStore;
use tokio::sync::Mutex;

use crate::log::{HistoryLimits, HistoryLog};

#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    limits: HistoryLimits,
    log: Mutex<HistoryLog>,
}

impl MemoryHistoryStore {
    pub fn new(limits: HistoryLimits) -> Self {
        Self {
            limits,
            log: Mutex::new(HistoryLog::default()),
        }
    }
}

#[async_trait]
impl ITaskHistoryStore for MemoryHistoryStore {
    async fn create(&self, record: &TaskExecutionHistory) -> anyhow::Result<()> {
        self.log.lock().await.insert(record.clone(), &self.limits);
        Ok(())
    }

    async fn append_log(&self, id: &str, line: &str) -> anyhow::Result<()> {
        self.log.lock().await.append_log(id, line, &self.limits)
    }

    async fn update_summary(&self, id: &str, update: &SummaryUpdate) -> anyhow::Result<()> {
        self.log.lock().await.update_summary(id, update)
    }

    async fn complete(
        &self,
        id: &str,
        status: RunStatus,
        update: &SummaryUpdate,
    ) -> anyhow::Result<()> {
        self.log.lock().await.complete(id, status, update)
    }

    async fn get(&self, id: &str) -> anyhow::Result<Option<TaskExecutionHistory>> {
        Ok(self.log.lock().await.get(id))
    }

    async fn list(&self, task_id: Option<&str>) -> anyhow::Result<Vec<TaskExecutionHistory>> {
        Ok(self.log.lock().await.list(task_id))
    }

    async fn delete(&self, id: &str) -> anyhow::Result<bool> {
        Ok(self.log.lock().await.delete(id))
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.log.lock().await.clear();
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
        Ok(self.log.lock().await.purge_before(cutoff))
    }
}
