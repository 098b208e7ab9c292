//! Active run registry
//!
//! One entry per running task. A task can run once at a time, and an account
//! serves one run at a time, so two tasks never compete for the same
//! account's rate budget. Entries are reserved before setup starts and
//! removed on any terminal outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use freestrm_core::domain::progress::ProgressEvent;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::progress::ProgressBus;
use crate::SyncError;

/// Shared state of one active run
#[derive(Debug)]
pub struct ActiveRun {
    pub run_id: String,
    pub task_id: String,
    pub account: String,
    pub started_at: DateTime<Utc>,
    pub bus: Arc<ProgressBus>,
    pub cancel: CancellationToken,
}

impl ActiveRun {
    pub fn new(task_id: &str, account: &str, log_buffer: usize) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            account: account.to_string(),
            started_at: Utc::now(),
            bus: Arc::new(ProgressBus::new(log_buffer)),
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, Arc<ActiveRun>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<ActiveRun>>> {
        self.runs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `run`, unless its task or its account is already busy.
    pub fn reserve(&self, run: ActiveRun) -> Result<Arc<ActiveRun>, SyncError> {
        let mut runs = self.lock();
        if runs.contains_key(&run.task_id) {
            return Err(SyncError::AlreadyRunning(run.task_id));
        }
        if let Some(other) = runs.values().find(|r| r.account == run.account) {
            return Err(SyncError::AccountBusy {
                account: run.account,
                task: other.task_id.clone(),
            });
        }
        let run = Arc::new(run);
        runs.insert(run.task_id.clone(), run.clone());
        Ok(run)
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<ActiveRun>> {
        self.lock().get(task_id).cloned()
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.lock().contains_key(task_id)
    }

    /// Active runs, oldest first.
    pub fn list(&self) -> Vec<Arc<ActiveRun>> {
        let mut runs: Vec<_> = self.lock().values().cloned().collect();
        runs.sort_by_key(|r| r.started_at);
        runs
    }

    /// Remove the entry for `task_id` if it still belongs to `run_id`.
    pub fn remove(&self, task_id: &str, run_id: &str) -> bool {
        let mut runs = self.lock();
        match runs.get(task_id) {
            Some(run) if run.run_id == run_id => {
                runs.remove(task_id);
                true
            }
            _ => false,
        }
    }

    /// Cancel the run of `task_id`.
    ///
    /// Fires the run's token, publishes its single cancellation record and
    /// drops the entry. Returns `false` when the task is not running.
    pub fn cancel(&self, task_id: &str) -> bool {
        let Some(run) = self.lock().remove(task_id) else {
            return false;
        };
        run.cancel.cancel();
        run.bus.finish(ProgressEvent::cancelled());
        info!(task_id, run_id = %run.run_id, "Run cancelled");
        true
    }
}
