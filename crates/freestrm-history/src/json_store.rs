//! History store persisted to a JSON file
//!
//! The whole collection is held in memory and written back after every
//! mutation, via a temporary file and a rename so a crash never leaves a
//! half-written history behind. A missing file is an empty history; an
//! unreadable one is set aside as `<file>.corrupt` and replaced.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use freestrm_core::domain::history::{RunStatus, SummaryUpdate, TaskExecutionHistory};
use freestrm_core::ports::task_history::ITaskHistoryStore;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::log::{HistoryLimits, HistoryLog};

#[derive(Debug)]
pub struct JsonHistoryStore {
    path: PathBuf,
    limits: HistoryLimits,
    log: Mutex<HistoryLog>,
}

impl JsonHistoryStore {
    /// Open the history at `path`, loading existing records.
    pub async fn open(path: impl Into<PathBuf>, limits: HistoryLimits) -> Result<Self> {
        let path = path.into();
        let log = load(&path).await?;
        debug!(path = %path.display(), records = log.len(), "Opened history file");
        Ok(Self {
            path,
            limits,
            log: Mutex::new(log),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, log: &HistoryLog) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(log)?;
        let tmp_path = {
            let mut p = self.path.as_os_str().to_owned();
            p.push(".tmp");
            PathBuf::from(p)
        };
        tokio::fs::write(&tmp_path, json)
            .await
            .with_context(|| format!("writing {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("renaming {} into place", tmp_path.display()))?;
        Ok(())
    }
}

async fn load(path: &Path) -> Result<HistoryLog> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HistoryLog::default()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    match serde_json::from_slice::<HistoryLog>(&bytes) {
        Ok(log) => Ok(log),
        Err(e) => {
            let mut aside = path.as_os_str().to_owned();
            aside.push(".corrupt");
            warn!(path = %path.display(), error = %e, "History file unreadable, starting fresh");
            tokio::fs::rename(path, PathBuf::from(aside)).await?;
            Ok(HistoryLog::default())
        }
    }
}

#[async_trait]
impl ITaskHistoryStore for JsonHistoryStore {
    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn create(&self, record: &TaskExecutionHistory) -> Result<()> {
        let mut log = self.log.lock().await;
        log.insert(record.clone(), &self.limits);
        self.persist(&log).await
    }

    async fn append_log(&self, id: &str, line: &str) -> Result<()> {
        let mut log = self.log.lock().await;
        log.append_log(id, line, &self.limits)?;
        self.persist(&log).await
    }

    async fn update_summary(&self, id: &str, update: &SummaryUpdate) -> Result<()> {
        let mut log = self.log.lock().await;
        log.update_summary(id, update)?;
        self.persist(&log).await
    }

    #[instrument(skip(self, update))]
    async fn complete(&self, id: &str, status: RunStatus, update: &SummaryUpdate) -> Result<()> {
        let mut log = self.log.lock().await;
        log.complete(id, status, update)?;
        self.persist(&log).await
    }

    async fn get(&self, id: &str) -> Result<Option<TaskExecutionHistory>> {
        Ok(self.log.lock().await.get(id))
    }

    async fn list(&self, task_id: Option<&str>) -> Result<Vec<TaskExecutionHistory>> {
        Ok(self.log.lock().await.list(task_id))
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut log = self.log.lock().await;
        let removed = log.delete(id);
        if removed {
            self.persist(&log).await?;
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        let mut log = self.log.lock().await;
        log.clear();
        self.persist(&log).await
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut log = self.log.lock().await;
        let removed = log.purge_before(cutoff);
        if removed > 0 {
            self.persist(&log).await?;
        }
        Ok(removed)
    }
}
