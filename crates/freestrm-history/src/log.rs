//! In-memory history collection with retention rules
//!
//! Records are kept in insertion order (oldest first). Inserting past
//! `max_records` drops the oldest records; appending to a record whose log
//! exceeds `max_logs_per_record` keeps only its newest `retained_logs` lines.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use freestrm_core::config::HistoryConfig;
use freestrm_core::domain::history::{RunStatus, SummaryUpdate, TaskExecutionHistory};
use serde::{Deserialize, Serialize};

/// Retention bounds of a history collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub max_records: usize,
    pub max_logs_per_record: usize,
    pub retained_logs: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self::from(&HistoryConfig::default())
    }
}

impl From<&HistoryConfig> for HistoryLimits {
    fn from(config: &HistoryConfig) -> Self {
        Self {
            max_records: config.max_records.max(1),
            max_logs_per_record: config.max_logs_per_record.max(1),
            retained_logs: config.retained_logs.min(config.max_logs_per_record),
        }
    }
}

/// Ordered set of history records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    records: Vec<TaskExecutionHistory>,
}

impl HistoryLog {
    pub fn from_records(records: Vec<TaskExecutionHistory>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TaskExecutionHistory] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut TaskExecutionHistory> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow!("history record not found: {id}"))
    }

    pub fn insert(&mut self, record: TaskExecutionHistory, limits: &HistoryLimits) {
        self.records.retain(|r| r.id != record.id);
        self.records.push(record);
        if self.records.len() > limits.max_records {
            let excess = self.records.len() - limits.max_records;
            self.records.drain(..excess);
        }
    }

    pub fn append_log(&mut self, id: &str, line: &str, limits: &HistoryLimits) -> Result<()> {
        let record = self.find_mut(id)?;
        record.logs.push(line.to_string());
        if record.logs.len() > limits.max_logs_per_record {
            let excess = record.logs.len() - limits.retained_logs;
            record.logs.drain(..excess);
        }
        Ok(())
    }

    pub fn update_summary(&mut self, id: &str, update: &SummaryUpdate) -> Result<()> {
        self.find_mut(id)?.summary.apply(update);
        Ok(())
    }

    pub fn complete(&mut self, id: &str, status: RunStatus, update: &SummaryUpdate) -> Result<()> {
        let record = self.find_mut(id)?;
        record.summary.apply(update);
        record.status = status;
        record.end_time = Some(Utc::now());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<TaskExecutionHistory> {
        self.records.iter().find(|r| r.id == id).cloned()
    }

    /// Newest first, optionally for one task.
    pub fn list(&self, task_id: Option<&str>) -> Vec<TaskExecutionHistory> {
        let mut out: Vec<TaskExecutionHistory> = self
            .records
            .iter()
            .filter(|r| task_id.map_or(true, |t| r.task_id == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        out
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        self.records.len() != before
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn purge_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.start_time >= cutoff);
        before - self.records.len()
    }
}
