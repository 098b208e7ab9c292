//! History command - View and manage task execution history
//!
//! Provides the `freestrm history` CLI command which:
//! 1. Lists recent runs, optionally for one task
//! 2. Shows one run with its log
//! 3. Deletes one run or every run
//! 4. Purges runs older than the retention period

use anyhow::{bail, Result};
use chrono::Utc;
use clap::Subcommand;
use freestrm_core::domain::TaskExecutionHistory;
use freestrm_core::ports::task_history::ITaskHistoryStore;
use tracing::info;

use super::CliContext;
use crate::output::{get_formatter, plural};

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// List recent runs, newest first
    List {
        /// Only runs of this task
        #[arg(long)]
        task: Option<String>,
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show one run and its log
    Show {
        /// History record id
        id: String,
    },
    /// Delete one run
    Delete {
        /// History record id
        id: String,
    },
    /// Delete every run
    Clear {
        /// Confirm the removal
        #[arg(long)]
        yes: bool,
    },
    /// Delete runs older than the retention period
    Purge {
        /// Override `history.retention_days`
        #[arg(long)]
        days: Option<u32>,
    },
}

/// `"tv_3f2a…  completed  2024-05-01 10:00:00  12 files  41s"`
fn summary_line(record: &TaskExecutionHistory) -> String {
    let duration = record
        .duration()
        .map(|d| format!("{}s", d.num_seconds()))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}  {:<9}  {}  {}  {}",
        record.id,
        record.status.as_str(),
        record.start_time.format("%Y-%m-%d %H:%M:%S"),
        plural(record.summary.total_files as usize, "file"),
        duration
    )
}

impl HistoryCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let config = ctx.load_config()?;
        let store = ctx.open_history(&config).await?;

        match self {
            HistoryCommand::List { task, limit } => {
                let records: Vec<_> = store
                    .list(task.as_deref())
                    .await?
                    .into_iter()
                    .take(*limit)
                    .collect();
                if ctx.format.is_json() {
                    // Logs are left out of listings; `show` prints them.
                    let json: Vec<_> = records
                        .iter()
                        .map(|r| {
                            let mut value = serde_json::to_value(r).unwrap_or_default();
                            if let Some(obj) = value.as_object_mut() {
                                obj.remove("logs");
                            }
                            value
                        })
                        .collect();
                    formatter.print_json(&serde_json::Value::Array(json));
                } else if records.is_empty() {
                    formatter.info("No runs recorded.");
                } else {
                    for record in &records {
                        formatter.info(&summary_line(record));
                    }
                }
            }
            HistoryCommand::Show { id } => {
                let Some(record) = store.get(id).await? else {
                    formatter.error(&format!("No history record {}", id));
                    bail!("unknown history record {}", id);
                };
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::to_value(&record)?);
                } else {
                    formatter.success(&summary_line(&record));
                    formatter.info(&format!(
                        "Origin {} -> {} ({})",
                        record.task_info.origin_path,
                        record.task_info.target_path,
                        record.task_info.account
                    ));
                    formatter.info(&format!(
                        "Written {} / {}, deleted {}",
                        record.summary.downloaded_files,
                        record.summary.total_files,
                        record.summary.deleted_files
                    ));
                    if let Some(error) = &record.summary.error_message {
                        formatter.warn(error);
                    }
                    formatter.info("");
                    for line in &record.logs {
                        formatter.info(line);
                    }
                }
            }
            HistoryCommand::Delete { id } => {
                if store.delete(id).await? {
                    formatter.success(&format!("Deleted {}", id));
                } else {
                    formatter.error(&format!("No history record {}", id));
                    bail!("unknown history record {}", id);
                }
            }
            HistoryCommand::Clear { yes } => {
                if !yes {
                    formatter.warn("This deletes every history record. Re-run with --yes to confirm.");
                    return Ok(());
                }
                store.clear().await?;
                info!("Cleared task history");
                formatter.success("History cleared");
            }
            HistoryCommand::Purge { days } => {
                let days = days.unwrap_or(config.history.retention_days);
                let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
                let purged = store.purge_before(cutoff).await?;
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "purged": purged,
                        "retention_days": days,
                    }));
                } else {
                    formatter.success(&format!(
                        "Purged {} older than {} days",
                        plural(purged, "record"),
                        days
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freestrm_core::domain::{RunStatus, SyncTask};

    #[test]
    fn test_summary_line() {
        let task = SyncTask {
            id: "tv".into(),
            account: "main".into(),
            origin_path: "/media/tv".into(),
            target_path: "tv".into(),
            strm_extensions: vec![],
            download_extensions: vec![],
            strm_prefix: None,
            remove_extra_files: false,
        };
        let mut record = TaskExecutionHistory::start(&task);
        record.summary.total_files = 12;
        assert!(summary_line(&record).contains("running"));
        assert!(summary_line(&record).ends_with("12 files  -"));

        record.status = RunStatus::Completed;
        record.end_time = Some(record.start_time + chrono::Duration::seconds(41));
        let line = summary_line(&record);
        assert!(line.starts_with(&record.id));
        assert!(line.contains("completed"));
        assert!(line.ends_with("41s"));
    }
}
