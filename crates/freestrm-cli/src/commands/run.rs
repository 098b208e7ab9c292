//! Run command - Run a sync task
//!
//! Provides the `freestrm run` CLI command which:
//! 1. Loads configuration and opens the task history
//! 2. Starts the task on the sync engine
//! 3. Streams progress until the run ends (Ctrl-C cancels it)
//! 4. Displays the run summary

use anyhow::{bail, Result};
use clap::Args;
use freestrm_core::domain::RunStatus;
use tracing::{debug, info};

use super::CliContext;
use crate::output::{format_duration_ms, get_formatter, plural};

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Task id as configured under `tasks`
    pub task: String,

    /// Only print the summary
    #[arg(long)]
    pub no_progress: bool,

    /// Drop cached directory ids and pickcodes before starting
    #[arg(long)]
    pub fresh: bool,
}

impl RunCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let engine = ctx.open_engine().await?;
        if self.fresh {
            engine.caches().clear_all();
            debug!("Cleared drive caches");
        }

        let run = match engine.start(&self.task).await {
            Ok(run) => run,
            Err(e) => {
                formatter.error(&e.user_message());
                bail!("task {} did not start", self.task);
            }
        };
        info!(task_id = %self.task, history_id = %run.history_id, "Run started");
        if !ctx.format.is_json() {
            formatter.info(&format!("Running {} (history {})", self.task, run.history_id));
        }

        let mut rx = run.subscribe();
        let mut interrupted = false;
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => {
                        if !self.no_progress || event.is_terminal() {
                            formatter.progress(&event);
                        }
                    }
                    None => break,
                },
                _ = tokio::signal::ctrl_c(), if !interrupted => {
                    interrupted = true;
                    formatter.warn("Interrupted, cancelling run");
                    engine.cancel(&self.task);
                }
            }
        }

        let outcome = run.wait().await?;
        debug!(caches = ?engine.caches().stats(), "Cache entries after run");

        if ctx.format.is_json() {
            let json = serde_json::json!({
                "task": self.task,
                "status": outcome.status().as_str(),
                "total_files": outcome.total_files,
                "completed": outcome.completed,
                "failed": outcome.failed,
                "deleted": outcome.deleted,
                "cancelled": outcome.cancelled,
                "duration_ms": outcome.duration_ms,
            });
            formatter.print_json(&json);
        } else {
            let duration = format_duration_ms(outcome.duration_ms);
            match outcome.status() {
                RunStatus::Completed if outcome.total_files == 0 && outcome.deleted == 0 => {
                    formatter.success("Already up to date");
                }
                RunStatus::Completed => {
                    formatter.success(&format!("Run completed in {}", duration));
                }
                RunStatus::Cancelled => formatter.warn(&format!("Run cancelled after {}", duration)),
                _ => formatter.error(&format!(
                    "{} of {} failed",
                    plural(outcome.failed, "file"),
                    outcome.total_files
                )),
            }
            formatter.info(&format!("Written:  {}", plural(outcome.completed, "file")));
            if outcome.deleted > 0 {
                formatter.info(&format!("Deleted:  {}", plural(outcome.deleted, "file")));
            }
        }

        if outcome.status() == RunStatus::Failed {
            bail!("{} failed", plural(outcome.failed, "file"));
        }
        Ok(())
    }
}
