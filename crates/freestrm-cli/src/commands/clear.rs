//! Clear command - Remove everything under a task's target folder

use anyhow::{bail, Result};
use clap::Args;

use super::CliContext;
use crate::output::{get_formatter, plural};

#[derive(Debug, Args)]
pub struct ClearCommand {
    /// Task id as configured under `tasks`
    pub task: String,

    /// Confirm the removal
    #[arg(long)]
    pub yes: bool,
}

impl ClearCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let engine = ctx.open_engine().await?;

        if !self.yes {
            let target = engine
                .config()
                .task(&self.task)
                .map(|t| engine.config().task_root(t).display().to_string())
                .unwrap_or_else(|| self.task.clone());
            formatter.warn(&format!(
                "This removes every file under {}. Re-run with --yes to confirm.",
                target
            ));
            return Ok(());
        }

        match engine.clear_target(&self.task).await {
            Ok(removed) => {
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "task": self.task,
                        "removed": removed,
                    }));
                } else {
                    formatter.success(&format!(
                        "Cleared {} ({} removed)",
                        self.task,
                        plural(removed, "item")
                    ));
                }
                Ok(())
            }
            Err(e) => {
                formatter.error(&e.user_message());
                bail!("could not clear {}", self.task);
            }
        }
    }
}
