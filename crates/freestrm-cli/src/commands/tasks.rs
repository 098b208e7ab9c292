//! Tasks command - List configured sync tasks

use anyhow::Result;
use clap::Args;
use freestrm_core::config::Config;
use freestrm_core::domain::SyncTask;

use super::CliContext;
use crate::output::get_formatter;

#[derive(Debug, Args)]
pub struct TasksCommand {}

fn task_json(config: &Config, task: &SyncTask) -> serde_json::Value {
    serde_json::json!({
        "id": task.id,
        "account": task.account,
        "origin_path": task.origin_path,
        "target_path": config.task_root(task).display().to_string(),
        "strm_extensions": task.strm_extensions,
        "download_extensions": task.download_extensions,
        "strm_prefix": task.strm_prefix,
        "remove_extra_files": task.remove_extra_files,
        "valid": task.validate().is_ok(),
    })
}

impl TasksCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let config = ctx.load_config()?;
        let tasks: Vec<SyncTask> = config
            .tasks
            .iter()
            .map(|t| config.effective_task(t))
            .collect();

        if ctx.format.is_json() {
            let json: Vec<_> = tasks.iter().map(|t| task_json(&config, t)).collect();
            formatter.print_json(&serde_json::Value::Array(json));
            return Ok(());
        }

        if tasks.is_empty() {
            formatter.info("No tasks configured.");
            return Ok(());
        }
        for task in &tasks {
            formatter.success(&task.id);
            formatter.info(&format!("  Account: {}", task.account));
            formatter.info(&format!("  Origin:  {}", task.origin_path));
            formatter.info(&format!("  Target:  {}", config.task_root(task).display()));
            formatter.info(&format!("  Strm:    {}", task.strm_extensions.join(" ")));
            formatter.info(&format!("  Copy:    {}", task.download_extensions.join(" ")));
            if task.remove_extra_files {
                formatter.info("  Removes extra local files");
            }
            if let Err(e) = task.validate() {
                formatter.warn(&format!("{}: {}", task.id, e));
            }
        }
        Ok(())
    }
}
