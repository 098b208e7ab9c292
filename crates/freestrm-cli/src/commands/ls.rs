//! Ls command - List sub-directories of a remote path

use anyhow::{bail, Result};
use clap::Args;

use super::{pick_account, CliContext};
use crate::output::get_formatter;

#[derive(Debug, Args)]
pub struct LsCommand {
    /// Remote path to list
    #[arg(default_value = "/")]
    pub path: String,

    /// Account to browse (defaults to the first configured account)
    #[arg(long)]
    pub account: Option<String>,
}

impl LsCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let engine = ctx.open_engine().await?;
        let account = pick_account(engine.config(), self.account.as_deref())?;

        let dirs = match engine.list_remote(&account, &self.path).await {
            Ok(dirs) => dirs,
            Err(e) => {
                formatter.error(&e.user_message());
                bail!("could not list {}", self.path);
            }
        };

        if ctx.format.is_json() {
            let json = serde_json::json!({
                "account": account,
                "path": self.path,
                "directories": dirs,
            });
            formatter.print_json(&json);
        } else if dirs.is_empty() {
            formatter.info(&format!("No sub-directories under {}", self.path));
        } else {
            for dir in &dirs {
                println!("{}/", dir.name);
            }
        }
        Ok(())
    }
}
