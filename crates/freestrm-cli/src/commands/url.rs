//! Url command - Resolve a temporary download URL for a remote file

use anyhow::{bail, Result};
use clap::Args;

use super::{pick_account, CliContext};
use crate::output::get_formatter;

#[derive(Debug, Args)]
pub struct UrlCommand {
    /// Remote file path
    pub path: String,

    /// Account the file belongs to (defaults to the first configured account)
    #[arg(long)]
    pub account: Option<String>,
}

impl UrlCommand {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let formatter = get_formatter(ctx.format);
        let engine = ctx.open_engine().await?;
        let account = pick_account(engine.config(), self.account.as_deref())?;

        let url = match engine.resolve_url(&account, &self.path).await {
            Ok(url) => url,
            Err(e) => {
                formatter.error(&e.user_message());
                bail!("could not resolve {}", self.path);
            }
        };

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "account": account,
                "path": self.path,
                "url": url,
            }));
        } else {
            println!("{}", url);
        }
        Ok(())
    }
}
