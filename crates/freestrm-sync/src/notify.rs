//! Media server refresh
//!
//! After a completed run the configured Emby (or Jellyfin) server is asked to
//! rescan its libraries. The request is fire-and-forget: failures are logged
//! and never change the outcome of the run.

use std::time::Duration;

use freestrm_core::config::EmbyConfig;
use reqwest::{Client, Url};
use tracing::{info, warn};

const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct EmbyNotifier {
    http: Client,
    refresh_url: Url,
}

impl EmbyNotifier {
    pub fn new(config: &EmbyConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&format!("{}/", config.url.trim_end_matches('/')))?;
        let mut refresh_url = base.join("Library/Refresh")?;
        refresh_url
            .query_pairs_mut()
            .append_pair("api_key", &config.api_key);
        let http = Client::builder().timeout(REFRESH_TIMEOUT).build()?;
        Ok(Self { http, refresh_url })
    }

    /// Ask the server to refresh its libraries. Returns whether it accepted.
    pub async fn refresh(&self) -> bool {
        match self.http.post(self.refresh_url.clone()).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(status = %resp.status(), "Media library refresh requested");
                true
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "Media server rejected library refresh");
                false
            }
            Err(e) => {
                warn!(error = %e, "Media library refresh failed");
                false
            }
        }
    }

    /// Refresh in the background.
    pub fn spawn_refresh(&self) {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.refresh().await;
        });
    }
}
