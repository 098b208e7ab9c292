//! Per-file execution of one run
//!
//! Each planned file moves through `Pending -> Resolving -> Transferring ->
//! Done | Failed`. Reference files skip straight to `Done`: the `.strm` file
//! is written with the file's locator and no network call. Literal files
//! resolve a download URL, then stream the body to disk under the account's
//! `Download` limits and a per-run in-flight cap. Reference writes never
//! wait on that cap.
//!
//! ## Progress
//!
//! Every file carries a percentage (bytes received over declared length,
//! clamped to 0..=100; 100 when done). The overall percentage is the mean of
//! all files' percentages and is recomputed on every record.
//!
//! ## Cancellation
//!
//! The run's token is checked before each file and while a download waits
//! for a slot.
//! In-flight network reads are abandoned as soon as it fires; a chunk already
//! being written to disk is finished first. Partially written files are left
//! as they are.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use freestrm_core::domain::errors::DriveError;
use freestrm_core::domain::history::{RunStatus, SummaryUpdate};
use freestrm_core::domain::progress::ProgressEvent;
use freestrm_core::domain::task::{FileAction, SyncTask};
use freestrm_core::ports::cloud_drive::ICloudDrive;
use freestrm_drive::rate_limit::{OperationKind, RateLimitedQueue};
use freestrm_history::HistoryRecorder;
use futures_util::{FutureExt, StreamExt};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::filesystem::TaskRoot;
use crate::planner::{PlannedFile, SyncPlan};
use crate::registry::ActiveRun;

// ============================================================================
// RunOutcome
// ============================================================================

/// Summary of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// Files the plan called for
    pub total_files: usize,
    /// Files written or downloaded
    pub completed: usize,
    /// Files that failed
    pub failed: usize,
    /// Extra local entries removed
    pub deleted: usize,
    pub cancelled: bool,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        if self.cancelled {
            RunStatus::Cancelled
        } else if self.failed > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }

    pub fn error_message(&self) -> Option<String> {
        (self.failed > 0 && !self.cancelled)
            .then(|| format!("{} of {} files failed", self.failed, self.total_files))
    }

    fn summary(&self) -> SummaryUpdate {
        SummaryUpdate {
            total_files: Some(self.total_files as u64),
            downloaded_files: Some(self.completed as u64),
            deleted_files: Some(self.deleted as u64),
            error_message: self.error_message(),
        }
    }
}

// ============================================================================
// Progress tracking
// ============================================================================

/// Per-file percentages of a run
#[derive(Debug)]
pub struct ProgressTracker {
    percents: Mutex<HashMap<String, u8>>,
    total: usize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            percents: Mutex::new(HashMap::new()),
            total,
        }
    }

    /// Record `percent` for `path` and return the new overall percentage.
    pub fn set(&self, path: &str, percent: u8) -> f64 {
        let mut percents = self.percents.lock().unwrap_or_else(|p| p.into_inner());
        percents.insert(path.to_string(), percent.min(100));
        Self::mean(&percents, self.total)
    }

    pub fn overall(&self) -> f64 {
        let percents = self.percents.lock().unwrap_or_else(|p| p.into_inner());
        Self::mean(&percents, self.total)
    }

    fn mean(percents: &HashMap<String, u8>, total: usize) -> f64 {
        if total == 0 {
            return 100.0;
        }
        let sum: u64 = percents.values().map(|p| u64::from(*p)).sum();
        sum as f64 / total as f64
    }
}

// ============================================================================
// RunContext
// ============================================================================

/// Everything the per-file work of one run needs
pub struct RunContext {
    pub task: SyncTask,
    pub drive: Arc<dyn ICloudDrive>,
    pub queue: Arc<RateLimitedQueue>,
    pub root: TaskRoot,
    pub run: Arc<ActiveRun>,
    pub recorder: HistoryRecorder,
    /// Literal downloads in flight at once
    pub max_in_flight: usize,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("task", &self.task.id)
            .field("run_id", &self.run.run_id)
            .field("root", &self.root)
            .finish()
    }
}

impl RunContext {
    /// Publish `event` and record it if it is a milestone.
    async fn emit(&self, event: ProgressEvent) {
        if self.run.bus.publish(event.clone()) {
            self.recorder.milestone(&event).await;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.run.cancel.is_cancelled()
    }

    /// Text written into the `.strm` file for `file`.
    ///
    /// The locator is `strm_prefix` joined with the file's full remote path
    /// (origin folder included), so a media server pointed at the prefix
    /// resolves it against the drive. It does not use the local
    /// `target_path`. With no prefix the locator is the bare remote path.
    pub fn locator(&self, file: &PlannedFile) -> String {
        let prefix = self.task.strm_prefix.as_deref().unwrap_or_default();
        let remote = self.task.remote_path(&file.remote);
        format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            remote.trim_start_matches('/')
        )
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Carry out `plan`, publishing progress and writing history checkpoints.
pub async fn execute(ctx: Arc<RunContext>, plan: SyncPlan) -> RunOutcome {
    let started = Instant::now();
    let mut outcome = RunOutcome {
        total_files: plan.missing.len(),
        ..Default::default()
    };
    info!(
        task_id = %ctx.task.id,
        missing = plan.missing.len(),
        extra = plan.extra.len(),
        empty_dirs = plan.empty_dirs.len(),
        "Executing sync plan"
    );
    ctx.recorder
        .update(SummaryUpdate {
            total_files: Some(outcome.total_files as u64),
            ..Default::default()
        })
        .await;

    if ctx.task.remove_extra_files {
        for extra in &plan.extra {
            if ctx.is_cancelled() {
                break;
            }
            match ctx.root.remove(extra).await {
                Ok(true) => outcome.deleted += 1,
                Ok(false) => {}
                Err(e) => warn!(path = %extra, error = %e, "Failed to remove extra file"),
            }
        }
    }
    for dir in &plan.empty_dirs {
        if let Err(e) = ctx.root.create_dir(dir).await {
            warn!(path = %dir, error = %e, "Failed to create empty directory");
        }
    }

    let progress = Arc::new(ProgressTracker::new(plan.missing.len()));
    let slots = Arc::new(Semaphore::new(ctx.max_in_flight.max(1)));
    let mut downloads = JoinSet::new();

    for file in plan.missing {
        if ctx.is_cancelled() {
            break;
        }
        match file.action {
            FileAction::Reference => match ctx.root.write_strm(&file.local, &ctx.locator(&file)).await {
                Ok(()) => {
                    outcome.completed += 1;
                    let overall = progress.set(&file.local, 100);
                    ctx.emit(ProgressEvent::file(&file.local, 100, overall)).await;
                }
                Err(e) => {
                    outcome.failed += 1;
                    ctx.emit(ProgressEvent::file_error(&file.local, e.to_string())).await;
                }
            },
            FileAction::Download => {
                let ctx = ctx.clone();
                let slots = slots.clone();
                let progress = progress.clone();
                downloads.spawn(async move {
                    let permit = tokio::select! {
                        permit = slots.acquire_owned() => permit.ok(),
                        _ = ctx.run.cancel.cancelled() => None,
                    };
                    let Some(permit) = permit else {
                        return (file.local, Err(DriveError::Cancelled));
                    };
                    let result = AssertUnwindSafe(download(&ctx, &file, &progress))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(DriveError::Transfer("download task panicked".into())));
                    drop(permit);
                    (file.local, result)
                });
            }
            FileAction::Skip => {}
        }
    }

    while let Some(joined) = downloads.join_next().await {
        match joined {
            Ok((_, Ok(()))) => outcome.completed += 1,
            Ok((_, Err(DriveError::Cancelled))) => {}
            Ok((path, Err(e))) => {
                outcome.failed += 1;
                warn!(path = %path, error = %e, "File failed");
                ctx.emit(ProgressEvent::file_error(&path, e.user_message())).await;
            }
            Err(e) => {
                outcome.failed += 1;
                warn!(error = %e, "Download task did not finish");
            }
        }
    }

    outcome.cancelled = ctx.is_cancelled();
    outcome.duration_ms = started.elapsed().as_millis() as u64;

    let terminal = if outcome.cancelled {
        ProgressEvent::cancelled()
    } else {
        ProgressEvent::completed(progress.overall())
    };
    // Cancellation through the registry has already published its record.
    ctx.run.bus.finish(terminal.clone());
    ctx.recorder.milestone(&terminal).await;
    ctx.recorder.finish(outcome.status(), outcome.summary()).await;

    info!(
        task_id = %ctx.task.id,
        status = outcome.status().as_str(),
        completed = outcome.completed,
        failed = outcome.failed,
        deleted = outcome.deleted,
        duration_ms = outcome.duration_ms,
        "Run finished"
    );
    outcome
}

/// Resolve and transfer one literal file.
async fn download(
    ctx: &RunContext,
    file: &PlannedFile,
    progress: &ProgressTracker,
) -> Result<(), DriveError> {
    let cancel = &ctx.run.cancel;
    let remote = ctx.task.remote_path(&file.remote);

    let url = tokio::select! {
        url = ctx.drive.resolve_download_url(&remote) => url?,
        _ = cancel.cancelled() => return Err(DriveError::Cancelled),
    };
    debug!(path = %file.local, "Resolved download URL");

    let identity = ctx.drive.identity();
    ctx.queue
        .schedule_with_cancel(&identity, OperationKind::Download, cancel, || {
            transfer(ctx, &url, file, progress)
        })
        .await?;

    let overall = progress.set(&file.local, 100);
    ctx.emit(ProgressEvent::file(&file.local, 100, overall)).await;
    Ok(())
}

async fn transfer(
    ctx: &RunContext,
    url: &str,
    file: &PlannedFile,
    progress: &ProgressTracker,
) -> Result<(), DriveError> {
    let cancel = &ctx.run.cancel;
    let download = tokio::select! {
        download = ctx.drive.open_download(url) => download?,
        _ = cancel.cancelled() => return Err(DriveError::Cancelled),
    };
    let write_error = |e: std::io::Error| DriveError::Transfer(format!("writing {}: {e}", file.local));

    let mut out = ctx.root.create_file(&file.local).await.map_err(write_error)?;
    let mut body = download.body;
    let declared = download.content_length.filter(|len| *len > 0);
    let mut received: u64 = 0;
    let mut reported: u8 = 0;

    loop {
        let chunk = tokio::select! {
            chunk = body.next() => chunk,
            _ = cancel.cancelled() => return Err(DriveError::Cancelled),
        };
        let Some(chunk) = chunk else {
            break;
        };
        let chunk = chunk?;
        out.write_all(&chunk).await.map_err(write_error)?;
        out.flush().await.map_err(write_error)?;
        received += chunk.len() as u64;

        if let Some(total) = declared {
            let percent = (received.saturating_mul(100) / total).min(99) as u8;
            if percent > reported {
                reported = percent;
                let overall = progress.set(&file.local, percent);
                ctx.emit(ProgressEvent::file(&file.local, percent, overall)).await;
            }
        }
    }
    Ok(())
}
