//! Sync engine
//!
//! The [`SyncEngine`] owns the process-wide services (rate-limited queue,
//! metadata caches, run registry, history store) and starts runs on them.
//!
//! ## Run Flow
//!
//! 1. **Setup**: look up task and account, reserve the registry slot, connect
//!    the drive, fetch the remote tree, scan the task root and plan
//! 2. **History**: create the running record
//! 3. **Execution**: a spawned task carries out the plan
//!    (see [`crate::executor`]), then frees the registry slot, purges expired
//!    cache entries and refreshes the media server after a completed run
//!
//! Any setup error frees the slot and is returned before a history record
//! exists.

use std::sync::Arc;

use chrono::Utc;
use freestrm_core::config::Config;
use freestrm_core::domain::account::AccountCredential;
use freestrm_core::domain::errors::DriveError;
use freestrm_core::domain::history::RunStatus;
use freestrm_core::domain::task::SyncTask;
use freestrm_core::ports::cloud_drive::{ICloudDrive, RemoteEntry};
use freestrm_core::ports::task_history::ITaskHistoryStore;
use freestrm_drive::cache::DriveCaches;
use freestrm_drive::rate_limit::RateLimitedQueue;
use freestrm_history::HistoryRecorder;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::executor::{execute, RunContext, RunOutcome};
use crate::filesystem::TaskRoot;
use crate::notify::EmbyNotifier;
use crate::planner::{self, SyncPlan};
use crate::progress::ProgressReceiver;
use crate::registry::{ActiveRun, RunRegistry};
use crate::SyncError;

// ============================================================================
// Drive factory
// ============================================================================

/// Builds the drive adapter for an account
pub trait DriveFactory: Send + Sync {
    fn connect(
        &self,
        account: &AccountCredential,
        config: &Config,
        caches: DriveCaches,
        queue: Arc<RateLimitedQueue>,
    ) -> Result<Arc<dyn ICloudDrive>, DriveError>;
}

/// Connects to the real backends
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteDrives;

impl DriveFactory for RemoteDrives {
    fn connect(
        &self,
        account: &AccountCredential,
        config: &Config,
        caches: DriveCaches,
        queue: Arc<RateLimitedQueue>,
    ) -> Result<Arc<dyn ICloudDrive>, DriveError> {
        freestrm_drive::connect(account, config, caches, queue)
    }
}

// ============================================================================
// SyncRun
// ============================================================================

/// Handle to a started run
#[derive(Debug)]
pub struct SyncRun {
    pub run: Arc<ActiveRun>,
    /// Id of the run's history record
    pub history_id: String,
    handle: JoinHandle<RunOutcome>,
}

impl SyncRun {
    /// Progress records of the run: replay, then live.
    pub fn subscribe(&self) -> ProgressReceiver {
        self.run.bus.subscribe()
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<RunOutcome, SyncError> {
        Ok(self.handle.await?)
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

pub struct SyncEngine {
    config: Arc<Config>,
    queue: Arc<RateLimitedQueue>,
    caches: DriveCaches,
    registry: Arc<RunRegistry>,
    history: Arc<dyn ITaskHistoryStore>,
    drives: Arc<dyn DriveFactory>,
    notifier: Option<EmbyNotifier>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("queue", &self.queue)
            .field("registry", &self.registry)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create an engine that talks to the real backends.
    pub fn new(config: Config, history: Arc<dyn ITaskHistoryStore>) -> Self {
        let notifier = config.emby.as_ref().and_then(|emby| match EmbyNotifier::new(emby) {
            Ok(notifier) => Some(notifier),
            Err(e) => {
                warn!(error = %e, "Media server refresh disabled");
                None
            }
        });
        Self {
            queue: Arc::new(RateLimitedQueue::new(config.rate_limiting.clone())),
            caches: DriveCaches::new(&config.cache),
            registry: Arc::new(RunRegistry::new()),
            history,
            drives: Arc::new(RemoteDrives),
            notifier,
            config: Arc::new(config),
        }
    }

    /// Use `drives` to connect accounts.
    pub fn with_drives(mut self, drives: Arc<dyn DriveFactory>) -> Self {
        self.drives = drives;
        self
    }

    pub fn with_registry(mut self, registry: Arc<RunRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn caches(&self) -> &DriveCaches {
        &self.caches
    }

    pub fn history(&self) -> &Arc<dyn ITaskHistoryStore> {
        &self.history
    }

    fn account(&self, name: &str) -> Result<&AccountCredential, SyncError> {
        self.config
            .account(name)
            .ok_or_else(|| SyncError::UnknownAccount(name.to_string()))
    }

    fn task(&self, task_id: &str) -> Result<SyncTask, SyncError> {
        let task = self
            .config
            .task(task_id)
            .ok_or_else(|| SyncError::UnknownTask(task_id.to_string()))?;
        let task = self.config.effective_task(task);
        task.validate()?;
        Ok(task)
    }

    fn drive(&self, account: &AccountCredential) -> Result<Arc<dyn ICloudDrive>, SyncError> {
        Ok(self.drives.connect(
            account,
            &self.config,
            self.caches.clone(),
            self.queue.clone(),
        )?)
    }

    // ------------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------------

    /// Start a run of `task_id`.
    ///
    /// Returns once setup is done and the run executes in the background.
    #[instrument(skip(self))]
    pub async fn start(&self, task_id: &str) -> Result<SyncRun, SyncError> {
        let task = self.task(task_id)?;
        let account = self.account(&task.account)?.clone();
        let run = self.registry.reserve(ActiveRun::new(
            &task.id,
            &account.name,
            self.config.sync.log_buffer,
        ))?;

        let setup = tokio::select! {
            setup = self.prepare(&task, &account) => setup,
            _ = run.cancel.cancelled() => Err(DriveError::Cancelled.into()),
        };
        let (drive, root, plan) = match setup {
            Ok(setup) => setup,
            Err(e) => {
                self.registry.remove(&run.task_id, &run.run_id);
                warn!(task_id, error = %e, "Run setup failed");
                return Err(e);
            }
        };

        let recorder = match HistoryRecorder::begin(self.history.clone(), &task).await {
            Ok(recorder) => recorder,
            Err(e) => {
                self.registry.remove(&run.task_id, &run.run_id);
                return Err(SyncError::History(e.to_string()));
            }
        };
        let history_id = recorder.id().to_string();
        info!(
            task_id,
            run_id = %run.run_id,
            history_id = %history_id,
            "Run started"
        );

        let ctx = Arc::new(RunContext {
            queue: self.queue.clone(),
            max_in_flight: self.config.sync.max_in_flight,
            task,
            drive,
            root,
            run: run.clone(),
            recorder,
        });
        let registry = self.registry.clone();
        let notifier = self.notifier.clone();
        let caches = self.caches.clone();
        let handle = tokio::spawn(async move {
            let run = ctx.run.clone();
            let outcome = execute(ctx, plan).await;
            registry.remove(&run.task_id, &run.run_id);
            caches.purge_expired();
            if outcome.status() == RunStatus::Completed {
                if let Some(notifier) = notifier {
                    notifier.spawn_refresh();
                }
            }
            outcome
        });

        Ok(SyncRun {
            run,
            history_id,
            handle,
        })
    }

    async fn prepare(
        &self,
        task: &SyncTask,
        account: &AccountCredential,
    ) -> Result<(Arc<dyn ICloudDrive>, TaskRoot, SyncPlan), SyncError> {
        let drive = self.drive(account)?;
        let records = drive.fetch_tree(&task.origin_path).await?;
        let root = TaskRoot::new(self.config.task_root(task));
        let local = root.scan().await?;
        let plan = planner::plan(task, &records, &local);
        info!(
            task_id = %task.id,
            remote = plan.remote_files.len(),
            local = plan.local_files.len(),
            missing = plan.missing.len(),
            extra = plan.extra.len(),
            "Planned run"
        );
        Ok((drive, root, plan))
    }

    /// Cancel the run of `task_id`. Returns `false` when it is not running.
    pub fn cancel(&self, task_id: &str) -> bool {
        self.registry.cancel(task_id)
    }

    /// Subscribe to the progress of the active run of `task_id`.
    pub fn subscribe(&self, task_id: &str) -> Option<ProgressReceiver> {
        self.registry.get(task_id).map(|run| run.bus.subscribe())
    }

    pub fn active_runs(&self) -> Vec<Arc<ActiveRun>> {
        self.registry.list()
    }

    // ------------------------------------------------------------------------
    // Remote browsing
    // ------------------------------------------------------------------------

    /// Sub-directories of `path` on `account`.
    #[instrument(skip(self))]
    pub async fn list_remote(&self, account: &str, path: &str) -> Result<Vec<RemoteEntry>, SyncError> {
        let drive = self.drive(self.account(account)?)?;
        let mut dirs: Vec<RemoteEntry> = drive
            .list(path)
            .await?
            .into_iter()
            .filter(|entry| entry.is_dir)
            .collect();
        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(dirs)
    }

    /// Temporary download URL of the file at `path` on `account`.
    #[instrument(skip(self))]
    pub async fn resolve_url(&self, account: &str, path: &str) -> Result<String, SyncError> {
        let drive = self.drive(self.account(account)?)?;
        Ok(drive.resolve_download_url(path).await?)
    }

    // ------------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------------

    /// Remove everything under the task root of `task_id`.
    pub async fn clear_target(&self, task_id: &str) -> Result<usize, SyncError> {
        let task = self.task(task_id)?;
        if self.registry.is_running(&task.id) {
            return Err(SyncError::AlreadyRunning(task.id));
        }
        let root = TaskRoot::new(self.config.task_root(&task));
        let removed = root.clear().await?;
        info!(task_id, removed, root = %root.path().display(), "Cleared task root");
        Ok(removed)
    }

    /// Drop history records older than the configured retention.
    pub async fn purge_history(&self) -> anyhow::Result<usize> {
        let days = i64::from(self.config.history.retention_days);
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let purged = self.history.purge_before(cutoff).await?;
        info!(purged, retention_days = days, "Purged history");
        Ok(purged)
    }
}
