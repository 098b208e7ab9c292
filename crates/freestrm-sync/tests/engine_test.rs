//! End-to-end runs of the sync engine against an in-memory drive

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use freestrm_core::config::{Config, ConfigBuilder};
use freestrm_core::domain::{
    AccountCredential, DriveError, Identity, ProgressEvent, RunStatus, SyncTask, TreeRecord,
};
use freestrm_core::ports::cloud_drive::{Download, ICloudDrive, RemoteEntry};
use freestrm_core::ports::task_history::ITaskHistoryStore;
use freestrm_drive::cache::DriveCaches;
use freestrm_drive::rate_limit::RateLimitedQueue;
use freestrm_drive::tree::TreeRecordBuilder;
use freestrm_history::MemoryHistoryStore;
use freestrm_sync::engine::{DriveFactory, SyncEngine};
use freestrm_sync::progress::ProgressReceiver;
use freestrm_sync::SyncError;
use futures_util::{stream, StreamExt};
use tempfile::TempDir;

// ============================================================================
// Fake drive
// ============================================================================

#[derive(Default)]
struct FakeDrive {
    records: Vec<TreeRecord>,
    /// Remote path -> body
    files: HashMap<String, Vec<u8>>,
    /// Remote paths whose body stops after the first tenth
    stalled: HashSet<String>,
    fail_tree: bool,
    opened: AtomicUsize,
}

impl FakeDrive {
    fn new(paths: &[&str]) -> Self {
        let mut builder = TreeRecordBuilder::new();
        for path in paths {
            builder.push_path(path);
        }
        Self {
            records: builder.finish(),
            ..Default::default()
        }
    }

    fn with_file(mut self, remote: &str, body: &[u8]) -> Self {
        self.files.insert(remote.to_string(), body.to_vec());
        self
    }

    fn with_stalled_file(mut self, remote: &str, body: &[u8]) -> Self {
        self.stalled.insert(remote.to_string());
        self.with_file(remote, body)
    }
}

#[async_trait]
impl ICloudDrive for FakeDrive {
    fn identity(&self) -> Identity {
        AccountCredential::pan115("main", "UID=1").identity()
    }

    async fn fetch_tree(&self, origin_path: &str) -> Result<Vec<TreeRecord>, DriveError> {
        if self.fail_tree {
            return Err(DriveError::NotFound(origin_path.to_string()));
        }
        Ok(self.records.clone())
    }

    async fn list(&self, _path: &str) -> Result<Vec<RemoteEntry>, DriveError> {
        Ok(vec![
            RemoteEntry {
                name: "Season 2".into(),
                id: "12".into(),
                is_dir: true,
            },
            RemoteEntry {
                name: "ep1.mkv".into(),
                id: "13".into(),
                is_dir: false,
            },
            RemoteEntry {
                name: "Season 1".into(),
                id: "11".into(),
                is_dir: true,
            },
        ])
    }

    async fn resolve_download_url(&self, remote_path: &str) -> Result<String, DriveError> {
        if self.files.contains_key(remote_path) {
            Ok(format!("mem://{remote_path}"))
        } else {
            Err(DriveError::NotFound(remote_path.to_string()))
        }
    }

    async fn open_download(&self, url: &str) -> Result<Download, DriveError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let remote = url.trim_start_matches("mem://");
        let body = self
            .files
            .get(remote)
            .cloned()
            .ok_or_else(|| DriveError::NotFound(remote.to_string()))?;
        let content_length = Some(body.len() as u64);

        let body = if self.stalled.contains(remote) {
            let head = Bytes::copy_from_slice(&body[..body.len() / 10]);
            stream::once(async move { Ok(head) })
                .chain(stream::pending())
                .boxed()
        } else {
            let chunks: Vec<Result<Bytes, DriveError>> = body
                .chunks(4)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            stream::iter(chunks).boxed()
        };
        Ok(Download {
            content_length,
            body,
        })
    }
}

struct FakeDrives(Arc<FakeDrive>);

impl DriveFactory for FakeDrives {
    fn connect(
        &self,
        _account: &AccountCredential,
        _config: &Config,
        _caches: DriveCaches,
        _queue: Arc<RateLimitedQueue>,
    ) -> Result<Arc<dyn ICloudDrive>, DriveError> {
        Ok(self.0.clone() as Arc<dyn ICloudDrive>)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn tv_task(id: &str, remove_extra_files: bool) -> SyncTask {
    SyncTask {
        id: id.into(),
        account: "main".into(),
        origin_path: "/media/tv".into(),
        target_path: id.into(),
        strm_extensions: vec![".mkv".into()],
        download_extensions: vec![".srt".into()],
        strm_prefix: Some("http://nas:5244/d".into()),
        remove_extra_files,
    }
}

struct Harness {
    data: TempDir,
    engine: SyncEngine,
    history: Arc<MemoryHistoryStore>,
    drive: Arc<FakeDrive>,
}

fn harness(drive: FakeDrive, tasks: Vec<SyncTask>) -> Harness {
    harness_with(drive, tasks, |builder| builder)
}

fn harness_with(
    drive: FakeDrive,
    tasks: Vec<SyncTask>,
    configure: impl FnOnce(ConfigBuilder) -> ConfigBuilder,
) -> Harness {
    let data = tempfile::tempdir().unwrap();
    let mut builder = ConfigBuilder::new()
        .data_root(data.path().to_path_buf())
        .account(AccountCredential::pan115("main", "UID=1"));
    for task in tasks {
        builder = builder.task(task);
    }
    let builder = configure(builder);
    let history = Arc::new(MemoryHistoryStore::default());
    let drive = Arc::new(drive);
    let engine = SyncEngine::new(builder.build(), history.clone())
        .with_drives(Arc::new(FakeDrives(drive.clone())));
    Harness {
        data,
        engine,
        history,
        drive,
    }
}

async fn drain(mut rx: ProgressReceiver) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("progress stream stalled")
    {
        events.push(event);
    }
    events
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

// ============================================================================
// Runs
// ============================================================================

#[tokio::test]
async fn test_run_writes_strm_and_downloads_literal_files() {
    let drive = FakeDrive::new(&["/tv/ep1.mkv", "/tv/ep2.srt", "/tv/extras/featurettes"])
        .with_file("/media/tv/ep2.srt", b"1\n00:00:01,000 --> 00:00:02,000\nHello\n");
    let h = harness(drive, vec![tv_task("tv", false)]);

    let run = h.engine.start("tv").await.unwrap();
    let history_id = run.history_id.clone();
    let events = drain(run.subscribe()).await;
    let outcome = run.wait().await.unwrap();

    let root = h.data.path().join("tv");
    assert_eq!(read(&root.join("ep1.strm")), "http://nas:5244/d/media/tv/ep1.mkv");
    assert_eq!(
        read(&root.join("ep2.srt")),
        "1\n00:00:01,000 --> 00:00:02,000\nHello\n"
    );
    assert!(root.join("extras").is_dir());

    let last = events.last().unwrap();
    assert_eq!(last.done, Some(true));
    assert_eq!(last.overall_percent.as_deref(), Some("100.00"));
    assert!(events.iter().all(|e| e.error.is_none()));

    assert_eq!(outcome.total_files, 2);
    assert_eq!(outcome.completed, 2);
    assert_eq!(outcome.status(), RunStatus::Completed);
    assert!(!h.engine.registry().is_running("tv"));

    let record = h.history.get(&history_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.summary.total_files, 2);
    assert!(record.end_time.is_some());
    assert!(record.logs.iter().any(|l| l.contains("ep2.srt")));

    // Nothing left to do on a second run.
    let again = h.engine.start("tv").await.unwrap().wait().await.unwrap();
    assert_eq!(again.total_files, 0);
    assert_eq!(again.deleted, 0);
    assert_eq!(h.drive.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_remove_extra_files_prunes_empty_ancestors() {
    let drive = FakeDrive::new(&["/tv/ep1.mkv"]);
    let h = harness(drive, vec![tv_task("tv", true)]);
    let root = h.data.path().join("tv");
    std::fs::create_dir_all(root.join("gone/deep")).unwrap();
    std::fs::write(root.join("old.mkv"), "stale").unwrap();
    std::fs::write(root.join("gone/deep/old.strm"), "stale").unwrap();

    let outcome = h.engine.start("tv").await.unwrap().wait().await.unwrap();

    assert_eq!(outcome.deleted, 2);
    assert!(!root.join("old.mkv").exists());
    assert!(!root.join("gone").exists());
    assert!(root.join("ep1.strm").exists());
    assert!(root.is_dir());
}

#[tokio::test]
async fn test_remove_extra_files_removes_local_empty_directories() {
    let drive = FakeDrive::new(&["/tv/ep1.mkv", "/tv/extras/featurettes"]);
    let h = harness(drive, vec![tv_task("tv", true)]);
    let root = h.data.path().join("tv");
    std::fs::create_dir_all(root.join("gone_dir")).unwrap();
    std::fs::create_dir_all(root.join("s9/a/b")).unwrap();
    std::fs::create_dir_all(root.join("extras")).unwrap();

    let outcome = h.engine.start("tv").await.unwrap().wait().await.unwrap();

    assert_eq!(outcome.deleted, 2);
    assert!(!root.join("gone_dir").exists());
    assert!(!root.join("s9").exists());
    assert!(root.join("extras").is_dir());
    assert!(root.join("ep1.strm").exists());

    let again = h.engine.start("tv").await.unwrap().wait().await.unwrap();
    assert_eq!(again.total_files, 0);
    assert_eq!(again.deleted, 0);
    assert!(root.join("extras").is_dir());
}

#[tokio::test]
async fn test_extra_files_kept_without_flag() {
    let drive = FakeDrive::new(&["/tv/ep1.mkv"]);
    let h = harness(drive, vec![tv_task("tv", false)]);
    let root = h.data.path().join("tv");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("old.mkv"), "stale").unwrap();

    let outcome = h.engine.start("tv").await.unwrap().wait().await.unwrap();

    assert_eq!(outcome.deleted, 0);
    assert!(root.join("old.mkv").exists());
}

#[tokio::test]
async fn test_failed_file_does_not_stop_siblings() {
    // ep2.srt is listed but cannot be resolved.
    let drive = FakeDrive::new(&["/tv/ep1.mkv", "/tv/ep2.srt", "/tv/ep3.srt"])
        .with_file("/media/tv/ep3.srt", b"subtitle");
    let h = harness(drive, vec![tv_task("tv", false)]);

    let run = h.engine.start("tv").await.unwrap();
    let history_id = run.history_id.clone();
    let events = drain(run.subscribe()).await;
    let outcome = run.wait().await.unwrap();

    let file_error = events
        .iter()
        .find(|e| e.error.is_some())
        .expect("per-file error record");
    assert_eq!(file_error.file_path.as_deref(), Some("ep2.srt"));
    assert!(!file_error.is_terminal());
    assert_eq!(events.last().unwrap().done, Some(true));

    assert_eq!(outcome.completed, 2);
    assert_eq!(outcome.failed, 1);
    assert!(h.data.path().join("tv/ep3.srt").exists());

    let record = h.history.get(&history_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert_eq!(
        record.summary.error_message.as_deref(),
        Some("1 of 3 files failed")
    );
}

#[tokio::test]
async fn test_cancel_mid_transfer() {
    let drive = FakeDrive::new(&["/tv/ep1.mkv", "/tv/big.srt"])
        .with_stalled_file("/media/tv/big.srt", &[7u8; 1000]);
    let h = harness(drive, vec![tv_task("tv", false)]);

    let run = h.engine.start("tv").await.unwrap();
    let history_id = run.history_id.clone();
    let mut rx = run.subscribe();

    // Wait until the stalled transfer has reported partial progress.
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let partial = event.file_path.as_deref() == Some("big.srt") && event.percent == Some(10);
        events.push(event);
        if partial {
            break;
        }
    }

    assert!(h.engine.cancel("tv"));
    assert!(!h.engine.registry().is_running("tv"));
    assert!(!h.engine.cancel("tv"));

    events.extend(drain(rx).await);
    let outcome = tokio::time::timeout(Duration::from_secs(5), run.wait())
        .await
        .unwrap()
        .unwrap();

    let cancellations = events.iter().filter(|e| e.is_cancellation()).count();
    assert_eq!(cancellations, 1);
    assert!(events.last().unwrap().is_cancellation());
    assert!(outcome.cancelled);

    // The partial file stays as it was.
    let partial = std::fs::read(h.data.path().join("tv/big.srt")).unwrap();
    assert_eq!(partial.len(), 100);

    let record = h.history.get(&history_id).await.unwrap().unwrap();
    assert_eq!(record.status, RunStatus::Cancelled);
}

#[tokio::test]
async fn test_strm_writes_do_not_wait_for_download_slots() {
    let drive = FakeDrive::new(&["/tv/a.srt", "/tv/b.srt", "/tv/z.mkv"])
        .with_stalled_file("/media/tv/a.srt", &[1u8; 100])
        .with_stalled_file("/media/tv/b.srt", &[2u8; 100]);
    let h = harness_with(drive, vec![tv_task("tv", false)], |b| b.sync_max_in_flight(1));

    let run = h.engine.start("tv").await.unwrap();
    let mut rx = run.subscribe();

    // Both downloads stall while holding or waiting for the single slot.
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("z.strm was not written while downloads were stalled")
            .unwrap();
        if event.file_path.as_deref() == Some("z.strm") && event.percent == Some(100) {
            break;
        }
    }
    assert_eq!(
        read(&h.data.path().join("tv/z.strm")),
        "http://nas:5244/d/media/tv/z.mkv"
    );
    assert!(h.drive.opened.load(Ordering::SeqCst) <= 1);

    assert!(h.engine.cancel("tv"));
    let outcome = tokio::time::timeout(Duration::from_secs(5), run.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.cancelled);
    assert_eq!(outcome.completed, 1);
    assert_eq!(outcome.failed, 0);
}

// ============================================================================
// Setup
// ============================================================================

#[tokio::test]
async fn test_setup_failure_leaves_no_history() {
    let mut drive = FakeDrive::new(&["/tv/ep1.mkv"]);
    drive.fail_tree = true;
    let h = harness(drive, vec![tv_task("tv", false)]);

    let err = h.engine.start("tv").await.unwrap_err();
    assert!(matches!(err, SyncError::Drive(DriveError::NotFound(_))));
    assert!(!h.engine.registry().is_running("tv"));
    assert!(h.history.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_task_and_account() {
    let mut orphan = tv_task("orphan", false);
    orphan.account = "nobody".into();
    let h = harness(FakeDrive::new(&[]), vec![orphan]);

    assert!(matches!(
        h.engine.start("missing").await.unwrap_err(),
        SyncError::UnknownTask(_)
    ));
    assert!(matches!(
        h.engine.start("orphan").await.unwrap_err(),
        SyncError::UnknownAccount(_)
    ));
}

#[tokio::test]
async fn test_account_serves_one_run_at_a_time() {
    let drive = FakeDrive::new(&["/tv/big.srt"])
        .with_stalled_file("/media/tv/big.srt", &[1u8; 100]);
    let h = harness(drive, vec![tv_task("tv", false), tv_task("anime", false)]);

    let run = h.engine.start("tv").await.unwrap();

    assert!(matches!(
        h.engine.start("tv").await.unwrap_err(),
        SyncError::AlreadyRunning(_)
    ));
    match h.engine.start("anime").await.unwrap_err() {
        SyncError::AccountBusy { account, task } => {
            assert_eq!(account, "main");
            assert_eq!(task, "tv");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        h.engine.clear_target("tv").await.unwrap_err(),
        SyncError::AlreadyRunning(_)
    ));

    assert!(h.engine.cancel("tv"));
    run.wait().await.unwrap();

    let anime = h.engine.start("anime").await.unwrap();
    assert!(h.engine.cancel("anime"));
    assert!(anime.wait().await.unwrap().cancelled);
}

// ============================================================================
// Browsing and maintenance
// ============================================================================

#[tokio::test]
async fn test_list_remote_returns_sorted_directories() {
    let h = harness(FakeDrive::new(&[]), vec![]);
    let dirs = h.engine.list_remote("main", "/media").await.unwrap();
    let names: Vec<&str> = dirs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Season 1", "Season 2"]);

    assert!(matches!(
        h.engine.list_remote("nobody", "/").await.unwrap_err(),
        SyncError::UnknownAccount(_)
    ));
}

#[tokio::test]
async fn test_resolve_url() {
    let drive = FakeDrive::new(&[]).with_file("/media/a.srt", b"x");
    let h = harness(drive, vec![]);
    assert_eq!(
        h.engine.resolve_url("main", "/media/a.srt").await.unwrap(),
        "mem:///media/a.srt"
    );
}

#[tokio::test]
async fn test_clear_target() {
    let h = harness(FakeDrive::new(&[]), vec![tv_task("tv", false)]);
    let root = h.data.path().join("tv");
    std::fs::create_dir_all(root.join("s1")).unwrap();
    std::fs::write(root.join("s1/ep1.strm"), "x").unwrap();
    std::fs::write(root.join("ep2.srt"), "x").unwrap();

    assert_eq!(h.engine.clear_target("tv").await.unwrap(), 2);
    assert!(root.is_dir());
    assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
}

#[tokio::test]
async fn test_purge_history_keeps_recent_records() {
    let h = harness(FakeDrive::new(&["/tv/ep1.mkv"]), vec![tv_task("tv", false)]);
    h.engine.start("tv").await.unwrap().wait().await.unwrap();

    assert_eq!(h.engine.purge_history().await.unwrap(), 0);
    assert_eq!(h.history.list(Some("tv")).await.unwrap().len(), 1);
}
