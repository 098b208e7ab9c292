//! Rate-limited, retrying operation queue
//!
//! Every remote call goes through [`RateLimitedQueue::schedule`], which bounds
//! throughput two ways:
//!
//! - [`StartWindow`]: a rolling one-second log of start times. Operations of
//!   one kind share a window across all accounts of the same backend, so no
//!   more than `per_second` operations start within any rolling second.
//! - A semaphore per (account, kind) caps how many operations run at once.
//!
//! Failed operations are retried when [`DriveError::is_retryable`] says so,
//! up to `max_retries` times, with a fixed or doubling delay. Each retry
//! waits for a fresh slot and a fresh start.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use freestrm_core::config::RateLimitingConfig;
//! use freestrm_core::domain::{AccountCredential, DriveError};
//! use freestrm_drive::rate_limit::{OperationKind, RateLimitedQueue};
//!
//! # async fn example() -> Result<(), DriveError> {
//! let queue = RateLimitedQueue::new(RateLimitingConfig::default());
//! let identity = AccountCredential::pan115("main", "UID=1").identity();
//! let answer = queue
//!     .schedule(&identity, OperationKind::Listing, || async { Ok(42) })
//!     .await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

use std::{collections::VecDeque, fmt, future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use freestrm_core::config::{Backoff, OperationLimits, RateLimitingConfig};
use freestrm_core::domain::account::{BackendKind, Identity};
use freestrm_core::domain::errors::DriveError;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Width of the rate window.
const WINDOW: Duration = Duration::from_secs(1);

/// Longest delay exponential backoff grows to.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Kind of remote operation, each with its own limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Directory lookups, listings and export jobs
    Listing,
    /// Pickcode and download URL resolution
    Link,
    /// File transfers
    Download,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Listing => write!(f, "listing"),
            OperationKind::Link => write!(f, "link"),
            OperationKind::Download => write!(f, "download"),
        }
    }
}

// ============================================================================
// StartWindow
// ============================================================================

/// Rolling log of recent start times.
#[derive(Debug)]
pub struct StartWindow {
    capacity: usize,
    starts: VecDeque<Instant>,
}

impl StartWindow {
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity.max(1) as usize;
        Self {
            capacity,
            starts: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a start at `now` if the window has room, otherwise return how
    /// long until the oldest start leaves the window.
    pub fn try_start(&mut self, now: Instant) -> Result<(), Duration> {
        while let Some(&oldest) = self.starts.front() {
            if now.duration_since(oldest) >= WINDOW {
                self.starts.pop_front();
            } else {
                break;
            }
        }
        if self.starts.len() < self.capacity {
            self.starts.push_back(now);
            return Ok(());
        }
        let oldest = self.starts.front().copied().unwrap_or(now);
        Err((oldest + WINDOW).saturating_duration_since(now))
    }

    /// Starts currently inside the window.
    pub fn in_window(&self, now: Instant) -> usize {
        self.starts
            .iter()
            .filter(|&&t| now.duration_since(t) < WINDOW)
            .count()
    }
}

// ============================================================================
// RateLimitedQueue
// ============================================================================

/// Schedules remote operations under per-backend rate windows and
/// per-account concurrency caps.
///
/// Designed to be shared via `Arc<RateLimitedQueue>` by every client of a
/// process.
pub struct RateLimitedQueue {
    config: RateLimitingConfig,
    windows: DashMap<(BackendKind, OperationKind), Arc<Mutex<StartWindow>>>,
    slots: DashMap<(Identity, OperationKind), Arc<Semaphore>>,
}

impl fmt::Debug for RateLimitedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedQueue")
            .field("config", &self.config)
            .finish()
    }
}

impl RateLimitedQueue {
    pub fn new(config: RateLimitingConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            slots: DashMap::new(),
        }
    }

    pub fn limits(&self, kind: OperationKind) -> &OperationLimits {
        match kind {
            OperationKind::Listing => &self.config.listing,
            OperationKind::Link => &self.config.link,
            OperationKind::Download => &self.config.download,
        }
    }

    /// Run `op` under the limits of `kind` for `identity`, retrying
    /// retryable failures.
    pub async fn schedule<T, F, Fut>(
        &self,
        identity: &Identity,
        kind: OperationKind,
        op: F,
    ) -> Result<T, DriveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DriveError>>,
    {
        self.schedule_with_cancel(identity, kind, &CancellationToken::new(), op)
            .await
    }

    /// Like [`schedule`](Self::schedule), giving up with
    /// [`DriveError::Cancelled`] once `cancel` fires while waiting for a slot
    /// or between retries.
    pub async fn schedule_with_cancel<T, F, Fut>(
        &self,
        identity: &Identity,
        kind: OperationKind,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, DriveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DriveError>>,
    {
        let limits = self.limits(kind).clone();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(DriveError::Cancelled);
            }

            let result = {
                let _permit = tokio::select! {
                    permit = self.acquire(identity, kind) => permit?,
                    _ = cancel.cancelled() => return Err(DriveError::Cancelled),
                };
                op().await
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < limits.max_retries => {
                    attempt += 1;
                    let delay = retry_delay(&limits, attempt);
                    warn!(
                        %identity,
                        %kind,
                        attempt,
                        max_retries = limits.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(DriveError::Cancelled),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Take a concurrency slot, then a start in the rate window.
    async fn acquire(
        &self,
        identity: &Identity,
        kind: OperationKind,
    ) -> Result<OwnedSemaphorePermit, DriveError> {
        let permit = self
            .semaphore(identity, kind)
            .acquire_owned()
            .await
            .map_err(|_| DriveError::Cancelled)?;

        let window = self.window(identity.backend, kind);
        loop {
            let wait = {
                let mut window = window.lock().await;
                match window.try_start(Instant::now()) {
                    Ok(()) => break,
                    Err(wait) => wait,
                }
            };
            debug!(%identity, %kind, wait_ms = wait.as_millis() as u64, "Rate window full, waiting");
            tokio::time::sleep(wait).await;
        }
        Ok(permit)
    }

    fn semaphore(&self, identity: &Identity, kind: OperationKind) -> Arc<Semaphore> {
        let concurrent = self.limits(kind).concurrent.max(1) as usize;
        self.slots
            .entry((identity.clone(), kind))
            .or_insert_with(|| Arc::new(Semaphore::new(concurrent)))
            .clone()
    }

    fn window(&self, backend: BackendKind, kind: OperationKind) -> Arc<Mutex<StartWindow>> {
        let per_second = self.limits(kind).per_second;
        self.windows
            .entry((backend, kind))
            .or_insert_with(|| Arc::new(Mutex::new(StartWindow::new(per_second))))
            .clone()
    }
}

fn retry_delay(limits: &OperationLimits, attempt: u32) -> Duration {
    let base = limits.retry_delay();
    match limits.backoff {
        Backoff::Fixed => base,
        Backoff::Exponential => {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            base.saturating_mul(factor).min(MAX_BACKOFF)
        }
    }
}
