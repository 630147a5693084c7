//! Sync scheduler for periodic `sync_all` passes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use caresync_core::SyncOrchestrator;
//! use caresync_infra::scheduling::SyncScheduler;
//!
//! # async fn example(orchestrator: Arc<SyncOrchestrator>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut scheduler = SyncScheduler::from_config(orchestrator);
//!
//! scheduler.start().await?;
//! // ... application runs ...
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use caresync_core::SyncOrchestrator;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// A pass in progress is allowed to finish; this bounds how long `stop`
/// waits for it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Type alias for task handle to avoid complexity warnings
type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Runs [`SyncOrchestrator::sync_all`] every `interval`.
///
/// The loop stops on [`SyncScheduler::stop`] or when the orchestrator is
/// shut down. A pass that is already running is never interrupted.
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    enabled: bool,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
    completed_passes: Arc<AtomicU64>,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            enabled: true,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
            completed_passes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Interval and enablement from the orchestrator's `SyncConfig`.
    pub fn from_config(orchestrator: Arc<SyncOrchestrator>) -> Self {
        let config = orchestrator.config();
        let interval = Duration::from_secs(config.interval_seconds);
        let enabled = config.enabled;

        let mut scheduler = Self::new(orchestrator, interval);
        scheduler.enabled = enabled;
        scheduler
    }

    /// Start the scheduler
    ///
    /// Spawns the background loop. With sync disabled in configuration this
    /// logs and returns without spawning anything.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is already running
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }
        if !self.enabled {
            info!("Periodic sync disabled; scheduler not started");
            return Ok(());
        }

        info!(interval_secs = self.interval.as_secs_f64(), "Starting sync scheduler");

        // Fresh token per start so a stopped scheduler can be restarted.
        self.cancellation_token = self.orchestrator.shutdown_token().child_token();

        let orchestrator = Arc::clone(&self.orchestrator);
        let completed = Arc::clone(&self.completed_passes);
        let interval = self.interval;
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::sync_loop(orchestrator, interval, cancel, completed).await;
        });

        *self.task_handle.lock().await = Some(handle);

        info!("Sync scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    ///
    /// Cancels the loop and waits for a pass in progress to finish.
    ///
    /// # Errors
    ///
    /// Returns error if scheduler is not running
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        info!("Stopping sync scheduler");
        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            tokio::time::timeout(JOIN_TIMEOUT, handle)
                .await
                .map_err(|source| SchedulerError::Timeout { duration: JOIN_TIMEOUT, source })??;
        }

        info!("Sync scheduler stopped");
        Ok(())
    }

    /// A scheduler is running while its task handle exists and hasn't finished.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Ticks that ran `sync_all` to completion (including skipped re-entrant
    /// calls) since construction.
    pub fn completed_passes(&self) -> u64 {
        self.completed_passes.load(Ordering::Acquire)
    }

    async fn sync_loop(
        orchestrator: Arc<SyncOrchestrator>,
        interval: Duration,
        cancel: CancellationToken,
        completed: Arc<AtomicU64>,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Sync loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    let started = Instant::now();
                    match orchestrator.sync_all().await {
                        Some(report) => {
                            let failed = report.failed();
                            if failed > 0 {
                                warn!(
                                    succeeded = report.succeeded(),
                                    failed,
                                    skipped = report.skipped,
                                    elapsed_ms = started.elapsed().as_millis() as u64,
                                    "Scheduled sync finished with failures"
                                );
                            } else {
                                info!(
                                    succeeded = report.succeeded(),
                                    skipped = report.skipped,
                                    elapsed_ms = started.elapsed().as_millis() as u64,
                                    "Scheduled sync finished"
                                );
                            }
                        }
                        None => debug!("Scheduled sync skipped; a pass is already running"),
                    }
                    completed.fetch_add(1, Ordering::AcqRel);
                }
            }
        }
    }
}
