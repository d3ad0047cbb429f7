//! Memory consolidation job (C10, spec §4.10) — wraps the consolidation
//! runner in an interval loop with re-entrancy guards, following the
//! `spawn_*` background-task pattern.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use reins_config::ScheduleConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::error::{JobError, Result};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// One consolidation pass, injected so this crate never depends on the
/// memory crate's borrow-heavy [`reins_memory::ConsolidationRunner`]
/// directly — the host closes over its own collaborators per tick.
pub type ConsolidationRunFn = Arc<dyn Fn() -> BoxFuture<anyhow::Result<reins_memory::RunStats>> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct JobStatus {
    pub running: bool,
    pub executing: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub run_count: u64,
}

pub struct MemoryConsolidationJob {
    schedule: ScheduleConfig,
    run_fn: ConsolidationRunFn,
    on_complete: Option<Arc<dyn Fn(&reins_memory::RunStats) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&anyhow::Error) + Send + Sync>>,
    executing: Arc<AtomicBool>,
    run_count: Arc<AtomicU64>,
    last_run_at: Arc<Mutex<Option<DateTime<Utc>>>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl MemoryConsolidationJob {
    pub fn new(schedule: ScheduleConfig, run_fn: ConsolidationRunFn) -> Self {
        Self {
            schedule,
            run_fn,
            on_complete: None,
            on_error: None,
            executing: Arc::new(AtomicBool::new(false)),
            run_count: Arc::new(AtomicU64::new(0)),
            last_run_at: Arc::new(Mutex::new(None)),
            shutdown_tx: None,
            handle: None,
        }
    }

    pub fn on_complete(&mut self, callback: impl Fn(&reins_memory::RunStats) + Send + Sync + 'static) {
        self.on_complete = Some(Arc::new(callback));
    }

    pub fn on_error(&mut self, callback: impl Fn(&anyhow::Error) + Send + Sync + 'static) {
        self.on_error = Some(Arc::new(callback));
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            running: self.is_running(),
            executing: self.executing.load(Ordering::SeqCst),
            last_run_at: *self.last_run_at.lock().unwrap(),
            run_count: self.run_count.load(Ordering::SeqCst),
        }
    }

    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<()> {
        if !self.schedule.enabled {
            return Err(JobError::ConsolidationJobDisabled);
        }
        if self.schedule.interval_ms <= 0 {
            return Err(JobError::ConsolidationJobInvalidInterval);
        }
        if self.is_running() {
            return Ok(());
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval_ms = self.schedule.interval_ms as u64;
        let run_fn = self.run_fn.clone();
        let on_complete = self.on_complete.clone();
        let on_error = self.on_error.clone();
        let executing = self.executing.clone();
        let run_count = self.run_count.clone();
        let last_run_at = self.last_run_at.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            ticker.tick().await; // first tick fires immediately; skip it.
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_once(&run_fn, &on_complete, &on_error, &executing, &run_count, &last_run_at).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("memory consolidation job stopped");
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Execute immediately, guarded by the same re-entrancy flag the
    /// scheduled tick uses (spec §4.10).
    pub async fn trigger_now(&self) -> Result<()> {
        let ran = run_once(
            &self.run_fn,
            &self.on_complete,
            &self.on_error,
            &self.executing,
            &self.run_count,
            &self.last_run_at,
        )
        .await;
        if ran {
            Ok(())
        } else {
            Err(JobError::ConsolidationJobAlreadyRunning)
        }
    }
}

/// Owns the `executing` re-entrancy guard exclusively: callers never swap
/// it themselves. Returns `false` (without calling `run_fn`) if a run was
/// already in flight.
async fn run_once(
    run_fn: &ConsolidationRunFn,
    on_complete: &Option<Arc<dyn Fn(&reins_memory::RunStats) + Send + Sync>>,
    on_error: &Option<Arc<dyn Fn(&anyhow::Error) + Send + Sync>>,
    executing: &Arc<AtomicBool>,
    run_count: &Arc<AtomicU64>,
    last_run_at: &Arc<Mutex<Option<DateTime<Utc>>>>,
) -> bool {
    if executing.swap(true, Ordering::SeqCst) {
        warn!("consolidation tick skipped, previous run still executing");
        return false;
    }

    let result = run_fn().await;
    match result {
        Ok(stats) => {
            *last_run_at.lock().unwrap() = Some(Utc::now());
            run_count.fetch_add(1, Ordering::SeqCst);
            if let Some(callback) = on_complete {
                callback(&stats);
            }
        }
        Err(err) => {
            if let Some(callback) = on_error {
                callback(&err);
            }
        }
    }

    executing.store(false, Ordering::SeqCst);
    true
}
