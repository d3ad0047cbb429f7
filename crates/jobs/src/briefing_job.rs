//! Morning briefing job (C10, spec §4.10) — same interval/re-entrancy shape
//! as [`crate::consolidation_job::MemoryConsolidationJob`], wrapping the
//! briefing service instead of the consolidation runner.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use reins_config::ScheduleConfig;
use reins_memory::DisplayMessage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{JobError, Result};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub type BriefingRunFn = Arc<dyn Fn() -> BoxFuture<anyhow::Result<Vec<DisplayMessage>>> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct JobStatus {
    pub running: bool,
    pub executing: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub run_count: u64,
}

pub struct MorningBriefingJob {
    schedule: ScheduleConfig,
    run_fn: BriefingRunFn,
    on_complete: Option<Arc<dyn Fn(&[DisplayMessage]) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&anyhow::Error) + Send + Sync>>,
    executing: Arc<AtomicBool>,
    run_count: Arc<AtomicU64>,
    last_run_at: Arc<Mutex<Option<DateTime<Utc>>>>,
    last_result: Arc<Mutex<Option<Vec<DisplayMessage>>>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl MorningBriefingJob {
    pub fn new(schedule: ScheduleConfig, run_fn: BriefingRunFn) -> Self {
        Self {
            schedule,
            run_fn,
            on_complete: None,
            on_error: None,
            executing: Arc::new(AtomicBool::new(false)),
            run_count: Arc::new(AtomicU64::new(0)),
            last_run_at: Arc::new(Mutex::new(None)),
            last_result: Arc::new(Mutex::new(None)),
            shutdown_tx: None,
            handle: None,
        }
    }

    pub fn on_complete(&mut self, callback: impl Fn(&[DisplayMessage]) + Send + Sync + 'static) {
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

    pub fn last_briefing(&self) -> Option<Vec<DisplayMessage>> {
        self.last_result.lock().unwrap().clone()
    }

    pub fn start(&mut self) -> Result<()> {
        if !self.schedule.enabled {
            return Err(JobError::BriefingJobDisabled);
        }
        if self.schedule.interval_ms <= 0 {
            return Err(JobError::BriefingJobInvalidInterval);
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
        let last_result = self.last_result.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_once(&run_fn, &on_complete, &on_error, &executing, &run_count, &last_run_at, &last_result).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("morning briefing job stopped");
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

    pub async fn trigger_now(&self) -> Result<()> {
        let ran = run_once(
            &self.run_fn,
            &self.on_complete,
            &self.on_error,
            &self.executing,
            &self.run_count,
            &self.last_run_at,
            &self.last_result,
        )
        .await;
        if ran {
            Ok(())
        } else {
            Err(JobError::BriefingJobAlreadyRunning)
        }
    }
}

/// Owns the `executing` re-entrancy guard exclusively: callers never swap
/// it themselves. Returns `false` (without calling `run_fn`) if a run was
/// already in flight.
async fn run_once(
    run_fn: &BriefingRunFn,
    on_complete: &Option<Arc<dyn Fn(&[DisplayMessage]) + Send + Sync>>,
    on_error: &Option<Arc<dyn Fn(&anyhow::Error) + Send + Sync>>,
    executing: &Arc<AtomicBool>,
    run_count: &Arc<AtomicU64>,
    last_run_at: &Arc<Mutex<Option<DateTime<Utc>>>>,
    last_result: &Arc<Mutex<Option<Vec<DisplayMessage>>>>,
) -> bool {
    if executing.swap(true, Ordering::SeqCst) {
        warn!("briefing tick skipped, previous run still executing");
        return false;
    }

    match run_fn().await {
        Ok(messages) => {
            *last_run_at.lock().unwrap() = Some(Utc::now());
            *last_result.lock().unwrap() = Some(messages.clone());
            run_count.fetch_add(1, Ordering::SeqCst);
            if let Some(callback) = on_complete {
                callback(&messages);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_messages() -> Vec<DisplayMessage> {
        vec![DisplayMessage {
            section_type: "empty".to_string(),
            text: "Good morning! Nothing to report today.".to_string(),
        }]
    }

    #[tokio::test]
    async fn start_rejects_disabled_job() {
        let mut schedule = ScheduleConfig::briefing_default();
        schedule.enabled = false;
        let mut job = MorningBriefingJob::new(schedule, Arc::new(|| Box::pin(async { Ok(empty_messages()) })));
        assert!(matches!(job.start(), Err(JobError::BriefingJobDisabled)));
    }

    #[tokio::test]
    async fn trigger_now_stores_last_briefing() {
        let schedule = ScheduleConfig::briefing_default();
        let job = MorningBriefingJob::new(schedule, Arc::new(|| Box::pin(async { Ok(empty_messages()) })));

        job.trigger_now().await.unwrap();
        assert_eq!(job.last_briefing(), Some(empty_messages()));
        assert_eq!(job.status().run_count, 1);
    }

    #[tokio::test]
    async fn run_failure_does_not_increment_run_count() {
        let schedule = ScheduleConfig::briefing_default();
        let job = MorningBriefingJob::new(
            schedule,
            Arc::new(|| Box::pin(async { Err(anyhow::anyhow!("provider down")) })),
        );

        job.trigger_now().await.unwrap();
        assert_eq!(job.status().run_count, 0);
        assert!(job.last_briefing().is_none());
    }
}
