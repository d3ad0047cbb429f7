//! Cron registration (C11, spec §4.11) — starts both background jobs behind
//! a readiness gate, rolling back on partial failure so no job is ever left
//! running after a failed registration.

use crate::briefing_job::MorningBriefingJob;
use crate::consolidation_job::MemoryConsolidationJob;
use crate::error::{JobError, Result};

/// Handle returned on successful registration (spec §4.11 step 4).
pub struct CronHandle {
    consolidation_job: MemoryConsolidationJob,
    briefing_job: MorningBriefingJob,
}

impl CronHandle {
    pub fn stop_all(&mut self) {
        self.consolidation_job.stop();
        self.briefing_job.stop();
    }

    pub fn is_consolidation_running(&self) -> bool {
        self.consolidation_job.is_running()
    }

    pub fn is_briefing_running(&self) -> bool {
        self.briefing_job.is_running()
    }
}

/// Register both memory background jobs, per spec §4.11.
///
/// `is_memory_ready` is checked synchronously before anything starts; if the
/// briefing job fails to start, the already-started consolidation job is
/// stopped before returning the error — the rollback invariant guarantees
/// zero managed jobs remain running on any failure path.
pub fn register_memory_cron_jobs(
    mut consolidation_job: MemoryConsolidationJob,
    mut briefing_job: MorningBriefingJob,
    is_memory_ready: impl FnOnce() -> bool,
) -> Result<CronHandle> {
    if !is_memory_ready() {
        return Err(JobError::DaemonMemoryNotReady);
    }

    consolidation_job
        .start()
        .map_err(|e| JobError::DaemonCronRegistrationFailed(anyhow::anyhow!(e)))?;

    if let Err(err) = briefing_job.start() {
        consolidation_job.stop();
        return Err(JobError::DaemonCronRegistrationFailed(anyhow::anyhow!(err)));
    }

    Ok(CronHandle {
        consolidation_job,
        briefing_job,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reins_config::ScheduleConfig;
    use reins_memory::RunStats;
    use std::sync::Arc;

    fn consolidation_job(schedule: ScheduleConfig) -> MemoryConsolidationJob {
        MemoryConsolidationJob::new(schedule, Arc::new(|| Box::pin(async { Ok(RunStats::default()) })))
    }

    fn briefing_job(schedule: ScheduleConfig) -> MorningBriefingJob {
        MorningBriefingJob::new(schedule, Arc::new(|| Box::pin(async { Ok(vec![]) })))
    }

    #[tokio::test]
    async fn not_ready_starts_nothing() {
        let result = register_memory_cron_jobs(
            consolidation_job(ScheduleConfig::consolidation_default()),
            briefing_job(ScheduleConfig::briefing_default()),
            || false,
        );
        assert!(matches!(result, Err(JobError::DaemonMemoryNotReady)));
    }

    #[tokio::test]
    async fn briefing_failure_rolls_back_consolidation() {
        let mut briefing_schedule = ScheduleConfig::briefing_default();
        briefing_schedule.enabled = false;

        let result = register_memory_cron_jobs(
            consolidation_job(ScheduleConfig::consolidation_default()),
            briefing_job(briefing_schedule),
            || true,
        );
        assert!(matches!(result, Err(JobError::DaemonCronRegistrationFailed(_))));
    }

    #[tokio::test]
    async fn success_returns_handle_with_both_jobs_running() {
        let mut handle = register_memory_cron_jobs(
            consolidation_job(ScheduleConfig::consolidation_default()),
            briefing_job(ScheduleConfig::briefing_default()),
            || true,
        )
        .unwrap();

        assert!(handle.is_consolidation_running());
        assert!(handle.is_briefing_running());
        handle.stop_all();
        assert!(!handle.is_consolidation_running());
        assert!(!handle.is_briefing_running());
    }
}
