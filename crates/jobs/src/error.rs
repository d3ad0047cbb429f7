//! Job/cron error taxonomy (spec §7, §4.10, §4.11).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("consolidation job is disabled")]
    ConsolidationJobDisabled,
    #[error("consolidation job has an invalid interval")]
    ConsolidationJobInvalidInterval,
    #[error("consolidation job is already running")]
    ConsolidationJobAlreadyRunning,

    #[error("briefing job is disabled")]
    BriefingJobDisabled,
    #[error("briefing job has an invalid interval")]
    BriefingJobInvalidInterval,
    #[error("briefing job is already running")]
    BriefingJobAlreadyRunning,
    #[error("briefing job run failed: {0}")]
    BriefingJobRunFailed(#[source] anyhow::Error),
    #[error("briefing job hit an unexpected error: {0}")]
    BriefingJobUnexpectedError(#[source] anyhow::Error),

    #[error("memory subsystem is not ready for cron registration")]
    DaemonMemoryNotReady,
    #[error("daemon cron registration failed: {0}")]
    DaemonCronRegistrationFailed(#[source] anyhow::Error),
}

impl JobError {
    pub fn code(&self) -> &'static str {
        match self {
            JobError::ConsolidationJobDisabled => "CONSOLIDATION_JOB_DISABLED",
            JobError::ConsolidationJobInvalidInterval => "CONSOLIDATION_JOB_INVALID_INTERVAL",
            JobError::ConsolidationJobAlreadyRunning => "CONSOLIDATION_JOB_ALREADY_RUNNING",
            JobError::BriefingJobDisabled => "BRIEFING_JOB_DISABLED",
            JobError::BriefingJobInvalidInterval => "BRIEFING_JOB_INVALID_INTERVAL",
            JobError::BriefingJobAlreadyRunning => "BRIEFING_JOB_ALREADY_RUNNING",
            JobError::BriefingJobRunFailed(_) => "BRIEFING_JOB_RUN_FAILED",
            JobError::BriefingJobUnexpectedError(_) => "BRIEFING_JOB_UNEXPECTED_ERROR",
            JobError::DaemonMemoryNotReady => "DAEMON_MEMORY_NOT_READY",
            JobError::DaemonCronRegistrationFailed(_) => "DAEMON_CRON_REGISTRATION_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
