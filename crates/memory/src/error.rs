//! Structured error taxonomy (spec §7). Every fallible boundary here returns
//! a `Result<_, MemoryError>` carrying a stable `code` and a human message;
//! the underlying cause, when any, is preserved via `#[source]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("session extractor received an invalid compaction context: {0}")]
    SessionExtractorInvalidContext(String),

    #[error("session extractor failed to persist extractions: {0}")]
    SessionExtractorPersistFailed(#[source] anyhow::Error),

    #[error("preservation hook failed to extract from session: {0}")]
    CompactionPreservationExtractFailed(#[source] anyhow::Error),

    #[error("preservation hook failed to persist extractions: {0}")]
    CompactionPreservationPersistFailed(#[source] anyhow::Error),

    #[error("STM selection failed: {0}")]
    ConsolidationSelectionFailed(#[source] anyhow::Error),

    #[error("distillation provider call failed: {0}")]
    DistillationProviderFailed(#[source] anyhow::Error),

    #[error("merge engine failed: {0}")]
    MemoryConsolidationMergeFailed(#[source] anyhow::Error),

    #[error("consolidation run failed at selection: {0}")]
    RunSelectFailed(#[source] anyhow::Error),

    #[error("consolidation run failed during distillation: {0}")]
    RunDistillFailed(#[source] anyhow::Error),

    #[error("consolidation run failed fetching existing LTM: {0}")]
    RunLtmFetchFailed(#[source] anyhow::Error),

    #[error("consolidation run failed during merge: {0}")]
    RunMergeFailed(#[source] anyhow::Error),

    #[error("consolidation run failed writing to LTM: {0}")]
    RunWriteFailed(#[source] anyhow::Error),

    #[error("consolidation run exhausted its retry policy: {0}")]
    RunRetryExhausted(#[source] anyhow::Error),

    #[error("morning briefing retrieval failed: {0}")]
    BriefingRetrievalFailed(#[source] anyhow::Error),
}

impl MemoryError {
    /// The stable error code from spec §7's taxonomy table.
    pub fn code(&self) -> &'static str {
        match self {
            MemoryError::SessionExtractorInvalidContext(_) => "SESSION_EXTRACTOR_INVALID_CONTEXT",
            MemoryError::SessionExtractorPersistFailed(_) => "SESSION_EXTRACTOR_PERSIST_FAILED",
            MemoryError::CompactionPreservationExtractFailed(_) => {
                "COMPACTION_PRESERVATION_EXTRACT_FAILED"
            }
            MemoryError::CompactionPreservationPersistFailed(_) => {
                "COMPACTION_PRESERVATION_PERSIST_FAILED"
            }
            MemoryError::ConsolidationSelectionFailed(_) => "CONSOLIDATION_SELECTION_FAILED",
            MemoryError::DistillationProviderFailed(_) => "DISTILLATION_PROVIDER_FAILED",
            MemoryError::MemoryConsolidationMergeFailed(_) => "MEMORY_CONSOLIDATION_MERGE_FAILED",
            MemoryError::RunSelectFailed(_) => "CONSOLIDATION_RUN_SELECT_FAILED",
            MemoryError::RunDistillFailed(_) => "CONSOLIDATION_RUN_DISTILL_FAILED",
            MemoryError::RunLtmFetchFailed(_) => "CONSOLIDATION_RUN_LTM_FETCH_FAILED",
            MemoryError::RunMergeFailed(_) => "CONSOLIDATION_RUN_MERGE_FAILED",
            MemoryError::RunWriteFailed(_) => "CONSOLIDATION_RUN_WRITE_FAILED",
            MemoryError::RunRetryExhausted(_) => "CONSOLIDATION_RUN_RETRY_EXHAUSTED",
            MemoryError::BriefingRetrievalFailed(_) => "MORNING_BRIEFING_RETRIEVAL_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, MemoryError>;
