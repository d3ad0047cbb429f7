//! Consolidation runner (C7, spec §4.7) — drives selection → distillation →
//! merge → write in strict sequence, with retry/backoff around the two
//! suspension points that call out to injected collaborators.

use chrono::{DateTime, Utc};
use reins_config::{DistillationConfig, MergeConfig, RetryPolicyConfig, ScorerConfig};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::distillation::{distill, LlmProvider};
use crate::error::{MemoryError, Result};
use crate::merge::{merge_facts, LtmWriter, MergeResult};
use crate::selector::{StmSelector, StmSource};

#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub candidates_selected: usize,
    pub facts_distilled: usize,
    pub facts_created: usize,
    pub candidates_consolidated: usize,
    pub candidates_failed: usize,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub stats: RunStats,
    pub merge_result: Option<MergeResult>,
    pub errors: Vec<String>,
    pub duration_ms: i64,
}

/// Retry `attempt` with exponential backoff capped at `max_backoff_ms`,
/// sleeping between attempts only (never before the first, never after the
/// last) — spec §4.7's retry policy, shared by distillation and the LTM
/// write step.
async fn with_retry<T, F, Fut>(policy: &RetryPolicyConfig, mut op: F) -> std::result::Result<T, anyhow::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, anyhow::Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                let backoff_ms = policy
                    .base_backoff_ms
                    .saturating_mul(1u64 << attempt)
                    .min(policy.max_backoff_ms);
                warn!(attempt, backoff_ms, error = %err, "consolidation step failed, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

pub struct ConsolidationRunner<'a> {
    pub selector: &'a mut StmSelector,
    pub stm_source: &'a dyn StmSource,
    pub llm_provider: &'a dyn LlmProvider,
    pub ltm_writer: &'a dyn LtmWriter,
    pub distillation_config: &'a DistillationConfig,
    pub merge_config: &'a MergeConfig,
    pub scorer_config: &'a ScorerConfig,
    pub retry_policy: &'a RetryPolicyConfig,
}

impl<'a> ConsolidationRunner<'a> {
    #[instrument(skip(self, now, generate_id), fields(run_id = tracing::field::Empty))]
    pub async fn run(
        &mut self,
        now: DateTime<Utc>,
        mut generate_id: impl FnMut() -> Uuid,
    ) -> Result<RunResult> {
        let start = now;
        let run_id = generate_id();
        let run_id_str = run_id.to_string();
        tracing::Span::current().record("run_id", &run_id_str.as_str());

        let mut stats = RunStats::default();
        let mut errors = Vec::new();

        let batch = self
            .selector
            .select_batch(self.stm_source, now, &mut generate_id)
            .await
            .map_err(MemoryError::RunSelectFailed)?;

        if batch.is_empty() {
            return Ok(RunResult {
                run_id,
                timestamp: start,
                stats,
                merge_result: None,
                errors,
                duration_ms: 0,
            });
        }

        stats.candidates_selected = batch.candidates.len();
        let candidate_ids = batch.record_ids();

        // Candidates are already Processing from select_batch's own
        // mark_processing call (spec step 4 folded into selection).

        let records = self
            .stm_source
            .list_eligible()
            .await
            .map_err(MemoryError::RunSelectFailed)?;
        let batch_records: Vec<_> = records
            .into_iter()
            .filter(|r| candidate_ids.contains(&r.id))
            .collect();

        let selector_max_retries = self.selector.config().max_retries;

        let distillation_config = self.distillation_config;
        let distilled = with_retry(self.retry_policy, || {
            distill(
                self.llm_provider,
                distillation_config,
                &batch.candidates,
                &batch_records,
            )
        })
        .await;

        let outcome = match distilled {
            Ok(outcome) => outcome,
            Err(err) => {
                for id in &candidate_ids {
                    self.selector.mark_failed(*id, selector_max_retries, now);
                }
                return Err(MemoryError::RunDistillFailed(err));
            }
        };

        errors.extend(outcome.warnings.iter().cloned());
        for id in &outcome.failed_candidate_ids {
            self.selector.mark_failed(*id, selector_max_retries, now);
        }

        stats.facts_distilled = outcome.facts.len();

        if outcome.facts.is_empty() {
            for id in &candidate_ids {
                if !outcome.failed_candidate_ids.contains(id) {
                    self.selector.mark_consolidated(*id, now);
                    stats.candidates_consolidated += 1;
                }
            }
            stats.candidates_failed = outcome.failed_candidate_ids.len();
            return Ok(RunResult {
                run_id,
                timestamp: start,
                stats,
                merge_result: None,
                errors,
                duration_ms: (Utc::now() - start).num_milliseconds(),
            });
        }

        let facts = outcome.facts.clone();

        // Step 8: fetch the existing LTM snapshot under the retry policy.
        let existing = with_retry(self.retry_policy, || self.ltm_writer.get_existing(&facts))
            .await
            .map_err(|err| {
                for id in &candidate_ids {
                    self.selector.mark_failed(*id, selector_max_retries, now);
                }
                MemoryError::RunLtmFetchFailed(err)
            })?;

        // Step 9: merge is a pure function of the snapshot plus the facts.
        let merge_result = merge_facts(&existing, self.merge_config, self.scorer_config, &facts, now, &mut generate_id)
            .map_err(|err| {
                for id in &candidate_ids {
                    self.selector.mark_failed(*id, selector_max_retries, now);
                }
                MemoryError::RunMergeFailed(anyhow::anyhow!(err))
            })?;

        // Step 10: write the merged records under the retry policy.
        let to_write = merge_result.records_to_persist();
        with_retry(self.retry_policy, || self.ltm_writer.write(&to_write))
            .await
            .map_err(|err| {
                for id in &candidate_ids {
                    self.selector.mark_failed(*id, selector_max_retries, now);
                }
                MemoryError::RunWriteFailed(err)
            })?;

        stats.facts_created = merge_result.created.len();

        for id in &candidate_ids {
            if !outcome.failed_candidate_ids.contains(id) {
                self.selector.mark_consolidated(*id, now);
                stats.candidates_consolidated += 1;
            }
        }
        stats.candidates_failed = outcome.failed_candidate_ids.len();

        Ok(RunResult {
            run_id,
            timestamp: start,
            stats,
            merge_result: Some(merge_result),
            errors,
            duration_ms: (Utc::now() - start).num_milliseconds(),
        })
    }
}
