//! STM selector (C4, spec §4.4) — tracks consolidation candidates through
//! their state machine and picks the next batch to distill.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reins_config::SelectorConfig;
use uuid::Uuid;

use crate::schema::{CandidateStatus, ConsolidationCandidate, MemoryLayer, MemoryRecord, StmBatch};

/// Read access to the STM tier, injected so the selector never depends on a
/// concrete store (spec's memory-store collaborator is out of scope here).
#[async_trait]
pub trait StmSource: Send + Sync {
    async fn list_eligible(&self) -> anyhow::Result<Vec<MemoryRecord>>;
}

/// Tracks [`ConsolidationCandidate`] state across runs and selects batches.
///
/// Owns the candidate map as its only mutable state; everything else is a
/// pure function of that map plus the records handed in by the [`StmSource`].
pub struct StmSelector {
    config: SelectorConfig,
    candidates: HashMap<Uuid, ConsolidationCandidate>,
}

impl StmSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            candidates: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    fn candidate_for(&mut self, record_id: Uuid) -> &mut ConsolidationCandidate {
        self.candidates
            .entry(record_id)
            .or_insert_with(|| ConsolidationCandidate::new(record_id))
    }

    pub fn mark_processing(&mut self, record_id: Uuid, batch_id: Uuid, now: DateTime<Utc>) {
        let candidate = self.candidate_for(record_id);
        candidate.status = CandidateStatus::Processing;
        candidate.batch_id = Some(batch_id);
        candidate.last_attempt_at = Some(now);
    }

    pub fn mark_consolidated(&mut self, record_id: Uuid, now: DateTime<Utc>) {
        let candidate = self.candidate_for(record_id);
        candidate.status = CandidateStatus::Consolidated;
        candidate.last_attempt_at = Some(now);
    }

    /// Increments the retry count; becomes `Skipped` (terminal) once
    /// `retryCount >= maxRetries`, otherwise `Failed` — non-terminal, but
    /// excluded from selection until `dedupeWindowMs` has elapsed since this
    /// transition (spec §4.4, §8 property 4).
    pub fn mark_failed(&mut self, record_id: Uuid, max_retries: u32, now: DateTime<Utc>) {
        let candidate = self.candidate_for(record_id);
        candidate.retry_count += 1;
        candidate.last_attempt_at = Some(now);
        candidate.status = if candidate.retry_count >= max_retries {
            CandidateStatus::Skipped
        } else {
            CandidateStatus::Failed
        };
    }

    pub fn mark_skipped(&mut self, record_id: Uuid) {
        let candidate = self.candidate_for(record_id);
        candidate.status = CandidateStatus::Skipped;
    }

    pub fn candidate_status(&self, record_id: Uuid) -> Option<CandidateStatus> {
        self.candidates.get(&record_id).map(|c| c.status)
    }

    /// Select the next batch per spec §4.4: STM, non-superseded records at
    /// least `minAgeMs` old, not already terminal or in-flight, sorted
    /// `(createdAt asc, id asc)`, truncated to `batchSize`. The source lists
    /// all STM records (spec §6); the selector does the filtering.
    pub async fn select_batch(
        &mut self,
        source: &dyn StmSource,
        now: DateTime<Utc>,
        generate_id: impl FnOnce() -> Uuid,
    ) -> anyhow::Result<StmBatch> {
        let records = source.list_eligible().await?;
        let min_age_ms = self.config.min_age_ms;

        let dedupe_window_ms = self.config.dedupe_window_ms;
        let mut eligible: Vec<&MemoryRecord> = records
            .iter()
            .filter(|record| {
                if record.layer != MemoryLayer::Stm || record.is_inert() {
                    return false;
                }
                let age_ms = (now - record.created_at).num_milliseconds();
                if age_ms < min_age_ms {
                    return false;
                }
                match self.candidates.get(&record.id) {
                    None => true,
                    Some(candidate) => {
                        if candidate.status.is_terminal() || candidate.status == CandidateStatus::Processing {
                            return false;
                        }
                        if candidate.status == CandidateStatus::Failed {
                            if let Some(last_attempt_at) = candidate.last_attempt_at {
                                let elapsed = (now - last_attempt_at).num_milliseconds();
                                if elapsed < dedupe_window_ms {
                                    return false;
                                }
                            }
                        }
                        true
                    }
                }
            })
            .collect();

        eligible.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });
        eligible.truncate(self.config.batch_size);

        let batch_id = generate_id();
        let candidates = eligible
            .into_iter()
            .map(|record| {
                self.mark_processing(record.id, batch_id, now);
                self.candidates[&record.id].clone()
            })
            .collect();

        Ok(StmBatch {
            batch_id,
            candidates,
            created_at: now,
        })
    }
}
