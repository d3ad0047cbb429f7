//! Merge engine (C6, spec §4.6) — folds validated facts into the LTM tier:
//! duplicate reinforcement, contradiction supersession, or plain creation.
//! Pure function of its inputs plus the injected `now()`/`generateId()`; the
//! `getExisting`/`write` I/O (spec §4.7 steps 8 and 10) is the consolidation
//! runner's job, not this module's.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use reins_config::{MergeConfig, ScorerConfig};
use uuid::Uuid;

use async_trait::async_trait;

use crate::lookup::{find_contradictions, find_duplicate};
use crate::schema::{DistilledFact, MemoryLayer, MemoryRecord, Provenance, SourceType};
use crate::scorer::ImportanceScorer;

/// Read/write access to the LTM tier, injected so the runner never depends
/// on a concrete store. `get_existing` receives the batch of facts about to
/// be merged so a smarter implementation may pre-filter by type/tag/entity
/// overlap; the conservative implementation just returns all LTM (spec §6).
/// The runner — not the merge engine — calls these, so it can wrap each
/// under the retry policy (spec §4.7 steps 8 and 10).
#[async_trait]
pub trait LtmWriter: Send + Sync {
    async fn get_existing(&self, facts: &[DistilledFact]) -> anyhow::Result<Vec<MemoryRecord>>;
    async fn write(&self, records: &[MemoryRecord]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    LowConfidence,
    Duplicate,
    SupersessionChainDepthExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupersessionEntry {
    pub original_id: Uuid,
    pub replaced_by_id: Uuid,
    pub reason: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub created: Vec<MemoryRecord>,
    pub updated: Vec<MemoryRecord>,
    pub superseded: Vec<MemoryRecord>,
    pub skipped: Vec<(Uuid, SkipReason)>,
    pub supersession_chain: Vec<SupersessionEntry>,
}

impl MergeResult {
    /// `created ∪ updated ∪ superseded`, order within each group preserved
    /// (spec §4.7 step 10) — the set the consolidation runner persists.
    pub fn records_to_persist(&self) -> Vec<MemoryRecord> {
        let mut out = Vec::with_capacity(self.created.len() + self.updated.len() + self.superseded.len());
        out.extend(self.created.iter().cloned());
        out.extend(self.updated.iter().cloned());
        out.extend(self.superseded.iter().cloned());
        out
    }
}

fn record_from_fact(fact: &DistilledFact, now: DateTime<Utc>, supersedes: Option<Uuid>, generate_id: &mut impl FnMut() -> Uuid) -> MemoryRecord {
    MemoryRecord {
        id: generate_id(),
        content: crate::schema::normalize_whitespace(fact.content.trim()),
        kind: fact.kind,
        layer: MemoryLayer::Ltm,
        tags: fact.tags.clone(),
        entities: fact.entities.clone(),
        importance: fact.confidence,
        confidence: fact.confidence,
        provenance: Provenance {
            source_type: SourceType::Consolidation,
            conversation_id: Some(fact.source_candidate_ids.join(",")),
        },
        supersedes,
        superseded_by: None,
        created_at: now,
        updated_at: now,
        accessed_at: now,
    }
}

/// Walk `supersedes` pointers from `record_id` in `snapshot`, counting hops
/// up to `bound`, guarded against cycles by a visited set.
fn supersession_depth(record_id: Uuid, snapshot: &[MemoryRecord], bound: u32) -> u32 {
    let mut depth = 0;
    let mut visited = HashSet::new();
    let mut current = record_id;
    visited.insert(current);

    while depth < bound {
        let Some(record) = snapshot.iter().find(|r| r.id == current) else {
            break;
        };
        let Some(prev_id) = record.supersedes else {
            break;
        };
        if !visited.insert(prev_id) {
            break;
        }
        depth += 1;
        current = prev_id;
    }
    depth
}

/// Merge a batch of distilled facts into the existing LTM snapshot (spec
/// §4.6). Pure: takes the snapshot the runner already fetched and hands
/// back the records to persist, performing no I/O of its own.
pub fn merge_facts(
    existing: &[MemoryRecord],
    config: &MergeConfig,
    scorer_config: &ScorerConfig,
    facts: &[DistilledFact],
    now: DateTime<Utc>,
    mut generate_id: impl FnMut() -> Uuid,
) -> std::result::Result<MergeResult, reins_config::ConfigError> {
    let scorer = ImportanceScorer::new(*scorer_config)?;

    // Step 1: decay every existing record's importance; this becomes the
    // working snapshot every subsequent step reads and writes.
    let mut snapshot: Vec<MemoryRecord> = existing
        .iter()
        .cloned()
        .map(|mut record| {
            record.importance = scorer.decay(
                record.importance,
                record.accessed_at.timestamp_millis(),
                now.timestamp_millis(),
            );
            record
        })
        .collect();

    let mut result = MergeResult::default();

    for fact in facts {
        if fact.confidence < config.min_confidence_to_merge {
            result.skipped.push((Uuid::nil(), SkipReason::LowConfidence));
            continue;
        }

        if let Some(duplicate) = find_duplicate(fact, &snapshot, config.similarity_threshold) {
            let duplicate_id = duplicate.id;
            let record = snapshot
                .iter_mut()
                .find(|r| r.id == duplicate_id)
                .expect("duplicate id came from snapshot");
            record.importance = scorer.reinforce(record.importance, 1);
            record.updated_at = now;
            record.accessed_at = now;
            result.updated.push(record.clone());
            result.skipped.push((duplicate_id, SkipReason::Duplicate));
            continue;
        }

        let contradictions = find_contradictions(fact, &snapshot);
        if let Some(newest) = contradictions.iter().max_by_key(|r| r.updated_at) {
            let newest_id = newest.id;
            let depth = supersession_depth(newest_id, &snapshot, config.max_supersession_chain_depth);
            if depth >= config.max_supersession_chain_depth {
                result
                    .skipped
                    .push((newest_id, SkipReason::SupersessionChainDepthExceeded));
                continue;
            }

            let new_record = record_from_fact(fact, now, Some(newest_id), &mut generate_id);
            let new_id = new_record.id;

            let old = snapshot
                .iter_mut()
                .find(|r| r.id == newest_id)
                .expect("newest id came from snapshot");
            old.superseded_by = Some(new_id);
            old.updated_at = now;
            let old_snapshot = old.clone();

            snapshot.push(new_record.clone());
            result.created.push(new_record);
            result.superseded.push(old_snapshot);
            result.supersession_chain.push(SupersessionEntry {
                original_id: newest_id,
                replaced_by_id: new_id,
                reason: "newer_wins_contradiction",
                timestamp: now,
            });
            continue;
        }

        let created = record_from_fact(fact, now, None, &mut generate_id);
        snapshot.push(created.clone());
        result.created.push(created);
    }

    Ok(result)
}
