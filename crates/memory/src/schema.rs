//! Core data model shared across the memory pipeline (spec §3).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Preference,
    Decision,
    Entity,
    Episode,
    Skill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLayer {
    Stm,
    Ltm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Implicit,
    Explicit,
    Conversation,
    Consolidation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_type: SourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// The single persisted entity (spec §3).
///
/// Invariant: `supersedes` and `supersededBy` are never equal, and the
/// `supersedes` pointer graph a merge run produces is acyclic — enforced by
/// the merge engine's depth-bounded walk, not by this type itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MemoryType,
    pub layer: MemoryLayer,
    pub tags: BTreeSet<String>,
    pub entities: BTreeSet<String>,
    pub importance: f32,
    pub confidence: f32,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn is_inert(&self) -> bool {
        self.superseded_by.is_some()
    }
}

/// State machine status for an [`crate::selector::ConsolidationCandidate`]
/// (spec §3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Eligible,
    Processing,
    Consolidated,
    Failed,
    Skipped,
}

impl CandidateStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CandidateStatus::Consolidated | CandidateStatus::Skipped)
    }
}

/// In-memory wrapper over a [`MemoryRecord`] tracked by the STM selector
/// (spec §3, §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidationCandidate {
    pub record_id: Uuid,
    pub status: CandidateStatus,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
}

impl ConsolidationCandidate {
    pub fn new(record_id: Uuid) -> Self {
        Self {
            record_id,
            status: CandidateStatus::Eligible,
            retry_count: 0,
            last_attempt_at: None,
            batch_id: None,
        }
    }
}

/// One pipeline run's selected batch. Lifetime = one `run()`; not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StmBatch {
    pub batch_id: Uuid,
    pub candidates: Vec<ConsolidationCandidate>,
    pub created_at: DateTime<Utc>,
}

impl StmBatch {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn record_ids(&self) -> Vec<Uuid> {
        self.candidates.iter().map(|c| c.record_id).collect()
    }
}

/// Output of the LLM validator (spec §3, §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistilledFact {
    #[serde(rename = "type")]
    pub kind: MemoryType,
    pub content: String,
    pub confidence: f32,
    pub source_candidate_ids: Vec<String>,
    pub entities: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub reasoning: String,
}

/// Typed briefing section kind (spec §3, §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    OpenThreads,
    HighImportance,
    RecentDecisions,
    Upcoming,
    HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefingItem {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MemoryType,
    pub importance: f32,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefingSection {
    pub section_type: SectionType,
    pub title: String,
    pub items: Vec<BriefingItem>,
    pub item_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Briefing {
    pub timestamp: DateTime<Utc>,
    pub sections: Vec<BriefingSection>,
    pub total_items: usize,
    pub generated_in_ms: i64,
}

/// Trim and collapse internal whitespace — used wherever the spec calls for
/// "whitespace-sanitized" or "already trimmed/collapsed" content.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
