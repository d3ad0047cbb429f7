//! Memory preservation hook (C8, spec §4.8) — extracts high-value memories
//! from a conversation before its history is truncated by compaction.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{MemoryError, Result};
use crate::schema::MemoryType;

#[derive(Debug, Clone, PartialEq)]
pub struct CompactionContext {
    pub conversation_id: String,
    pub session_id: String,
    pub compaction_reason: String,
    pub timestamp: DateTime<Utc>,
    pub truncation_point: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMemory {
    pub kind: MemoryType,
    pub content: String,
    pub confidence: f32,
    pub tags: BTreeSet<String>,
}

/// Pulls candidate memories out of the messages a compaction is about to
/// drop, injected so this crate never depends on a concrete session/message
/// representation.
#[async_trait]
pub trait SessionExtractor: Send + Sync {
    async fn extract(
        &self,
        context: &CompactionContext,
        message_ids: &[String],
    ) -> anyhow::Result<Vec<ExtractedMemory>>;

    async fn persist(&self, memories: &[ExtractedMemory]) -> anyhow::Result<()>;
}

const HIGH_VALUE_TYPES: [MemoryType; 3] = [MemoryType::Decision, MemoryType::Fact, MemoryType::Preference];

fn idempotency_key(context: &CompactionContext, message_ids: &[String]) -> String {
    let mut sorted_ids = message_ids.to_vec();
    sorted_ids.sort();
    let mut hasher = Sha256::new();
    hasher.update(sorted_ids.join(",").as_bytes());
    let digest = hasher.finalize();
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    format!("{}:{}:{}", context.conversation_id, context.truncation_point, hex)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreservationResult {
    pub extracted_count: usize,
    pub skipped_duplicates: usize,
}

/// Tracks idempotency keys already processed across calls, owned by the
/// caller (one instance per daemon process per spec §5's ownership rule).
#[derive(Debug, Default)]
pub struct PreservationHook {
    seen_keys: HashSet<String>,
}

impl PreservationHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the hook once for a single compaction event (spec §4.8).
    pub async fn run(
        &mut self,
        extractor: &dyn SessionExtractor,
        context: &CompactionContext,
        message_ids: &[String],
    ) -> Result<PreservationResult> {
        let key = idempotency_key(context, message_ids);
        if self.seen_keys.contains(&key) {
            return Ok(PreservationResult {
                extracted_count: 0,
                skipped_duplicates: 1,
            });
        }
        self.seen_keys.insert(key);

        if message_ids.is_empty() {
            return Ok(PreservationResult::default());
        }

        let extracted = extractor
            .extract(context, message_ids)
            .await
            .map_err(MemoryError::CompactionPreservationExtractFailed)?;

        let reason_tag = format!("compaction-reason:{}", context.compaction_reason);
        let truncation_tag = format!("compaction-truncation-point:{}", context.truncation_point);

        let high_value: Vec<ExtractedMemory> = extracted
            .into_iter()
            .filter(|m| HIGH_VALUE_TYPES.contains(&m.kind))
            .map(|mut m| {
                m.tags.insert("source:compaction".to_string());
                m.tags.insert(reason_tag.clone());
                m.tags.insert(truncation_tag.clone());
                m
            })
            .collect();

        extractor
            .persist(&high_value)
            .await
            .map_err(MemoryError::CompactionPreservationPersistFailed)?;

        Ok(PreservationResult {
            extracted_count: high_value.len(),
            skipped_duplicates: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeExtractor {
        to_extract: Vec<ExtractedMemory>,
        persisted: Mutex<Vec<ExtractedMemory>>,
    }

    #[async_trait]
    impl SessionExtractor for FakeExtractor {
        async fn extract(
            &self,
            _context: &CompactionContext,
            _message_ids: &[String],
        ) -> anyhow::Result<Vec<ExtractedMemory>> {
            Ok(self.to_extract.clone())
        }

        async fn persist(&self, memories: &[ExtractedMemory]) -> anyhow::Result<()> {
            self.persisted.lock().unwrap().extend(memories.iter().cloned());
            Ok(())
        }
    }

    fn context() -> CompactionContext {
        CompactionContext {
            conversation_id: "conv-1".to_string(),
            session_id: "session-1".to_string(),
            compaction_reason: "context_limit".to_string(),
            timestamp: Utc::now(),
            truncation_point: 50,
        }
    }

    #[tokio::test]
    async fn filters_to_high_value_categories_and_tags() {
        let extractor = FakeExtractor {
            to_extract: vec![
                ExtractedMemory {
                    kind: MemoryType::Decision,
                    content: "Decided to use Postgres".to_string(),
                    confidence: 0.9,
                    tags: Default::default(),
                },
                ExtractedMemory {
                    kind: MemoryType::Episode,
                    content: "Had a long chat about weather".to_string(),
                    confidence: 0.5,
                    tags: Default::default(),
                },
            ],
            persisted: Mutex::new(vec![]),
        };
        let mut hook = PreservationHook::new();

        let result = hook
            .run(&extractor, &context(), &["m1".to_string(), "m2".to_string()])
            .await
            .unwrap();

        assert_eq!(result.extracted_count, 1);
        let persisted = extractor.persisted.lock().unwrap();
        assert_eq!(persisted.len(), 1);
        assert!(persisted[0].tags.contains("source:compaction"));
        assert!(persisted[0].tags.contains("compaction-reason:context_limit"));
        assert!(persisted[0].tags.contains("compaction-truncation-point:50"));
    }

    #[tokio::test]
    async fn repeated_call_with_same_key_is_a_noop() {
        let extractor = FakeExtractor {
            to_extract: vec![ExtractedMemory {
                kind: MemoryType::Fact,
                content: "x".to_string(),
                confidence: 0.9,
                tags: Default::default(),
            }],
            persisted: Mutex::new(vec![]),
        };
        let mut hook = PreservationHook::new();
        let ctx = context();
        let ids = vec!["m1".to_string()];

        hook.run(&extractor, &ctx, &ids).await.unwrap();
        let second = hook.run(&extractor, &ctx, &ids).await.unwrap();

        assert_eq!(second.skipped_duplicates, 1);
        assert_eq!(second.extracted_count, 0);
        assert_eq!(extractor.persisted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_message_set_is_a_noop_but_records_key() {
        let extractor = FakeExtractor {
            to_extract: vec![],
            persisted: Mutex::new(vec![]),
        };
        let mut hook = PreservationHook::new();
        let ctx = context();

        let result = hook.run(&extractor, &ctx, &[]).await.unwrap();
        assert_eq!(result, PreservationResult::default());

        let second = hook.run(&extractor, &ctx, &[]).await.unwrap();
        assert_eq!(second.skipped_duplicates, 1);
    }
}
