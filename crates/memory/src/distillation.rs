//! Distillation engine (C5, spec §4.5) — renders the consolidation prompt,
//! calls the injected LLM provider, and applies confidence/quota policy to
//! the validated facts that come back.

use async_trait::async_trait;
use reins_config::DistillationConfig;
use uuid::Uuid;

use crate::distill_schema::validate_response;
use crate::error::{MemoryError, Result};
use crate::schema::{ConsolidationCandidate, DistilledFact, MemoryRecord};

/// A single call out to an LLM, injected so this crate never depends on a
/// concrete provider (spec's "concrete LLM provider" is explicitly out of
/// scope).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistillationOutcome {
    pub facts: Vec<DistilledFact>,
    pub failed_candidate_ids: Vec<Uuid>,
    pub invalid_count: usize,
    pub warnings: Vec<String>,
}

/// Render one candidate line per spec §4.5 step 2: id, type, confidence,
/// importance, creation time, provenance source, tags, entities, and
/// whitespace-sanitized content.
fn render_candidate_line(record: &MemoryRecord) -> String {
    let tags = if record.tags.is_empty() {
        "none".to_string()
    } else {
        record.tags.iter().cloned().collect::<Vec<_>>().join(",")
    };
    let entities = if record.entities.is_empty() {
        "none".to_string()
    } else {
        record.entities.iter().cloned().collect::<Vec<_>>().join(",")
    };
    format!(
        "- [{id}] type={kind:?} confidence={confidence} importance={importance} createdAt={created_at} source={source:?} tags={tags} entities={entities} :: {content}",
        id = record.id,
        kind = record.kind,
        confidence = record.confidence,
        importance = record.importance,
        created_at = record.created_at.to_rfc3339(),
        source = record.provenance.source_type,
        tags = tags,
        entities = entities,
        content = crate::schema::normalize_whitespace(record.content.trim()),
    )
}

/// Render the consolidation prompt template (spec §4.5), substituting
/// `{{confidenceThreshold}}`, `{{maxFactsPerBatch}}` and `{{candidates}}`.
pub fn render_prompt(template: &str, config: &DistillationConfig, records: &[MemoryRecord]) -> String {
    let candidates_block = records
        .iter()
        .map(render_candidate_line)
        .collect::<Vec<_>>()
        .join("\n");

    template
        .replace("{{confidenceThreshold}}", &config.confidence_threshold.to_string())
        .replace("{{maxFactsPerBatch}}", &config.max_facts_per_batch.to_string())
        .replace("{{candidates}}", &candidates_block)
}

pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
Extract durable facts worth remembering from the conversation excerpts below.
Only include facts with confidence >= {{confidenceThreshold}}.
Return at most {{maxFactsPerBatch}} facts as a JSON array.

Excerpts:
{{candidates}}
";

/// Call the provider on the rendered prompt, validate its response, then
/// apply the confidence-threshold drop and max-facts-per-batch cap (spec
/// §4.5: facts below threshold are dropped; over-quota responses are capped
/// by truncating to the highest-confidence facts).
pub async fn distill(
    provider: &dyn LlmProvider,
    config: &DistillationConfig,
    candidates: &[ConsolidationCandidate],
    records: &[MemoryRecord],
) -> Result<DistillationOutcome> {
    let prompt = render_prompt(DEFAULT_PROMPT_TEMPLATE, config, records);

    let raw_response = provider
        .complete(&prompt)
        .await
        .map_err(MemoryError::DistillationProviderFailed)?;

    let validated = validate_response(&raw_response);
    let mut warnings = validated.warnings;

    let batch_ids: std::collections::HashSet<String> =
        candidates.iter().map(|c| c.record_id.to_string()).collect();

    // §9 note 2: never trust the provider for source IDs — any fact citing
    // an id outside this batch is rejected outright, with a warning.
    let mut facts: Vec<DistilledFact> = validated
        .facts
        .into_iter()
        .filter(|fact| {
            if fact.confidence < config.confidence_threshold {
                warnings.push(format!(
                    "dropped fact below confidence threshold ({} < {})",
                    fact.confidence, config.confidence_threshold
                ));
                return false;
            }
            let all_in_batch = fact
                .source_candidate_ids
                .iter()
                .all(|id| batch_ids.contains(id));
            if !all_in_batch {
                warnings.push(format!(
                    "dropped fact citing sourceCandidateIds outside the batch: {:?}",
                    fact.source_candidate_ids
                ));
                return false;
            }
            true
        })
        .collect();

    facts.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());
    if facts.len() > config.max_facts_per_batch {
        warnings.push(format!(
            "truncated {} facts down to maxFactsPerBatch={}",
            facts.len(),
            config.max_facts_per_batch
        ));
        facts.truncate(config.max_facts_per_batch);
    }

    let consolidated_candidate_ids: std::collections::HashSet<&str> = facts
        .iter()
        .flat_map(|fact| fact.source_candidate_ids.iter().map(String::as_str))
        .collect();

    let failed_candidate_ids = candidates
        .iter()
        .filter(|candidate| !consolidated_candidate_ids.contains(candidate.record_id.to_string().as_str()))
        .map(|candidate| candidate.record_id)
        .collect();

    Ok(DistillationOutcome {
        facts,
        failed_candidate_ids,
        invalid_count: validated.invalid_count,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MemoryLayer, MemoryType, Provenance, SourceType};
    use chrono::Utc;

    struct FakeProvider(String);

    #[async_trait]
    impl LlmProvider for FakeProvider {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("provider unavailable")
        }
    }

    fn record() -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            id: Uuid::new_v4(),
            content: "User mentioned they prefer async code reviews".to_string(),
            kind: MemoryType::Preference,
            layer: MemoryLayer::Stm,
            tags: Default::default(),
            entities: Default::default(),
            importance: 0.5,
            confidence: 0.5,
            provenance: Provenance {
                source_type: SourceType::Conversation,
                conversation_id: None,
            },
            supersedes: None,
            superseded_by: None,
            created_at: now,
            updated_at: now,
            accessed_at: now,
        }
    }

    #[test]
    fn render_prompt_substitutes_all_placeholders() {
        let config = DistillationConfig::default();
        let rendered = render_prompt(DEFAULT_PROMPT_TEMPLATE, &config, &[record()]);
        assert!(!rendered.contains("{{"));
        assert!(rendered.contains("0.5"));
        assert!(rendered.contains("async code reviews"));
    }

    #[tokio::test]
    async fn drops_facts_below_confidence_threshold() {
        let r = record();
        let candidate = ConsolidationCandidate::new(r.id);
        let response = format!(
            r#"[{{"type":"preference","content":"x","confidence":0.1,"sourceCandidateIds":["{}"],"reasoning":"mentioned once"}}]"#,
            r.id
        );
        let provider = FakeProvider(response);
        let config = DistillationConfig::default();

        let outcome = distill(&provider, &config, &[candidate], &[r]).await.unwrap();
        assert!(outcome.facts.is_empty());
    }

    #[tokio::test]
    async fn caps_to_max_facts_keeping_highest_confidence() {
        let r = record();
        let candidate = ConsolidationCandidate::new(r.id);
        let response = format!(
            r#"[
                {{"type":"fact","content":"a","confidence":0.6,"sourceCandidateIds":["{id}"],"reasoning":"mentioned once"}},
                {{"type":"fact","content":"b","confidence":0.9,"sourceCandidateIds":["{id}"],"reasoning":"mentioned once"}},
                {{"type":"fact","content":"c","confidence":0.7,"sourceCandidateIds":["{id}"],"reasoning":"mentioned once"}}
            ]"#,
            id = r.id
        );
        let provider = FakeProvider(response);
        let mut config = DistillationConfig::default();
        config.max_facts_per_batch = 2;

        let outcome = distill(&provider, &config, &[candidate], &[r]).await.unwrap();
        assert_eq!(outcome.facts.len(), 2);
        assert_eq!(outcome.facts[0].content, "b");
        assert_eq!(outcome.facts[1].content, "c");
    }

    #[tokio::test]
    async fn computes_failed_candidate_ids_for_uncovered_candidates() {
        let r1 = record();
        let r2 = record();
        let candidate1 = ConsolidationCandidate::new(r1.id);
        let candidate2 = ConsolidationCandidate::new(r2.id);
        let response = format!(
            r#"[{{"type":"fact","content":"a","confidence":0.9,"sourceCandidateIds":["{}"],"reasoning":"mentioned once"}}]"#,
            r1.id
        );
        let provider = FakeProvider(response);
        let config = DistillationConfig::default();

        let outcome = distill(&provider, &config, &[candidate1, candidate2], &[r1, r2])
            .await
            .unwrap();
        assert_eq!(outcome.failed_candidate_ids, vec![r2.id]);
    }

    #[tokio::test]
    async fn rejects_fact_citing_source_id_outside_batch() {
        let r = record();
        let candidate = ConsolidationCandidate::new(r.id);
        let outside_id = Uuid::new_v4();
        let response = format!(
            r#"[{{"type":"fact","content":"a","confidence":0.9,"sourceCandidateIds":["{}"],"reasoning":"mentioned once"}}]"#,
            outside_id
        );
        let provider = FakeProvider(response);
        let config = DistillationConfig::default();

        let outcome = distill(&provider, &config, &[candidate], &[r]).await.unwrap();
        assert!(outcome.facts.is_empty());
        assert!(outcome.warnings.iter().any(|w| w.contains("outside the batch")));
    }

    #[tokio::test]
    async fn provider_failure_wraps_as_distillation_provider_failed() {
        let r = record();
        let candidate = ConsolidationCandidate::new(r.id);
        let config = DistillationConfig::default();

        let err = distill(&FailingProvider, &config, &[candidate], &[r])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DISTILLATION_PROVIDER_FAILED");
    }
}
