//! Distillation schema (C3, spec §4.3) — extracting and validating the JSON
//! facts array an LLM provider returns from raw, possibly messy text output.

use std::collections::BTreeSet;

use serde::Deserialize;
use serde_json::Value;

use crate::schema::{DistilledFact, MemoryType};

/// Result of validating one LLM distillation response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationOutcome {
    pub facts: Vec<DistilledFact>,
    pub invalid_count: usize,
    pub warnings: Vec<String>,
}

/// Raw shape accepted straight out of `serde_json`, before field-level
/// validation (trimming, type coercion, confidence clamping).
#[derive(Debug, Deserialize)]
struct RawFact {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: Option<String>,
    confidence: Option<f64>,
    #[serde(default, rename = "sourceCandidateIds")]
    source_candidate_ids: Option<Vec<String>>,
    #[serde(default)]
    entities: Option<Vec<String>>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Extract the JSON payload from raw LLM output (spec §4.3): a fenced
/// ```json ... ``` block takes priority, then a fenced ``` ... ``` block,
/// then the widest `[...]` or `{...}` brace slice in the text.
fn extract_json_slice(raw: &str) -> Option<&str> {
    if let Some(slice) = extract_fenced(raw, "```json") {
        return Some(slice);
    }
    if let Some(slice) = extract_fenced(raw, "```") {
        return Some(slice);
    }
    extract_brace_slice(raw)
}

fn extract_fenced<'a>(raw: &'a str, fence: &str) -> Option<&'a str> {
    let start = raw.find(fence)? + fence.len();
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

fn extract_brace_slice(raw: &str) -> Option<&str> {
    let array_start = raw.find('[');
    let object_start = raw.find('{');

    let (start, open, close) = match (array_start, object_start) {
        (Some(a), Some(o)) if a <= o => (a, '[', ']'),
        (Some(a), None) => (a, '[', ']'),
        (_, Some(o)) => (o, '{', '}'),
        (None, None) => return None,
    };

    let end = raw.rfind(close)?;
    if end < start {
        return None;
    }
    let _ = open;
    Some(raw[start..=end].trim())
}

/// Spec §3 restricts `DistilledFact.type` to `fact | preference | decision |
/// entity` — `episode` and `skill` are valid `MemoryType`s elsewhere in the
/// model (e.g. preservation-hook extractions) but not here.
fn parse_memory_type(raw: &str) -> Option<MemoryType> {
    match raw.trim().to_lowercase().as_str() {
        "fact" => Some(MemoryType::Fact),
        "preference" => Some(MemoryType::Preference),
        "decision" => Some(MemoryType::Decision),
        "entity" => Some(MemoryType::Entity),
        _ => None,
    }
}

fn round_confidence(value: f64) -> f32 {
    ((value * 1000.0).round() / 1000.0) as f32
}

fn validate_one(raw: RawFact, index: usize, warnings: &mut Vec<String>) -> Option<DistilledFact> {
    let kind = match raw.kind.as_deref().and_then(parse_memory_type) {
        Some(kind) => kind,
        None => {
            warnings.push(format!("fact[{index}]: missing or unrecognized type"));
            return None;
        }
    };

    let content = match raw.content.as_deref().map(str::trim) {
        Some(content) if !content.is_empty() => content.to_string(),
        _ => {
            warnings.push(format!("fact[{index}]: missing or empty content"));
            return None;
        }
    };

    let confidence = match raw.confidence {
        Some(value) if (0.0..=1.0).contains(&value) => round_confidence(value),
        Some(value) => {
            warnings.push(format!(
                "fact[{index}]: confidence {value} out of [0,1] range"
            ));
            return None;
        }
        None => {
            warnings.push(format!("fact[{index}]: missing confidence"));
            return None;
        }
    };

    let source_candidate_ids = raw.source_candidate_ids.unwrap_or_default();
    if source_candidate_ids.is_empty() {
        warnings.push(format!("fact[{index}]: missing sourceCandidateIds"));
        return None;
    }

    let entities: BTreeSet<String> = raw
        .entities
        .unwrap_or_default()
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    let tags: BTreeSet<String> = raw
        .tags
        .unwrap_or_default()
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let reasoning = match raw.reasoning.as_deref().map(str::trim) {
        Some(reasoning) if !reasoning.is_empty() => reasoning.to_string(),
        _ => {
            warnings.push(format!("fact[{index}]: missing or empty reasoning"));
            return None;
        }
    };

    Some(DistilledFact {
        kind,
        content,
        confidence,
        source_candidate_ids,
        entities,
        tags,
        reasoning,
    })
}

/// Parse and validate a raw LLM distillation response per spec §4.3.
///
/// Accepts either a bare JSON array of facts or an object with a `facts`
/// array field. A bare array produces no ambiguity warning.
pub fn validate_response(raw: &str) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    let slice = match extract_json_slice(raw) {
        Some(slice) => slice,
        None => {
            outcome
                .warnings
                .push("no JSON payload found in response".to_string());
            return outcome;
        }
    };

    let value: Value = match serde_json::from_str(slice) {
        Ok(value) => value,
        Err(err) => {
            outcome.warnings.push(format!("invalid JSON: {err}"));
            return outcome;
        }
    };

    let raw_facts: Vec<Value> = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("facts") {
            Some(Value::Array(items)) => items,
            _ => {
                outcome
                    .warnings
                    .push("object payload missing a `facts` array".to_string());
                return outcome;
            }
        },
        _ => {
            outcome
                .warnings
                .push("JSON payload is neither an array nor an object".to_string());
            return outcome;
        }
    };

    for (index, item) in raw_facts.into_iter().enumerate() {
        match serde_json::from_value::<RawFact>(item) {
            Ok(raw_fact) => match validate_one(raw_fact, index, &mut outcome.warnings) {
                Some(fact) => outcome.facts.push(fact),
                None => outcome.invalid_count += 1,
            },
            Err(err) => {
                outcome
                    .warnings
                    .push(format!("fact[{index}]: malformed entry: {err}"));
                outcome.invalid_count += 1;
            }
        }
    }

    outcome
}
