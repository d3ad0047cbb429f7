//! Memory lookup (C2, spec §4.2) — lexical duplicate detection and
//! polarity-aware contradiction detection over a read-only LTM snapshot.

use std::collections::BTreeSet;

use crate::schema::{DistilledFact, MemoryLayer, MemoryRecord};

const GENERIC_ENTITIES: &[&str] = &["user", "assistant", "system", "me"];
const NEGATION_TOKENS: &[&str] = &[
    "not", "never", "no", "cannot", "don't", "doesn't", "won't", "dislike",
];

/// Lowercase, strip non-alphanumerics to spaces, collapse whitespace.
pub fn normalize_content(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for ch in content.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn tokenize_whitespace(content: &str) -> BTreeSet<String> {
    normalize_content(content)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity over whitespace-split tokens of already-normalized text.
pub fn jaccard_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f32 / union as f32
}

fn eligible(record: &MemoryRecord, fact_type: crate::schema::MemoryType) -> bool {
    record.kind == fact_type && record.layer == MemoryLayer::Ltm && !record.is_inert()
}

/// First LTM record matching `fact` by normalized-content equality, or whose
/// token Jaccard similarity is `>= similarity_threshold` (spec §4.2).
pub fn find_duplicate<'a>(
    fact: &DistilledFact,
    records: &'a [MemoryRecord],
    similarity_threshold: f32,
) -> Option<&'a MemoryRecord> {
    let normalized_fact = normalize_content(&fact.content);
    let fact_tokens = tokenize_whitespace(&fact.content);

    records.iter().find(|record| {
        if !eligible(record, fact.kind) {
            return false;
        }
        let normalized_record = normalize_content(&record.content);
        if normalized_record == normalized_fact {
            return true;
        }
        let record_tokens = tokenize_whitespace(&record.content);
        jaccard_similarity(&fact_tokens, &record_tokens) >= similarity_threshold
    })
}

/// Drop apostrophes (straight and curly) before the general normalizer runs,
/// so a contraction like "doesn't" collapses to the single token "doesnt"
/// instead of being split in two by `normalize_content`'s punctuation-to-space
/// rule. Only used for negation-token matching.
fn strip_apostrophes(content: &str) -> String {
    content.chars().filter(|c| *c != '\'' && *c != '\u{2019}').collect()
}

fn has_negation(content: &str) -> bool {
    let normalized = normalize_content(&strip_apostrophes(content));
    let tokens: BTreeSet<&str> = normalized.split_whitespace().collect();
    NEGATION_TOKENS.iter().any(|token| {
        let normalized_token = normalize_content(&strip_apostrophes(token));
        tokens.contains(normalized_token.as_str())
    })
}

fn shares_non_generic_entity_or_tag(fact: &DistilledFact, record: &MemoryRecord) -> bool {
    let shares_entity = fact.entities.iter().any(|e| {
        let lower = e.to_lowercase();
        !GENERIC_ENTITIES.contains(&lower.as_str()) && record.entities.contains(e)
    });
    if shares_entity {
        return true;
    }
    fact.tags.iter().any(|t| record.tags.contains(t))
}

/// Every LTM record that is a contradiction candidate for `fact` (spec §4.2).
pub fn find_contradictions<'a>(
    fact: &DistilledFact,
    records: &'a [MemoryRecord],
) -> Vec<&'a MemoryRecord> {
    let normalized_fact = normalize_content(&fact.content);
    let fact_tokens = tokenize_whitespace(&fact.content);
    let fact_has_negation = has_negation(&fact.content);

    records
        .iter()
        .filter(|record| {
            if !eligible(record, fact.kind) {
                return false;
            }
            if normalize_content(&record.content) == normalized_fact {
                return false;
            }
            if !shares_non_generic_entity_or_tag(fact, record) {
                return false;
            }

            let record_has_negation = has_negation(&record.content);
            let differs_in_polarity = fact_has_negation != record_has_negation;
            if differs_in_polarity {
                return true;
            }

            let record_tokens = tokenize_whitespace(&record.content);
            jaccard_similarity(&fact_tokens, &record_tokens) >= 0.5
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MemoryLayer, MemoryType, Provenance, SourceType};
    use chrono::Utc;
    use uuid::Uuid;

    fn record(content: &str, kind: MemoryType, entities: &[&str], tags: &[&str]) -> MemoryRecord {
        let now = Utc::now();
        MemoryRecord {
            id: Uuid::new_v4(),
            content: content.to_string(),
            kind,
            layer: MemoryLayer::Ltm,
            tags: tags.iter().map(|s| s.to_string()).collect(),
            entities: entities.iter().map(|s| s.to_string()).collect(),
            importance: 0.5,
            confidence: 0.8,
            provenance: Provenance {
                source_type: SourceType::Consolidation,
                conversation_id: None,
            },
            supersedes: None,
            superseded_by: None,
            created_at: now,
            updated_at: now,
            accessed_at: now,
        }
    }

    fn fact(content: &str, kind: MemoryType, entities: &[&str], tags: &[&str]) -> DistilledFact {
        DistilledFact {
            kind,
            content: content.to_string(),
            confidence: 0.9,
            source_candidate_ids: vec!["r1".to_string()],
            entities: entities.iter().map(|s| s.to_string()).collect(),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            reasoning: "x".to_string(),
        }
    }

    #[test]
    fn find_duplicate_matches_after_normalization() {
        let records = vec![record(
            "User likes TypeScript!!",
            MemoryType::Preference,
            &["user"],
            &[],
        )];
        let f = fact("user likes typescript", MemoryType::Preference, &["user"], &[]);
        assert!(find_duplicate(&f, &records, 1.0).is_some());
    }

    #[test]
    fn find_duplicate_skips_inert_records() {
        let mut r = record("User likes TypeScript", MemoryType::Preference, &["user"], &[]);
        r.superseded_by = Some(Uuid::new_v4());
        let f = fact("user likes typescript", MemoryType::Preference, &["user"], &[]);
        assert!(find_duplicate(&f, &[r], 1.0).is_none());
    }

    #[test]
    fn find_duplicate_respects_similarity_threshold() {
        let records = vec![record(
            "User really likes TypeScript a lot",
            MemoryType::Preference,
            &["user"],
            &[],
        )];
        let f = fact("user likes typescript", MemoryType::Preference, &["user"], &[]);
        assert!(find_duplicate(&f, &records, 1.0).is_none());
        assert!(find_duplicate(&f, &records, 0.3).is_some());
    }

    #[test]
    fn find_contradictions_detects_polarity_flip() {
        let records = vec![record(
            "User does not like morning standups",
            MemoryType::Preference,
            &["user", "meeting"],
            &[],
        )];
        let f = fact(
            "User likes morning standups",
            MemoryType::Preference,
            &["user", "meeting"],
            &[],
        );
        let contradictions = find_contradictions(&f, &records);
        assert_eq!(contradictions.len(), 1);
    }

    #[test]
    fn find_contradictions_detects_contraction_polarity_flip() {
        let records = vec![record(
            "User doesn't like morning standups",
            MemoryType::Preference,
            &["user", "meeting"],
            &[],
        )];
        let f = fact(
            "User likes morning standups",
            MemoryType::Preference,
            &["user", "meeting"],
            &[],
        );
        let contradictions = find_contradictions(&f, &records);
        assert_eq!(contradictions.len(), 1);
    }

    #[test]
    fn find_contradictions_requires_shared_entity_or_tag() {
        let records = vec![record(
            "User does not like pizza",
            MemoryType::Preference,
            &["pizza"],
            &[],
        )];
        let f = fact(
            "User likes sushi",
            MemoryType::Preference,
            &["sushi"],
            &[],
        );
        assert!(find_contradictions(&f, &records).is_empty());
    }

    #[test]
    fn find_contradictions_ignores_generic_entities_for_overlap() {
        let records = vec![record(
            "User does not like pizza",
            MemoryType::Preference,
            &["user"],
            &[],
        )];
        let f = fact("User likes sushi", MemoryType::Preference, &["user"], &[]);
        // Only shared entity is the generic "user" — no contradiction.
        assert!(find_contradictions(&f, &records).is_empty());
    }

    #[test]
    fn find_contradictions_high_overlap_without_negation() {
        let records = vec![record(
            "User prefers milestone based planning",
            MemoryType::Preference,
            &["user"],
            &["planning"],
        )];
        let f = fact(
            "User prefers milestone based plans",
            MemoryType::Preference,
            &["user"],
            &["planning"],
        );
        assert_eq!(find_contradictions(&f, &records).len(), 1);
    }
}
