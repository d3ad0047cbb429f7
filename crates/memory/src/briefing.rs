//! Morning briefing service (C9, spec §4.9) — assembles a typed [`Briefing`]
//! from LTM for daily delivery.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reins_config::BriefingConfig;

use crate::error::{MemoryError, Result};
use crate::schema::{Briefing, BriefingItem, BriefingSection, MemoryRecord, MemoryType, SectionType};

/// Search access to the LTM tier, injected per spec's "concrete memory
/// store" non-goal.
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    async fn search_by_type(
        &self,
        types: &[MemoryType],
        min_importance: f32,
        since: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<MemoryRecord>>;

    async fn search_by_tags(&self, tags: &[&str], since: DateTime<Utc>, limit: usize) -> anyhow::Result<Vec<MemoryRecord>>;

    async fn list_all(&self) -> anyhow::Result<Vec<MemoryRecord>>;
}

struct SectionSpec {
    section_type: SectionType,
    title: &'static str,
    types: &'static [MemoryType],
    min_importance: f32,
    extra_tags: &'static [&'static str],
}

const SECTIONS: &[SectionSpec] = &[
    SectionSpec {
        section_type: SectionType::OpenThreads,
        title: "Open Threads",
        types: &[MemoryType::Episode, MemoryType::Fact],
        min_importance: 0.3,
        extra_tags: &["action-item", "todo", "unresolved", "follow-up", "open"],
    },
    SectionSpec {
        section_type: SectionType::HighImportance,
        title: "High Importance",
        types: &[
            MemoryType::Fact,
            MemoryType::Preference,
            MemoryType::Skill,
            MemoryType::Entity,
        ],
        min_importance: 0.7,
        extra_tags: &[],
    },
    SectionSpec {
        section_type: SectionType::RecentDecisions,
        title: "Recent Decisions",
        types: &[MemoryType::Decision],
        min_importance: 0.4,
        extra_tags: &[],
    },
    SectionSpec {
        section_type: SectionType::Upcoming,
        title: "Upcoming",
        types: &[MemoryType::Episode, MemoryType::Fact],
        min_importance: 0.3,
        extra_tags: &["upcoming", "deadline", "scheduled", "reminder", "time-sensitive"],
    },
];

const STALE_AFTER_DAYS: i64 = 90;

fn matches_topic_filters(record: &MemoryRecord, topic_filters: &[String]) -> bool {
    if topic_filters.is_empty() {
        return true;
    }
    let lowered: HashSet<String> = record.tags.iter().map(|t| t.to_lowercase()).collect();
    topic_filters
        .iter()
        .any(|filter| lowered.contains(&filter.to_lowercase()))
}

async fn build_section(
    provider: &dyn RetrievalProvider,
    spec: &SectionSpec,
    config: &BriefingConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<BriefingSection> {
    let since = now - Duration::milliseconds(config.lookback_window_ms);
    let limit = config.max_items_per_section * 3;

    let mut records = provider
        .search_by_type(spec.types, spec.min_importance, since, limit)
        .await?;

    if !spec.extra_tags.is_empty() {
        let by_tag = provider.search_by_tags(spec.extra_tags, since, limit).await?;
        records.extend(by_tag);
    }

    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.id));
    records.retain(|r| matches_topic_filters(r, &config.topic_filters));
    records.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap());
    records.truncate(config.max_items_per_section);

    let items: Vec<BriefingItem> = records
        .into_iter()
        .map(|r| BriefingItem {
            content: r.content,
            kind: r.kind,
            importance: r.importance,
            source: format!("{:?}", r.provenance.source_type).to_lowercase(),
            timestamp: r.created_at,
        })
        .collect();

    Ok(BriefingSection {
        section_type: spec.section_type,
        title: spec.title.to_string(),
        item_count: items.len(),
        items,
    })
}

async fn build_health_check_section(
    provider: &dyn RetrievalProvider,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<BriefingSection>> {
    let all = provider.list_all().await?;
    let cutoff = now - Duration::days(STALE_AFTER_DAYS);

    let mut stale: Vec<&MemoryRecord> = all.iter().filter(|r| r.accessed_at < cutoff).collect();
    if stale.is_empty() {
        return Ok(None);
    }
    stale.sort_by_key(|r| r.accessed_at);
    let oldest = stale[0];
    let preview: String = oldest.content.chars().take(60).collect();

    let item = BriefingItem {
        content: format!("{} memories haven't been touched in 90+ days. Oldest: \"{}\"", stale.len(), preview),
        kind: MemoryType::Fact,
        importance: 0.5,
        source: "health_check".to_string(),
        timestamp: now,
    };

    Ok(Some(BriefingSection {
        section_type: SectionType::HealthCheck,
        title: "Health Check".to_string(),
        item_count: 1,
        items: vec![item],
    }))
}

pub async fn build_briefing(
    provider: &dyn RetrievalProvider,
    config: &BriefingConfig,
    now: DateTime<Utc>,
) -> Result<Briefing> {
    let start = now;
    let mut sections = Vec::new();

    for spec in SECTIONS {
        let section = build_section(provider, spec, config, now)
            .await
            .map_err(MemoryError::BriefingRetrievalFailed)?;
        if !section.items.is_empty() {
            sections.push(section);
        }
    }

    if let Some(health) = build_health_check_section(provider, now)
        .await
        .map_err(MemoryError::BriefingRetrievalFailed)?
    {
        sections.push(health);
    }

    let total_items = sections.iter().map(|s| s.item_count).sum();

    Ok(Briefing {
        timestamp: start,
        sections,
        total_items,
        generated_in_ms: (Utc::now() - start).num_milliseconds(),
    })
}
