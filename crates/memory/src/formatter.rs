//! Briefing formatter (C12, spec §4.12) — renders a [`Briefing`] into typed
//! display messages. No natural-language generation beyond this fixed
//! template, per spec's non-goals.

use crate::schema::{Briefing, SectionType};

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMessage {
    pub section_type: String,
    pub text: String,
}

fn emoji_for(section_type: SectionType) -> &'static str {
    match section_type {
        SectionType::OpenThreads => "📋",
        SectionType::HighImportance => "⚠️",
        SectionType::RecentDecisions => "✅",
        SectionType::Upcoming => "📅",
        SectionType::HealthCheck => "📌",
    }
}

fn section_type_key(section_type: SectionType) -> &'static str {
    match section_type {
        SectionType::OpenThreads => "open_threads",
        SectionType::HighImportance => "high_importance",
        SectionType::RecentDecisions => "recent_decisions",
        SectionType::Upcoming => "upcoming",
        SectionType::HealthCheck => "health_check",
    }
}

const EMPTY_MESSAGE: &str = "Good morning! Nothing to report today.";

pub fn format_briefing(briefing: &Briefing) -> Vec<DisplayMessage> {
    if briefing.sections.is_empty() || briefing.total_items == 0 {
        return vec![DisplayMessage {
            section_type: "empty".to_string(),
            text: EMPTY_MESSAGE.to_string(),
        }];
    }

    let messages: Vec<DisplayMessage> = briefing
        .sections
        .iter()
        .filter(|section| !section.items.is_empty())
        .map(|section| {
            let header = format!("{} {}", emoji_for(section.section_type), section.title);
            let lines: Vec<String> = section
                .items
                .iter()
                .map(|item| {
                    if item.source.is_empty() {
                        format!("• {}", item.content)
                    } else {
                        format!("• {} ({})", item.content, item.source)
                    }
                })
                .collect();
            let text = format!("{header}\n\n{}", lines.join("\n"));
            DisplayMessage {
                section_type: section_type_key(section.section_type).to_string(),
                text,
            }
        })
        .collect();

    if messages.is_empty() {
        return vec![DisplayMessage {
            section_type: "empty".to_string(),
            text: EMPTY_MESSAGE.to_string(),
        }];
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{BriefingItem, BriefingSection, MemoryType};
    use chrono::Utc;

    fn briefing_with(sections: Vec<BriefingSection>) -> Briefing {
        let total_items = sections.iter().map(|s| s.item_count).sum();
        Briefing {
            timestamp: Utc::now(),
            sections,
            total_items,
            generated_in_ms: 0,
        }
    }

    #[test]
    fn empty_briefing_emits_single_message() {
        let briefing = briefing_with(vec![]);
        let messages = format_briefing(&briefing);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].section_type, "empty");
    }

    #[test]
    fn renders_header_and_bulleted_items() {
        let section = BriefingSection {
            section_type: SectionType::RecentDecisions,
            title: "Recent Decisions".to_string(),
            item_count: 1,
            items: vec![BriefingItem {
                content: "Chose Postgres over SQLite".to_string(),
                kind: MemoryType::Decision,
                importance: 0.8,
                source: "consolidation".to_string(),
                timestamp: Utc::now(),
            }],
        };
        let briefing = briefing_with(vec![section]);

        let messages = format_briefing(&briefing);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].text.starts_with("✅ Recent Decisions"));
        assert!(messages[0].text.contains("• Chose Postgres over SQLite (consolidation)"));
    }

    #[test]
    fn item_without_source_has_no_trailing_parens() {
        let section = BriefingSection {
            section_type: SectionType::Upcoming,
            title: "Upcoming".to_string(),
            item_count: 1,
            items: vec![BriefingItem {
                content: "Renew the domain".to_string(),
                kind: MemoryType::Fact,
                importance: 0.5,
                source: String::new(),
                timestamp: Utc::now(),
            }],
        };
        let briefing = briefing_with(vec![section]);

        let messages = format_briefing(&briefing);
        assert_eq!(messages[0].text, "📅 Upcoming\n\n• Renew the domain");
    }

    #[test]
    fn unknown_section_type_falls_back_to_pin_emoji() {
        let section = BriefingSection {
            section_type: SectionType::HealthCheck,
            title: "Health Check".to_string(),
            item_count: 1,
            items: vec![BriefingItem {
                content: "3 stale memories".to_string(),
                kind: MemoryType::Fact,
                importance: 0.5,
                source: "health_check".to_string(),
                timestamp: Utc::now(),
            }],
        };
        let briefing = briefing_with(vec![section]);

        let messages = format_briefing(&briefing);
        assert!(messages[0].text.starts_with("📌 Health Check"));
    }

    #[test]
    fn sections_with_zero_items_are_skipped() {
        let empty_section = BriefingSection {
            section_type: SectionType::OpenThreads,
            title: "Open Threads".to_string(),
            item_count: 0,
            items: vec![],
        };
        let briefing = Briefing {
            timestamp: Utc::now(),
            sections: vec![empty_section],
            total_items: 0,
            generated_in_ms: 0,
        };

        let messages = format_briefing(&briefing);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].section_type, "empty");
    }
}
