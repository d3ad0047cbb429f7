//! Typed configuration for the memory pipeline and its background jobs.
//!
//! Mirrors the daemon's existing config layer: one struct per concern, every
//! field defaulted via `#[serde(default)]` so a partial TOML file still
//! loads, and a single [`PipelineConfig::load_from`] / [`save_to`] pair for
//! the whole tree.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config TOML: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid scorer config: {0}")]
    InvalidScorer(String),
}

/// Knobs for the importance scorer (spec §4.1, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub min_importance: f32,
    pub max_importance: f32,
    pub reinforcement_boost: f32,
    pub decay_rate: f32,
    pub decay_window_ms: i64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            min_importance: 0.0,
            max_importance: 1.0,
            reinforcement_boost: 0.2,
            decay_rate: 0.08,
            decay_window_ms: 7 * 24 * 60 * 60 * 1000,
        }
    }
}

impl ScorerConfig {
    /// Validate the construction invariants from spec §4.1. Called eagerly by
    /// [`PipelineConfig::validate`] and by `ImportanceScorer::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_importance >= 0.0
            && self.min_importance < self.max_importance
            && self.max_importance <= 1.0)
        {
            return Err(ConfigError::InvalidScorer(format!(
                "require 0 <= min < max <= 1, got min={}, max={}",
                self.min_importance, self.max_importance
            )));
        }
        if self.reinforcement_boost < 0.0 {
            return Err(ConfigError::InvalidScorer(
                "reinforcement_boost must be >= 0".to_string(),
            ));
        }
        if self.decay_rate < 0.0 {
            return Err(ConfigError::InvalidScorer("decay_rate must be >= 0".to_string()));
        }
        if self.decay_window_ms <= 0 {
            return Err(ConfigError::InvalidScorer(
                "decay_window_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Knobs for the STM selector (spec §4.4, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub batch_size: usize,
    pub dedupe_window_ms: i64,
    pub max_retries: u32,
    pub min_age_ms: i64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            dedupe_window_ms: 30 * 60 * 1000,
            max_retries: 3,
            min_age_ms: 5 * 60 * 1000,
        }
    }
}

/// Knobs for the distillation engine (spec §4.5, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistillationConfig {
    pub confidence_threshold: f32,
    pub max_facts_per_batch: usize,
}

impl Default for DistillationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            max_facts_per_batch: 25,
        }
    }
}

/// Knobs for the merge engine (spec §4.6, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub min_confidence_to_merge: f32,
    pub similarity_threshold: f32,
    pub max_supersession_chain_depth: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_confidence_to_merge: 0.5,
            similarity_threshold: 1.0,
            max_supersession_chain_depth: 8,
        }
    }
}

/// Retry/backoff policy for the consolidation runner (spec §4.7, §6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

/// Per-job schedule (spec §6 `schedule.intervalMs`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub interval_ms: i64,
}

impl ScheduleConfig {
    pub fn consolidation_default() -> Self {
        Self {
            enabled: true,
            interval_ms: 6 * 60 * 60 * 1000,
        }
    }

    pub fn briefing_default() -> Self {
        Self {
            enabled: true,
            interval_ms: 24 * 60 * 60 * 1000,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::consolidation_default()
    }
}

/// Knobs for the morning briefing service (spec §4.9, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefingConfig {
    pub topic_filters: Vec<String>,
    pub max_sections: usize,
    pub max_items_per_section: usize,
    pub lookback_window_ms: i64,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self {
            topic_filters: Vec::new(),
            max_sections: 4,
            max_items_per_section: 5,
            lookback_window_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Schedules for both background jobs (spec §6, §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub consolidation_schedule: ScheduleConfig,
    pub briefing_schedule: ScheduleConfig,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            consolidation_schedule: ScheduleConfig::consolidation_default(),
            briefing_schedule: ScheduleConfig::briefing_default(),
        }
    }
}

/// Top-level configuration tree for the memory pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scorer: ScorerConfig,
    pub selector: SelectorConfig,
    pub distillation: DistillationConfig,
    pub merge: MergeConfig,
    pub retry_policy: RetryPolicyConfig,
    pub jobs: JobsConfig,
    pub briefing: BriefingConfig,
}

impl PipelineConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scorer.validate()
    }
}
