//! Background job wrappers and cron registration for the memory pipeline.

pub mod briefing_job;
pub mod consolidation_job;
pub mod cron;
pub mod error;

pub use briefing_job::{BriefingRunFn, MorningBriefingJob};
pub use consolidation_job::{ConsolidationRunFn, MemoryConsolidationJob};
pub use cron::{register_memory_cron_jobs, CronHandle};
pub use error::{JobError, Result};
