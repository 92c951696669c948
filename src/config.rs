use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds for one ReAct search loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactLimits {
    pub max_iterations: u32,
    /// FINISH is rejected while fewer unique results than this are collected.
    pub min_results: usize,
    /// The loop stops once this many unique results are collected.
    pub result_cap: usize,
    pub results_per_search: usize,
}

impl ReactLimits {
    pub const fn new(
        max_iterations: u32,
        min_results: usize,
        result_cap: usize,
        results_per_search: usize,
    ) -> Self {
        Self {
            max_iterations,
            min_results,
            result_cap,
            results_per_search,
        }
    }
}

/// Retry policy for schema-constrained calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Single attempt, no backoff.
    pub const fn once() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Backoff before retry number `attempt + 1`: `base_delay * 2^attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

/// Section summarizer tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SasConfig {
    pub long_section_words: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_retries: u32,
    pub content_window: usize,
    pub window_decrement: usize,
    pub retry_pause: Duration,
    /// Pause between successive sections to stay under provider rate limits.
    pub section_delay: Duration,
}

impl Default for SasConfig {
    fn default() -> Self {
        Self {
            long_section_words: 1500,
            chunk_size: 10_000,
            chunk_overlap: 500,
            max_retries: 3,
            content_window: 30_000,
            window_decrement: 5_000,
            retry_pause: Duration::from_secs(2),
            section_delay: Duration::from_secs(10),
        }
    }
}

impl SasConfig {
    /// Character window for a given attempt. Never shrinks below one decrement.
    pub fn window_for_attempt(&self, attempt: u32) -> usize {
        let shrink = self.window_decrement.saturating_mul(attempt as usize);
        self.content_window
            .saturating_sub(shrink)
            .max(self.window_decrement.max(1))
    }
}

/// Every tunable of the analysis core. Cloned as a snapshot at the start of each run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub web_research: ReactLimits,
    pub comparative: ReactLimits,
    pub deep_dive: ReactLimits,
    pub citation_seed_count: usize,
    pub citation_seed_results: usize,
    pub sas: SasConfig,
    pub final_synthesis_retries: u32,
    pub structured: RetryPolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            web_research: ReactLimits::new(8, 15, 30, 7),
            comparative: ReactLimits::new(5, 5, 15, 5),
            deep_dive: ReactLimits::new(5, 0, 15, 3),
            citation_seed_count: 3,
            citation_seed_results: 2,
            sas: SasConfig::default(),
            final_synthesis_retries: 3,
            structured: RetryPolicy::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_f64("SECTION_DELAY_SECS") {
            config.sas.section_delay = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = env_f64("RETRY_PAUSE_SECS") {
            config.sas.retry_pause = Duration::from_secs_f64(secs);
        }
        config
    }
}

/// Process-level settings outside the analysis core.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub log_level: tracing::Level,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = dotenv::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/sessions"));
        let log_level = dotenv::var("LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(tracing::Level::DEBUG);
        Self {
            data_dir,
            log_level,
        }
    }
}

pub(crate) fn env_f64(key: &str) -> Option<f64> {
    dotenv::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
}
