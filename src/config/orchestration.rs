//! Orchestration options: persistence, checkpointing, sampling and retries.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Options that govern how completions are orchestrated.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrationConfig {
    /// Store threads durably (or at least for the process lifetime).
    #[serde(default = "default_true")]
    pub enable_persistence: bool,

    /// Allow rewinding working state. Defaults to `enable_persistence`.
    #[serde(default)]
    pub enable_time_travel: Option<bool>,

    /// Take an automatic checkpoint every N interactions.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,

    /// Provider to activate when it initializes successfully.
    #[serde(default = "default_preferred_provider")]
    pub preferred_provider: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Deadline for a single provider attempt.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt, for retryable errors only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// How many recent interactions are merged into each prompt.
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Interactions kept in memory per thread.
    #[serde(default = "default_history_cache_limit")]
    pub history_cache_limit: usize,

    /// Threads kept in memory before idle ones are evicted.
    #[serde(default = "default_thread_cache_limit")]
    pub thread_cache_limit: usize,

    /// Try other ready providers once the active one exhausts its retries.
    #[serde(default = "default_true")]
    pub enable_fallback: bool,
}

impl OrchestrationConfig {
    /// Effective time-travel setting.
    pub fn time_travel_enabled(&self) -> bool {
        self.enable_persistence && self.enable_time_travel.unwrap_or(self.enable_persistence)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// Validate orchestration options
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.checkpoint_interval == 0 {
            return Err(ValidationError::MustBePositive {
                field: "checkpoint_interval",
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) || self.temperature.is_nan() {
            return Err(ValidationError::TemperatureOutOfRange(self.temperature));
        }
        if self.max_tokens == 0 {
            return Err(ValidationError::MustBePositive { field: "max_tokens" });
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::MustBePositive { field: "timeout_ms" });
        }
        if self.context_window == 0 {
            return Err(ValidationError::MustBePositive {
                field: "context_window",
            });
        }
        if self.history_cache_limit == 0 {
            return Err(ValidationError::MustBePositive {
                field: "history_cache_limit",
            });
        }
        if self.thread_cache_limit == 0 {
            return Err(ValidationError::MustBePositive {
                field: "thread_cache_limit",
            });
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ValidationError::InvalidBackoff);
        }
        if !self.enable_persistence && self.enable_time_travel == Some(true) {
            return Err(ValidationError::TimeTravelRequiresPersistence);
        }
        Ok(())
    }
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            enable_persistence: true,
            enable_time_travel: None,
            checkpoint_interval: default_checkpoint_interval(),
            preferred_provider: default_preferred_provider(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            context_window: default_context_window(),
            history_cache_limit: default_history_cache_limit(),
            thread_cache_limit: default_thread_cache_limit(),
            enable_fallback: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_checkpoint_interval() -> u32 {
    5
}

fn default_preferred_provider() -> Option<String> {
    Some("openai".to_string())
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    8_000
}

fn default_context_window() -> usize {
    3
}

fn default_history_cache_limit() -> usize {
    100
}

fn default_thread_cache_limit() -> usize {
    32
}
