//! Engine configuration module
//!
//! Configuration is loaded from environment variables using the `config` and
//! `dotenvy` crates. Variables carry the `CONVO_ENGINE` prefix and nested
//! values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use convo_engine::config::EngineConfig;
//!
//! let config = EngineConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod error;
mod logging;
mod orchestration;
mod persistence;
mod providers;

pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;
pub use orchestration::OrchestrationConfig;
pub use persistence::{PersistenceConfig, PersistenceKind};
pub use providers::{parse_model_list, ProvidersConfig};

use serde::Deserialize;

/// Root engine configuration
///
/// Every section has defaults, so an empty environment yields a usable
/// configuration (in-memory persistence, Ollama only).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Orchestration behavior (persistence, checkpoints, retries)
    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    /// Provider credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Persistence backend selection
    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// # Environment Variable Format
    ///
    /// - `CONVO_ENGINE__ORCHESTRATION__MAX_RETRIES=5` -> `orchestration.max_retries = 5`
    /// - `CONVO_ENGINE__PROVIDERS__OPENAI_API_KEY=...` -> `providers.openai_api_key = ...`
    /// - `CONVO_ENGINE__PERSISTENCE__BACKEND=file` -> `persistence.backend = file`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("CONVO_ENGINE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load and validate in one step.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.orchestration.validate()?;
        self.providers.validate()?;
        self.persistence.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "CONVO_ENGINE__ORCHESTRATION__MAX_RETRIES",
        "CONVO_ENGINE__ORCHESTRATION__ENABLE_PERSISTENCE",
        "CONVO_ENGINE__ORCHESTRATION__ENABLE_TIME_TRAVEL",
        "CONVO_ENGINE__ORCHESTRATION__TEMPERATURE",
        "CONVO_ENGINE__PROVIDERS__OPENAI_API_KEY",
        "CONVO_ENGINE__PERSISTENCE__BACKEND",
        "CONVO_ENGINE__LOGGING__JSON",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_with_empty_environment_uses_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let result = EngineConfig::load();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert!(config.orchestration.enable_persistence);
        assert_eq!(config.orchestration.checkpoint_interval, 5);
        assert_eq!(config.persistence.backend, PersistenceKind::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_overrides_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("CONVO_ENGINE__ORCHESTRATION__MAX_RETRIES", "1");
        env::set_var("CONVO_ENGINE__ORCHESTRATION__TEMPERATURE", "0.2");
        env::set_var("CONVO_ENGINE__PROVIDERS__OPENAI_API_KEY", "sk-test");
        env::set_var("CONVO_ENGINE__PERSISTENCE__BACKEND", "file");
        env::set_var("CONVO_ENGINE__LOGGING__JSON", "true");
        let result = EngineConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.orchestration.max_retries, 1);
        assert!((config.orchestration.temperature - 0.2).abs() < f32::EPSILON);
        assert!(config.providers.has_openai());
        assert_eq!(config.persistence.backend, PersistenceKind::File);
        assert!(config.logging.json);
    }

    #[test]
    fn test_conflicting_time_travel_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("CONVO_ENGINE__ORCHESTRATION__ENABLE_PERSISTENCE", "false");
        env::set_var("CONVO_ENGINE__ORCHESTRATION__ENABLE_TIME_TRAVEL", "true");
        let result = EngineConfig::load_validated();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::ValidationFailed(
                ValidationError::TimeTravelRequiresPersistence
            ))
        ));
    }
}
