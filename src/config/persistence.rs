//! Persistence backend configuration

use secrecy::Secret;
use serde::Deserialize;
use std::path::PathBuf;

use super::error::ValidationError;

/// Which persistence backend to use.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceKind {
    /// Process-lifetime storage.
    #[default]
    Memory,
    /// JSON-lines files under `data_dir`.
    File,
    /// PostgreSQL; `credentials` holds the connection URL.
    Postgres,
}

impl PersistenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistenceKind::Memory => "memory",
            PersistenceKind::File => "file",
            PersistenceKind::Postgres => "postgres",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: PersistenceKind,

    /// Service credential or connection URL, never logged.
    pub credentials: Option<String>,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// How many recent checkpoints a checkpointer handle returns.
    #[serde(default = "default_checkpoint_limit")]
    pub checkpoint_limit: usize,
}

impl PersistenceConfig {
    /// Credentials wrapped for handing to a backend.
    pub fn secret_credentials(&self) -> Option<Secret<String>> {
        self.credentials
            .as_ref()
            .filter(|c| !c.trim().is_empty())
            .map(|c| Secret::new(c.clone()))
    }

    /// Validate persistence configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backend == PersistenceKind::Postgres {
            match self.credentials.as_deref().map(str::trim) {
                None | Some("") => {
                    return Err(ValidationError::MissingRequired("PERSISTENCE__CREDENTIALS"))
                }
                Some(url)
                    if !url.starts_with("postgres://") && !url.starts_with("postgresql://") =>
                {
                    return Err(ValidationError::InvalidUrl {
                        field: "persistence.credentials",
                        value: "<redacted>".to_string(),
                    })
                }
                Some(_) => {}
            }
        }
        if self.checkpoint_limit == 0 {
            return Err(ValidationError::MustBePositive {
                field: "checkpoint_limit",
            });
        }
        Ok(())
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceKind::default(),
            credentials: None,
            data_dir: default_data_dir(),
            checkpoint_limit: default_checkpoint_limit(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".convo-engine")
}

fn default_checkpoint_limit() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_memory_backend() {
        let config = PersistenceConfig::default();
        assert_eq!(config.backend, PersistenceKind::Memory);
        assert!(config.validate().is_ok());
        assert!(config.secret_credentials().is_none());
    }

    #[test]
    fn test_postgres_requires_url() {
        let config = PersistenceConfig {
            backend: PersistenceKind::Postgres,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("PERSISTENCE__CREDENTIALS"))
        );

        let config = PersistenceConfig {
            backend: PersistenceKind::Postgres,
            credentials: Some("mysql://nope".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PersistenceConfig {
            backend: PersistenceKind::Postgres,
            credentials: Some("postgres://u:p@localhost/convo".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
