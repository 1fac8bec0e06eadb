//! Persistence backends for threads, interactions and checkpoints.
//!
//! - `InMemoryBackend` - process-lifetime storage, also used when persistence is disabled
//! - `FileBackend` - JSON files under a data directory
//! - `PostgresBackend` - PostgreSQL via sqlx

mod file_store;
mod in_memory;
mod postgres;

pub use file_store::FileBackend;
pub use in_memory::InMemoryBackend;
pub use postgres::PostgresBackend;

use std::sync::Arc;

use crate::config::{PersistenceConfig, PersistenceKind};
use crate::ports::PersistenceBackend;

/// Instantiates the configured backend. Call `init` before use.
pub fn build_backend(config: &PersistenceConfig) -> Arc<dyn PersistenceBackend> {
    match config.backend {
        PersistenceKind::Memory => Arc::new(InMemoryBackend::new()),
        PersistenceKind::File => Arc::new(FileBackend::new(config.data_dir.clone())),
        PersistenceKind::Postgres => Arc::new(PostgresBackend::new()),
    }
}
