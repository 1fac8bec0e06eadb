//! PostgreSQL persistence backend.
//!
//! The connection URL is supplied as the backend credential. Migrations in
//! `migrations/` run on `init`; payloads are stored as JSON text.

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::domain::conversation::{
    Checkpoint, CheckpointKind, CheckpointPayload, ContextSnapshot, Interaction, Thread,
    ThreadMetadata, TokenUsage,
};
use crate::domain::foundation::{
    CheckpointId, InteractionId, ProviderId, ThreadId, Timestamp,
};
use crate::ports::{PersistenceBackend, PersistenceError};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

// Postgres unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL implementation of `PersistenceBackend`.
pub struct PostgresBackend {
    pool: OnceCell<PgPool>,
    max_connections: u32,
    acquire_timeout: Duration,
}

impl PostgresBackend {
    pub fn new() -> Self {
        Self {
            pool: OnceCell::new(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    /// Uses an existing pool; `init` then only runs migrations.
    pub fn with_pool(pool: PgPool) -> Self {
        let backend = Self::new();
        // A fresh cell cannot already be set.
        let _ = backend.pool.set(pool);
        backend
    }

    fn pool(&self) -> Result<&PgPool, PersistenceError> {
        self.pool
            .get()
            .ok_or_else(|| PersistenceError::unavailable("postgres backend not initialized"))
    }
}

impl Default for PostgresBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn db_error(context: &str, err: sqlx::Error) -> PersistenceError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            PersistenceError::unavailable(format!("{}: {}", context, err))
        }
        sqlx::Error::Database(db) if db.code().as_deref() == Some("28P01") => {
            PersistenceError::Unauthorized(format!("{}: {}", context, db.message()))
        }
        _ => PersistenceError::write_failed(format!("{}: {}", context, err)),
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64, PersistenceError> {
    i64::try_from(value)
        .map_err(|_| PersistenceError::write_failed(format!("{} out of range: {}", field, value)))
}

fn row_to_thread(row: &PgRow) -> Result<Thread, PersistenceError> {
    let id: uuid::Uuid = row.try_get("id").map_err(|e| db_error("read thread", e))?;
    let created_at: chrono::DateTime<chrono::Utc> =
        row.try_get("created_at").map_err(|e| db_error("read thread", e))?;
    let metadata: String = row.try_get("metadata").map_err(|e| db_error("read thread", e))?;
    Ok(Thread::reconstitute(
        ThreadId::from_uuid(id),
        Timestamp::from_datetime(created_at),
        serde_json::from_str::<ThreadMetadata>(&metadata)?,
    ))
}

fn row_to_interaction(row: &PgRow) -> Result<Interaction, PersistenceError> {
    let get = |e| db_error("read interaction", e);
    let thread_id: uuid::Uuid = row.try_get("thread_id").map_err(get)?;
    let interaction_id: i64 = row.try_get("interaction_id").map_err(get)?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at").map_err(get)?;
    let provider_id: String = row.try_get("provider_id").map_err(get)?;
    let snapshot: String = row.try_get("context_snapshot").map_err(get)?;
    let duration_ms: i64 = row.try_get("duration_ms").map_err(get)?;
    let usage: Option<String> = row.try_get("usage").map_err(get)?;

    Ok(Interaction {
        id: InteractionId::new(interaction_id.max(0) as u64),
        thread_id: ThreadId::from_uuid(thread_id),
        timestamp: Timestamp::from_datetime(created_at),
        prompt: row.try_get("prompt").map_err(get)?,
        response: row.try_get("response").map_err(get)?,
        provider_id: ProviderId::new(provider_id)
            .map_err(|e| PersistenceError::corrupt(e.to_string()))?,
        model: row.try_get("model").map_err(get)?,
        context_snapshot: serde_json::from_str::<ContextSnapshot>(&snapshot)?,
        duration_ms: duration_ms.max(0) as u64,
        usage: usage
            .map(|u| serde_json::from_str::<TokenUsage>(&u))
            .transpose()?,
    })
}

fn row_to_checkpoint(row: &PgRow) -> Result<Checkpoint, PersistenceError> {
    let get = |e| db_error("read checkpoint", e);
    let id: uuid::Uuid = row.try_get("id").map_err(get)?;
    let thread_id: uuid::Uuid = row.try_get("thread_id").map_err(get)?;
    let interaction_id: i64 = row.try_get("interaction_id").map_err(get)?;
    let kind: String = row.try_get("kind").map_err(get)?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at").map_err(get)?;
    let payload: String = row.try_get("payload").map_err(get)?;

    Ok(Checkpoint {
        id: CheckpointId::from_uuid(id),
        thread_id: ThreadId::from_uuid(thread_id),
        interaction_id: InteractionId::new(interaction_id.max(0) as u64),
        kind: CheckpointKind::parse(&kind)
            .ok_or_else(|| PersistenceError::corrupt(format!("unknown checkpoint kind: {}", kind)))?,
        created_at: Timestamp::from_datetime(created_at),
        payload: serde_json::from_str::<CheckpointPayload>(&payload)?,
    })
}

#[async_trait]
impl PersistenceBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn init(&self, credentials: Option<&Secret<String>>) -> Result<(), PersistenceError> {
        let max_connections = self.max_connections;
        let acquire_timeout = self.acquire_timeout;
        let pool = self
            .pool
            .get_or_try_init(move || async move {
                let url = credentials.ok_or_else(|| {
                    PersistenceError::Unauthorized("database URL not provided".to_string())
                })?;
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(url.expose_secret())
                    .await
                    .map_err(|e| db_error("connect", e))
            })
            .await?;

        MIGRATOR
            .run(pool)
            .await
            .map_err(|e| PersistenceError::unavailable(format!("migrate: {}", e)))?;
        tracing::debug!("Postgres persistence ready");
        Ok(())
    }

    async fn new_thread(&self, metadata: ThreadMetadata) -> Result<Thread, PersistenceError> {
        let thread = Thread::new(metadata);
        sqlx::query("INSERT INTO threads (id, created_at, metadata) VALUES ($1, $2, $3)")
            .bind(thread.id.as_uuid())
            .bind(thread.created_at.as_datetime())
            .bind(serde_json::to_string(&thread.metadata)?)
            .execute(self.pool()?)
            .await
            .map_err(|e| db_error("insert thread", e))?;
        Ok(thread)
    }

    async fn load_thread(&self, thread_id: ThreadId) -> Result<Option<Thread>, PersistenceError> {
        let row = sqlx::query("SELECT id, created_at, metadata FROM threads WHERE id = $1")
            .bind(thread_id.as_uuid())
            .fetch_optional(self.pool()?)
            .await
            .map_err(|e| db_error("load thread", e))?;
        row.as_ref().map(row_to_thread).transpose()
    }

    async fn list_threads(&self) -> Result<Vec<Thread>, PersistenceError> {
        let rows = sqlx::query("SELECT id, created_at, metadata FROM threads ORDER BY created_at, id")
            .fetch_all(self.pool()?)
            .await
            .map_err(|e| db_error("list threads", e))?;
        rows.iter().map(row_to_thread).collect()
    }

    async fn put_interaction(&self, interaction: &Interaction) -> Result<(), PersistenceError> {
        let usage = interaction
            .usage
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let result = sqlx::query(
            r#"
            INSERT INTO interactions (
                thread_id, interaction_id, created_at, prompt, response,
                provider_id, model, context_snapshot, duration_ms, usage
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(interaction.thread_id.as_uuid())
        .bind(to_i64(interaction.id.value(), "interaction_id")?)
        .bind(interaction.timestamp.as_datetime())
        .bind(&interaction.prompt)
        .bind(&interaction.response)
        .bind(interaction.provider_id.as_str())
        .bind(&interaction.model)
        .bind(serde_json::to_string(&interaction.context_snapshot)?)
        .bind(to_i64(interaction.duration_ms, "duration_ms")?)
        .bind(usage)
        .execute(self.pool()?)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(PersistenceError::Duplicate {
                    thread_id: interaction.thread_id,
                    interaction_id: interaction.id.value(),
                })
            }
            Err(e) => Err(db_error("insert interaction", e)),
        }
    }

    async fn interactions(
        &self,
        thread_id: ThreadId,
        limit: Option<usize>,
    ) -> Result<Vec<Interaction>, PersistenceError> {
        // Newest `limit` rows, flipped back to oldest first.
        let limit = limit.map_or(i64::MAX, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT thread_id, interaction_id, created_at, prompt, response,
                       provider_id, model, context_snapshot, duration_ms, usage
                FROM interactions
                WHERE thread_id = $1
                ORDER BY interaction_id DESC
                LIMIT $2
            ) recent
            ORDER BY interaction_id ASC
            "#,
        )
        .bind(thread_id.as_uuid())
        .bind(limit)
        .fetch_all(self.pool()?)
        .await
        .map_err(|e| db_error("load interactions", e))?;
        rows.iter().map(row_to_interaction).collect()
    }

    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO checkpoints (id, thread_id, interaction_id, kind, created_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(checkpoint.id.as_uuid())
        .bind(checkpoint.thread_id.as_uuid())
        .bind(to_i64(checkpoint.interaction_id.value(), "interaction_id")?)
        .bind(checkpoint.kind.as_str())
        .bind(checkpoint.created_at.as_datetime())
        .bind(serde_json::to_string(&checkpoint.payload)?)
        .execute(self.pool()?)
        .await
        .map_err(|e| db_error("insert checkpoint", e))?;
        Ok(())
    }

    async fn checkpoint_history(
        &self,
        thread_id: ThreadId,
    ) -> Result<Vec<Checkpoint>, PersistenceError> {
        let rows = sqlx::query(
            r#"
            SELECT id, thread_id, interaction_id, kind, created_at, payload
            FROM checkpoints
            WHERE thread_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(thread_id.as_uuid())
        .fetch_all(self.pool()?)
        .await
        .map_err(|e| db_error("load checkpoints", e))?;
        rows.iter().map(row_to_checkpoint).collect()
    }
}
