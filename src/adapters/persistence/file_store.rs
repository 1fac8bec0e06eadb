//! File-system persistence backend.
//!
//! Layout under the data directory:
//!
//! ```text
//! threads/<thread-id>/thread.json
//! threads/<thread-id>/interactions.jsonl
//! threads/<thread-id>/checkpoints.jsonl
//! ```
//!
//! Thread records are written atomically (temp file + rename). Interactions
//! and checkpoints are appended one JSON document per line; a torn final
//! line left by a crash is skipped on read.

use async_trait::async_trait;
use secrecy::Secret;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::conversation::{Checkpoint, Interaction, Thread, ThreadMetadata};
use crate::domain::foundation::ThreadId;
use crate::ports::{PersistenceBackend, PersistenceError};

const THREADS_DIR: &str = "threads";
const THREAD_FILE: &str = "thread.json";
const INTERACTIONS_FILE: &str = "interactions.jsonl";
const CHECKPOINTS_FILE: &str = "checkpoints.jsonl";

/// Stores each thread in its own directory of JSON files.
pub struct FileBackend {
    root: PathBuf,
    // Serializes appends so lines never interleave.
    write_lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn threads_dir(&self) -> PathBuf {
        self.root.join(THREADS_DIR)
    }

    fn thread_dir(&self, thread_id: ThreadId) -> PathBuf {
        self.threads_dir().join(thread_id.to_string())
    }

    async fn require_thread(&self, thread_id: ThreadId) -> Result<PathBuf, PersistenceError> {
        let dir = self.thread_dir(thread_id);
        if fs::try_exists(dir.join(THREAD_FILE)).await? {
            Ok(dir)
        } else {
            Err(PersistenceError::write_failed(format!("unknown thread {}", thread_id)))
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}

async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PersistenceError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let complete = contents.ends_with('\n');
    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut values = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str(line) {
            Ok(value) => values.push(value),
            Err(e) if i + 1 == lines.len() && !complete => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping torn trailing record");
            }
            Err(e) => {
                return Err(PersistenceError::corrupt(format!(
                    "{} line {}: {}",
                    path.display(),
                    i + 1,
                    e
                )))
            }
        }
    }
    Ok(values)
}

#[async_trait]
impl PersistenceBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn init(&self, _credentials: Option<&Secret<String>>) -> Result<(), PersistenceError> {
        fs::create_dir_all(self.threads_dir()).await?;
        // Fail at startup rather than on the first write.
        let probe = self.root.join(".write-probe");
        fs::write(&probe, b"ok").await?;
        fs::remove_file(&probe).await?;
        tracing::debug!(root = %self.root.display(), "File persistence ready");
        Ok(())
    }

    async fn new_thread(&self, metadata: ThreadMetadata) -> Result<Thread, PersistenceError> {
        let thread = Thread::new(metadata);
        let dir = self.thread_dir(thread.id);
        fs::create_dir_all(&dir).await?;
        write_atomic(&dir.join(THREAD_FILE), &serde_json::to_vec_pretty(&thread)?).await?;
        Ok(thread)
    }

    async fn load_thread(&self, thread_id: ThreadId) -> Result<Option<Thread>, PersistenceError> {
        match fs::read(self.thread_dir(thread_id).join(THREAD_FILE)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_threads(&self) -> Result<Vec<Thread>, PersistenceError> {
        let mut threads = Vec::new();
        let mut entries = match fs::read_dir(self.threads_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(threads),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let Ok(thread_id) = entry.file_name().to_string_lossy().parse::<ThreadId>() else {
                continue;
            };
            if let Some(thread) = self.load_thread(thread_id).await? {
                threads.push(thread);
            }
        }
        threads.sort_by_key(|t| (t.created_at, t.id));
        Ok(threads)
    }

    async fn put_interaction(&self, interaction: &Interaction) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let path = self.require_thread(interaction.thread_id).await?.join(INTERACTIONS_FILE);
        let existing: Vec<Interaction> = read_lines(&path).await?;
        if existing.iter().any(|i| i.id == interaction.id) {
            return Err(PersistenceError::Duplicate {
                thread_id: interaction.thread_id,
                interaction_id: interaction.id.value(),
            });
        }
        append_line(&path, interaction).await
    }

    async fn interactions(
        &self,
        thread_id: ThreadId,
        limit: Option<usize>,
    ) -> Result<Vec<Interaction>, PersistenceError> {
        let mut all: Vec<Interaction> =
            read_lines(&self.thread_dir(thread_id).join(INTERACTIONS_FILE)).await?;
        if let Some(limit) = limit {
            if all.len() > limit {
                all.drain(..all.len() - limit);
            }
        }
        Ok(all)
    }

    async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let path = self.require_thread(checkpoint.thread_id).await?.join(CHECKPOINTS_FILE);
        append_line(&path, checkpoint).await
    }

    async fn checkpoint_history(
        &self,
        thread_id: ThreadId,
    ) -> Result<Vec<Checkpoint>, PersistenceError> {
        read_lines(&self.thread_dir(thread_id).join(CHECKPOINTS_FILE)).await
    }
}
