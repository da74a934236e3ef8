//! File-backed conversation log, one pretty-printed JSON file per session.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{DateTime, Utc};
use pi_agent_universal_schema::{ModelConfig, SessionMessage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub const DEFAULT_SESSIONS_DIR: &str = ".ai-agent/sessions";

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode session {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    messages: Vec<SessionMessage>,
    model: ModelConfig,
}

impl SessionRecord {
    fn new(model: ModelConfig) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            model,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn messages(&self) -> &[SessionMessage] {
        &self.messages
    }

    pub fn model(&self) -> &ModelConfig {
        &self.model
    }

    fn touch(&mut self, floor: DateTime<Utc>) {
        self.updated_at = Utc::now().max(self.updated_at).max(floor);
    }
}

/// Session ids are plain tokens; anything else could escape the directory.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn create(&self, model: ModelConfig) -> Result<SessionRecord, SessionStoreError> {
        let record = SessionRecord::new(model);
        let _lock = self.lock_id(&record.id).await;
        self.write(&record).await?;
        tracing::debug!(session_id = %record.id, "session created");
        Ok(record)
    }

    /// Missing, unreadable and corrupt records all read as `None`.
    pub async fn load(&self, id: &str) -> Option<SessionRecord> {
        if !is_valid_session_id(id) {
            return None;
        }
        self.read(id).await
    }

    pub async fn append_message(
        &self,
        record: &mut SessionRecord,
        message: SessionMessage,
    ) -> Result<(), SessionStoreError> {
        let _lock = self.lock_id(&record.id).await;

        let mut next = record.clone();
        let mut floor = next.updated_at;
        if let Some(persisted) = self.read(&next.id).await {
            floor = floor.max(persisted.updated_at);
            if persisted.messages.len() > next.messages.len() {
                next.messages = persisted.messages;
            }
        }
        next.messages.push(message);
        next.touch(floor);
        self.write(&next).await?;
        *record = next;
        Ok(())
    }

    pub async fn save(&self, record: &mut SessionRecord) -> Result<(), SessionStoreError> {
        let _lock = self.lock_id(&record.id).await;
        let mut next = record.clone();
        next.touch(record.updated_at);
        self.write(&next).await?;
        *record = next;
        Ok(())
    }

    /// All readable sessions, most recently updated first.
    pub async fn list(&self) -> Result<Vec<SessionRecord>, SessionStoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SessionStoreError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut records = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(SessionStoreError::Io {
                        path: self.dir.clone(),
                        source,
                    })
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = read_record(&path).await {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(records)
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn lock_id(&self, id: &str) -> IdLock<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_string())
            .or_default()
            .clone();
        IdLock {
            table: &self.locks,
            id: id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn read(&self, id: &str) -> Option<SessionRecord> {
        read_record(&self.path_for(id)).await
    }

    async fn write(&self, record: &SessionRecord) -> Result<(), SessionStoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| SessionStoreError::Io { path, source }
        };
        let encoded =
            serde_json::to_vec_pretty(record).map_err(|source| SessionStoreError::Serialize {
                id: record.id.clone(),
                source,
            })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;
        let target = self.path_for(&record.id);
        let staging = self
            .dir
            .join(format!(".{}.{}.tmp", record.id, uuid::Uuid::new_v4()));
        tokio::fs::write(&staging, &encoded)
            .await
            .map_err(io_err(&staging))?;
        if let Err(source) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(SessionStoreError::Io {
                path: target,
                source,
            });
        }
        Ok(())
    }
}

/// Exclusive hold on one session id. The table entry is pruned on release
/// once no other caller is waiting for it.
struct IdLock<'a> {
    table: &'a StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.id);
        }
    }
}

async fn read_record(path: &Path) -> Option<SessionRecord> {
    let contents = match tokio::fs::read(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to read session");
            return None;
        }
    };
    match serde_json::from_slice(&contents) {
        Ok(record) => Some(record),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring corrupt session file");
            None
        }
    }
}
