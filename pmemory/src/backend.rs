//! Memory backend trait and in-memory backend implementation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use pcommon::{BoxFuture, SessionId};
use pprovider::{
    Message, NewRequestLog, RequestLog, RequestLogUpdate, RequestStatus, Role, Rules, Usage,
};

use crate::backends::sqlite::default_sqlite_path;
use crate::error::MemoryError;
use crate::types::{MigrationRecord, Session};

pub use crate::backends::postgres::PostgresMemoryBackend;
pub use crate::backends::sqlite::SqliteMemoryBackend;

/// Relational persistence for sessions, their messages, and request logs.
///
/// Every implementation must hand out gapless per-session `seq` values even when
/// `add_message` is called concurrently for the same session.
pub trait MemoryBackend: Send + Sync {
    /// Applies pending migrations. Safe to call repeatedly.
    fn create_schema<'a>(&'a self) -> BoxFuture<'a, Result<(), MemoryError>> {
        self.migrate()
    }

    /// Drops every table owned by this crate, migration bookkeeping included.
    fn drop_schema<'a>(&'a self) -> BoxFuture<'a, Result<(), MemoryError>>;

    fn migrate<'a>(&'a self) -> BoxFuture<'a, Result<(), MemoryError>>;

    /// Reverts the most recently applied migration.
    fn rollback<'a>(&'a self) -> BoxFuture<'a, Result<(), MemoryError>>;

    fn migration_status<'a>(&'a self) -> BoxFuture<'a, Result<Vec<MigrationRecord>, MemoryError>>;

    fn create_session<'a>(&'a self, rules: Rules) -> BoxFuture<'a, Result<Session, MemoryError>>;

    fn get_session<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Session, MemoryError>>;

    /// Removes the session with its messages and request logs.
    fn delete_session<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), MemoryError>>;

    fn add_message<'a>(
        &'a self,
        session_id: &'a SessionId,
        role: Role,
        content: &'a str,
        usage: Option<Usage>,
    ) -> BoxFuture<'a, Result<Message, MemoryError>>;

    /// Messages ordered by ascending `seq`.
    fn list_messages<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Vec<Message>, MemoryError>>;

    fn add_request_log<'a>(
        &'a self,
        log: NewRequestLog,
    ) -> BoxFuture<'a, Result<RequestLog, MemoryError>>;

    fn update_request_log<'a>(
        &'a self,
        id: &'a str,
        update: RequestLogUpdate,
    ) -> BoxFuture<'a, Result<(), MemoryError>>;

    /// Request logs for a session in creation order.
    fn list_request_logs<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Vec<RequestLog>, MemoryError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryBackendConfig {
    Sqlite { path: PathBuf },
    Postgres { url: String },
    InMemory,
}

impl Default for MemoryBackendConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

impl MemoryBackendConfig {
    /// Postgres for `postgres://` and `postgresql://` URLs, the default SQLite file otherwise.
    pub fn from_database_url(url: &str) -> Self {
        let url = url.trim();
        if url.starts_with("postgres") {
            return Self::Postgres {
                url: url.to_string(),
            };
        }

        if let Some(path) = url.strip_prefix("sqlite://")
            && !path.is_empty()
        {
            return Self::Sqlite {
                path: PathBuf::from(path),
            };
        }

        Self::default()
    }
}

pub fn create_memory_backend(
    config: MemoryBackendConfig,
) -> Result<Arc<dyn MemoryBackend>, MemoryError> {
    match config {
        MemoryBackendConfig::Sqlite { path } => Ok(Arc::new(SqliteMemoryBackend::new(path)?)),
        MemoryBackendConfig::Postgres { url } => Ok(Arc::new(PostgresMemoryBackend::new(url)?)),
        MemoryBackendConfig::InMemory => Ok(Arc::new(InMemoryMemoryBackend::new())),
    }
}

pub fn create_default_memory_backend() -> Result<Arc<dyn MemoryBackend>, MemoryError> {
    create_memory_backend(MemoryBackendConfig::default())
}

pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Zero counters are indistinguishable from an absent usage once stored.
pub(crate) fn stored_usage(usage: Usage) -> Option<Usage> {
    (!usage.is_zero()).then_some(usage)
}

#[derive(Debug, Default)]
pub struct InMemoryMemoryBackend {
    state: Mutex<InMemoryState>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    sessions: HashMap<SessionId, SessionState>,
    request_logs: Vec<RequestLog>,
}

#[derive(Debug, Clone)]
struct SessionState {
    session: Session,
    messages: Vec<Message>,
}

impl InMemoryMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, InMemoryState>, MemoryError> {
        self.state
            .lock()
            .map_err(|_| MemoryError::storage("memory backend lock poisoned"))
    }
}

impl MemoryBackend for InMemoryMemoryBackend {
    fn drop_schema<'a>(&'a self) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let mut state = self.state()?;
            *state = InMemoryState::default();
            Ok(())
        })
    }

    fn migrate<'a>(&'a self) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async { Ok(()) })
    }

    fn rollback<'a>(&'a self) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async {
            Err(MemoryError::migration(
                "in-memory backend has no migrations to roll back",
            ))
        })
    }

    fn migration_status<'a>(&'a self) -> BoxFuture<'a, Result<Vec<MigrationRecord>, MemoryError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn create_session<'a>(&'a self, rules: Rules) -> BoxFuture<'a, Result<Session, MemoryError>> {
        Box::pin(async move {
            let session = Session {
                id: SessionId::new(new_record_id()),
                rules,
                created_at: SystemTime::now(),
            };

            let mut state = self.state()?;
            state.sessions.insert(
                session.id.clone(),
                SessionState {
                    session: session.clone(),
                    messages: Vec::new(),
                },
            );
            Ok(session)
        })
    }

    fn get_session<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Session, MemoryError>> {
        Box::pin(async move {
            let state = self.state()?;
            state
                .sessions
                .get(session_id)
                .map(|entry| entry.session.clone())
                .ok_or_else(|| MemoryError::not_found(format!("session '{session_id}' not found")))
        })
    }

    fn delete_session<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let mut state = self.state()?;
            if state.sessions.remove(session_id).is_none() {
                return Err(MemoryError::not_found(format!(
                    "session '{session_id}' not found"
                )));
            }
            state
                .request_logs
                .retain(|log| &log.session_id != session_id);
            Ok(())
        })
    }

    fn add_message<'a>(
        &'a self,
        session_id: &'a SessionId,
        role: Role,
        content: &'a str,
        usage: Option<Usage>,
    ) -> BoxFuture<'a, Result<Message, MemoryError>> {
        Box::pin(async move {
            let mut state = self.state()?;
            let entry = state.sessions.get_mut(session_id).ok_or_else(|| {
                MemoryError::not_found(format!("session '{session_id}' not found"))
            })?;

            let seq = u32::try_from(entry.messages.len() + 1).map_err(|_| {
                MemoryError::storage(format!("session '{session_id}' has too many messages"))
            })?;
            let message = Message {
                id: new_record_id(),
                session_id: session_id.clone(),
                seq,
                role,
                content: content.to_string(),
                usage,
                created_at: SystemTime::now(),
            };
            entry.messages.push(message.clone());
            Ok(message)
        })
    }

    fn list_messages<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Vec<Message>, MemoryError>> {
        Box::pin(async move {
            let state = self.state()?;
            Ok(state
                .sessions
                .get(session_id)
                .map(|entry| {
                    entry
                        .messages
                        .iter()
                        .cloned()
                        .map(|mut message| {
                            message.usage = message.usage.and_then(stored_usage);
                            message
                        })
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn add_request_log<'a>(
        &'a self,
        log: NewRequestLog,
    ) -> BoxFuture<'a, Result<RequestLog, MemoryError>> {
        Box::pin(async move {
            let now = SystemTime::now();
            let row = RequestLog {
                id: new_record_id(),
                session_id: log.session_id,
                prompt: log.prompt,
                response: log.response,
                attempt_number: log.attempt_number,
                retry_count: log.retry_count,
                final_status: RequestStatus::Pending,
                fail_reason: None,
                error_message: String::new(),
                usage: Usage::default(),
                created_at: now,
                updated_at: now,
            };

            self.state()?.request_logs.push(row.clone());
            Ok(row)
        })
    }

    fn update_request_log<'a>(
        &'a self,
        id: &'a str,
        update: RequestLogUpdate,
    ) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let mut state = self.state()?;
            let row = state
                .request_logs
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or_else(|| MemoryError::not_found(format!("request log '{id}' not found")))?;
            update.apply_to(row);
            Ok(())
        })
    }

    fn list_request_logs<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Vec<RequestLog>, MemoryError>> {
        Box::pin(async move {
            let state = self.state()?;
            Ok(state
                .request_logs
                .iter()
                .filter(|row| &row.session_id == session_id)
                .cloned()
                .collect())
        })
    }
}
