use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use pcommon::{BoxFuture, SessionId};
use pprovider::{
    FailReason, Message, NewRequestLog, RequestLog, RequestLogUpdate, RequestStatus, Role, Rules,
    Usage,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::backend::{MemoryBackend, new_record_id, stored_usage};
use crate::error::MemoryError;
use crate::migrations::{
    AppliedMigration, MIGRATIONS_TABLE, SqlDialect, embedded_migrations, migration_records,
    pending_migrations, rollback_target,
};
use crate::types::{MigrationRecord, Session};

const REQUEST_LOG_COLUMNS: &str = "
    id, session_id, prompt, response, attempt_number, retry_count, final_status,
    fail_reason, error_message, prompt_tokens, response_tokens, total_tokens,
    thought_tokens, created_at_secs, created_at_nanos, updated_at_secs, updated_at_nanos
";

#[derive(Debug)]
pub struct SqliteMemoryBackend {
    connection: Mutex<Connection>,
}

impl SqliteMemoryBackend {
    /// Opens (creating if needed) the database file and applies pending migrations.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| {
                MemoryError::storage(format!(
                    "failed to create sqlite parent directory: {error}"
                ))
            })?;
        }

        let connection = Connection::open(path).map_err(|error| {
            MemoryError::storage(format!("failed to open sqlite database: {error}"))
        })?;
        Self::from_connection(connection, true)
    }

    pub fn new_in_memory() -> Result<Self, MemoryError> {
        let connection = Connection::open_in_memory().map_err(|error| {
            MemoryError::storage(format!("failed to open in-memory sqlite database: {error}"))
        })?;
        Self::from_connection(connection, false)
    }

    fn from_connection(connection: Connection, wal: bool) -> Result<Self, MemoryError> {
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(|error| {
                MemoryError::storage(format!("failed to configure sqlite busy timeout: {error}"))
            })?;

        let pragmas = if wal {
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;"
        } else {
            "PRAGMA foreign_keys = ON;"
        };
        connection.execute_batch(pragmas).map_err(|error| {
            MemoryError::storage(format!("failed to configure sqlite pragmas: {error}"))
        })?;

        let backend = Self {
            connection: Mutex::new(connection),
        };
        backend.apply_migrations()?;
        Ok(backend)
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>, MemoryError> {
        self.connection
            .lock()
            .map_err(|_| MemoryError::storage("sqlite backend lock poisoned"))
    }

    fn ensure_migrations_table(conn: &Connection) -> Result<(), MemoryError> {
        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                applied_at_secs INTEGER NOT NULL,
                applied_at_nanos INTEGER NOT NULL,
                checksum TEXT NOT NULL
            );
            "
        ))
        .map_err(|error| {
            MemoryError::migration(format!("failed to ensure migrations table: {error}"))
        })
    }

    fn applied_migrations(conn: &Connection) -> Result<Vec<AppliedMigration>, MemoryError> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, name, applied_at_secs, applied_at_nanos, checksum
                 FROM {MIGRATIONS_TABLE} ORDER BY id ASC"
            ))
            .map_err(|error| {
                MemoryError::migration(format!("failed to prepare migrations query: {error}"))
            })?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|error| {
                MemoryError::migration(format!("failed to query applied migrations: {error}"))
            })?;

        let mut applied = Vec::new();
        for row in rows {
            let (id, name, secs, nanos, checksum) = row.map_err(|error| {
                MemoryError::migration(format!("failed to read migration row: {error}"))
            })?;
            applied.push(AppliedMigration {
                id,
                name,
                applied_at: decode_system_time(secs, nanos)?,
                checksum,
            });
        }
        Ok(applied)
    }

    fn apply_migrations(&self) -> Result<(), MemoryError> {
        let mut conn = self.connection()?;
        Self::ensure_migrations_table(&conn)?;
        let applied = Self::applied_migrations(&conn)?;
        let known = embedded_migrations(SqlDialect::Sqlite);

        for migration in pending_migrations(known, &applied)? {
            let tx = conn.transaction().map_err(|error| {
                MemoryError::migration(format!("begin migration {}: {error}", migration.name))
            })?;
            tx.execute_batch(migration.up).map_err(|error| {
                MemoryError::migration(format!("run migration {}: {error}", migration.name))
            })?;
            let (secs, nanos) = encode_system_time(SystemTime::now())?;
            tx.execute(
                &format!(
                    "INSERT INTO {MIGRATIONS_TABLE} (name, applied_at_secs, applied_at_nanos, checksum)
                     VALUES (?1, ?2, ?3, ?4)"
                ),
                params![migration.name, secs, nanos, migration.checksum()],
            )
            .map_err(|error| {
                MemoryError::migration(format!("record migration {}: {error}", migration.name))
            })?;
            tx.commit().map_err(|error| {
                MemoryError::migration(format!("commit migration {}: {error}", migration.name))
            })?;
            tracing::debug!(
                phase = "memory",
                backend = "sqlite",
                migration = migration.name,
                "applied migration"
            );
        }

        Ok(())
    }

    fn rollback_last(&self) -> Result<(), MemoryError> {
        let mut conn = self.connection()?;
        Self::ensure_migrations_table(&conn)?;
        let applied = Self::applied_migrations(&conn)?;
        let (target, down) = rollback_target(embedded_migrations(SqlDialect::Sqlite), &applied)?;

        let tx = conn.transaction().map_err(|error| {
            MemoryError::migration(format!("begin rollback {}: {error}", target.name))
        })?;
        tx.execute_batch(down).map_err(|error| {
            MemoryError::migration(format!("run rollback {}: {error}", target.name))
        })?;
        tx.execute(
            &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE id = ?1"),
            params![target.id],
        )
        .map_err(|error| {
            MemoryError::migration(format!("remove migration record {}: {error}", target.name))
        })?;
        tx.commit().map_err(|error| {
            MemoryError::migration(format!("commit rollback {}: {error}", target.name))
        })?;
        Ok(())
    }

    fn session_exists(conn: &Connection, session_id: &SessionId) -> Result<bool, MemoryError> {
        conn.query_row(
            "SELECT 1 FROM parley_sessions WHERE id = ?1 LIMIT 1",
            params![session_id.as_str()],
            |_| Ok(true),
        )
        .optional()
        .map_err(|error| MemoryError::storage(format!("failed to check session: {error}")))
        .map(|found| found.unwrap_or(false))
    }
}

impl MemoryBackend for SqliteMemoryBackend {
    fn drop_schema<'a>(&'a self) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            conn.execute_batch(&format!(
                "
                DROP TABLE IF EXISTS parley_request_logs;
                DROP TABLE IF EXISTS parley_messages;
                DROP TABLE IF EXISTS parley_sessions;
                DROP TABLE IF EXISTS {MIGRATIONS_TABLE};
                "
            ))
            .map_err(|error| MemoryError::storage(format!("failed to drop schema: {error}")))
        })
    }

    fn migrate<'a>(&'a self) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move { self.apply_migrations() })
    }

    fn rollback<'a>(&'a self) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move { self.rollback_last() })
    }

    fn migration_status<'a>(&'a self) -> BoxFuture<'a, Result<Vec<MigrationRecord>, MemoryError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            Self::ensure_migrations_table(&conn)?;
            let applied = Self::applied_migrations(&conn)?;
            Ok(migration_records(
                embedded_migrations(SqlDialect::Sqlite),
                &applied,
            ))
        })
    }

    fn create_session<'a>(&'a self, rules: Rules) -> BoxFuture<'a, Result<Session, MemoryError>> {
        Box::pin(async move {
            let session = Session {
                id: SessionId::new(new_record_id()),
                rules,
                created_at: SystemTime::now(),
            };
            let (secs, nanos) = encode_system_time(session.created_at)?;

            let conn = self.connection()?;
            conn.execute(
                "
                INSERT INTO parley_sessions (
                    id, system_prompt, output_schema, max_tokens,
                    created_at_secs, created_at_nanos
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![
                    session.id.as_str(),
                    &session.rules.system_prompt,
                    &session.rules.output_schema,
                    i64::from(session.rules.max_tokens),
                    secs,
                    nanos,
                ],
            )
            .map_err(|error| MemoryError::storage(format!("failed to create session: {error}")))?;

            Ok(session)
        })
    }

    fn get_session<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Session, MemoryError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let row = conn
                .query_row(
                    "
                    SELECT system_prompt, output_schema, max_tokens,
                           created_at_secs, created_at_nanos
                    FROM parley_sessions
                    WHERE id = ?1
                    ",
                    params![session_id.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                        ))
                    },
                )
                .optional()
                .map_err(|error| MemoryError::storage(format!("failed to get session: {error}")))?;

            let Some((system_prompt, output_schema, max_tokens, secs, nanos)) = row else {
                return Err(MemoryError::not_found(format!(
                    "session '{session_id}' not found"
                )));
            };

            Ok(Session {
                id: session_id.clone(),
                rules: Rules {
                    system_prompt,
                    output_schema,
                    max_tokens: decode_count(max_tokens, "max_tokens")?,
                },
                created_at: decode_system_time(secs, nanos)?,
            })
        })
    }

    fn delete_session<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let mut conn = self.connection()?;
            let tx = conn.transaction().map_err(|error| {
                MemoryError::storage(format!("failed to begin session delete: {error}"))
            })?;

            for statement in [
                "DELETE FROM parley_request_logs WHERE session_id = ?1",
                "DELETE FROM parley_messages WHERE session_id = ?1",
            ] {
                tx.execute(statement, params![session_id.as_str()])
                    .map_err(|error| {
                        MemoryError::storage(format!("failed to delete session rows: {error}"))
                    })?;
            }

            let deleted = tx
                .execute(
                    "DELETE FROM parley_sessions WHERE id = ?1",
                    params![session_id.as_str()],
                )
                .map_err(|error| {
                    MemoryError::storage(format!("failed to delete session: {error}"))
                })?;
            if deleted == 0 {
                return Err(MemoryError::not_found(format!(
                    "session '{session_id}' not found"
                )));
            }

            tx.commit().map_err(|error| {
                MemoryError::storage(format!("failed to commit session delete: {error}"))
            })
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
            let mut conn = self.connection()?;
            let tx = conn.transaction().map_err(|error| {
                MemoryError::storage(format!("failed to begin message insert: {error}"))
            })?;

            if !Self::session_exists(&tx, session_id)? {
                return Err(MemoryError::not_found(format!(
                    "session '{session_id}' not found"
                )));
            }

            let next_seq: i64 = tx
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0) + 1 FROM parley_messages WHERE session_id = ?1",
                    params![session_id.as_str()],
                    |row| row.get(0),
                )
                .map_err(|error| {
                    MemoryError::storage(format!("failed to compute next message seq: {error}"))
                })?;

            let message = Message {
                id: new_record_id(),
                session_id: session_id.clone(),
                seq: decode_count(next_seq, "seq")?,
                role,
                content: content.to_string(),
                usage,
                created_at: SystemTime::now(),
            };
            let counters = usage.unwrap_or_default();
            let (secs, nanos) = encode_system_time(message.created_at)?;

            tx.execute(
                "
                INSERT INTO parley_messages (
                    id, session_id, seq, role, content,
                    prompt_tokens, response_tokens, total_tokens, thought_tokens,
                    created_at_secs, created_at_nanos
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                ",
                params![
                    &message.id,
                    session_id.as_str(),
                    next_seq,
                    role.as_str(),
                    &message.content,
                    i64::from(counters.prompt_tokens),
                    i64::from(counters.response_tokens),
                    i64::from(counters.total_tokens),
                    i64::from(counters.thought_tokens),
                    secs,
                    nanos,
                ],
            )
            .map_err(|error| MemoryError::storage(format!("failed to add message: {error}")))?;

            tx.commit().map_err(|error| {
                MemoryError::storage(format!("failed to commit message insert: {error}"))
            })?;
            Ok(message)
        })
    }

    fn list_messages<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Vec<Message>, MemoryError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let mut stmt = conn
                .prepare(
                    "
                    SELECT id, seq, role, content,
                           prompt_tokens, response_tokens, total_tokens, thought_tokens,
                           created_at_secs, created_at_nanos
                    FROM parley_messages
                    WHERE session_id = ?1
                    ORDER BY seq ASC
                    ",
                )
                .map_err(|error| {
                    MemoryError::storage(format!("failed to prepare message query: {error}"))
                })?;
            let rows = stmt
                .query_map(params![session_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        [
                            row.get::<_, i64>(4)?,
                            row.get::<_, i64>(5)?,
                            row.get::<_, i64>(6)?,
                            row.get::<_, i64>(7)?,
                        ],
                        row.get::<_, i64>(8)?,
                        row.get::<_, i64>(9)?,
                    ))
                })
                .map_err(|error| {
                    MemoryError::storage(format!("failed to query message rows: {error}"))
                })?;

            let mut messages = Vec::new();
            for row in rows {
                let (id, seq, role, content, counters, secs, nanos) = row.map_err(|error| {
                    MemoryError::storage(format!("failed to read message row: {error}"))
                })?;
                messages.push(Message {
                    id,
                    session_id: session_id.clone(),
                    seq: decode_count(seq, "seq")?,
                    role: Role::from_str(&role)
                        .map_err(|error| MemoryError::storage(error.message))?,
                    content,
                    usage: stored_usage(decode_usage(counters)?),
                    created_at: decode_system_time(secs, nanos)?,
                });
            }
            Ok(messages)
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
            let (secs, nanos) = encode_system_time(now)?;

            let conn = self.connection()?;
            conn.execute(
                "
                INSERT INTO parley_request_logs (
                    id, session_id, prompt, response, attempt_number, retry_count,
                    final_status, fail_reason, error_message,
                    created_at_secs, created_at_nanos, updated_at_secs, updated_at_nanos
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '', '', ?8, ?9, ?8, ?9)
                ",
                params![
                    &row.id,
                    row.session_id.as_str(),
                    &row.prompt,
                    &row.response,
                    i64::from(row.attempt_number),
                    i64::from(row.retry_count),
                    RequestStatus::Pending.as_str(),
                    secs,
                    nanos,
                ],
            )
            .map_err(|error| {
                MemoryError::storage(format!("failed to add request log: {error}"))
            })?;

            Ok(row)
        })
    }

    fn update_request_log<'a>(
        &'a self,
        id: &'a str,
        update: RequestLogUpdate,
    ) -> BoxFuture<'a, Result<(), MemoryError>> {
        Box::pin(async move {
            let counters = update.usage.unwrap_or_default();
            let (secs, nanos) = encode_system_time(SystemTime::now())?;

            let conn = self.connection()?;
            let updated = conn
                .execute(
                    "
                    UPDATE parley_request_logs
                    SET response = ?1,
                        final_status = ?2,
                        fail_reason = ?3,
                        error_message = ?4,
                        retry_count = ?5,
                        prompt_tokens = ?6,
                        response_tokens = ?7,
                        total_tokens = ?8,
                        thought_tokens = ?9,
                        updated_at_secs = ?10,
                        updated_at_nanos = ?11
                    WHERE id = ?12
                    ",
                    params![
                        &update.response,
                        update.status.as_str(),
                        update.fail_reason.map(FailReason::as_str).unwrap_or_default(),
                        &update.error_message,
                        i64::from(update.retry_count),
                        i64::from(counters.prompt_tokens),
                        i64::from(counters.response_tokens),
                        i64::from(counters.total_tokens),
                        i64::from(counters.thought_tokens),
                        secs,
                        nanos,
                        id,
                    ],
                )
                .map_err(|error| {
                    MemoryError::storage(format!("failed to update request log: {error}"))
                })?;

            if updated == 0 {
                return Err(MemoryError::not_found(format!(
                    "request log '{id}' not found"
                )));
            }
            Ok(())
        })
    }

    fn list_request_logs<'a>(
        &'a self,
        session_id: &'a SessionId,
    ) -> BoxFuture<'a, Result<Vec<RequestLog>, MemoryError>> {
        Box::pin(async move {
            let conn = self.connection()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {REQUEST_LOG_COLUMNS}
                     FROM parley_request_logs
                     WHERE session_id = ?1
                     ORDER BY created_at_secs ASC, created_at_nanos ASC, rowid ASC"
                ))
                .map_err(|error| {
                    MemoryError::storage(format!("failed to prepare request log query: {error}"))
                })?;
            let rows = stmt
                .query_map(params![session_id.as_str()], raw_request_log)
                .map_err(|error| {
                    MemoryError::storage(format!("failed to query request logs: {error}"))
                })?;

            let mut logs = Vec::new();
            for row in rows {
                let raw = row.map_err(|error| {
                    MemoryError::storage(format!("failed to read request log row: {error}"))
                })?;
                logs.push(raw.into_request_log()?);
            }
            Ok(logs)
        })
    }
}

struct RawRequestLog {
    id: String,
    session_id: String,
    prompt: String,
    response: String,
    attempt_number: i64,
    retry_count: i64,
    final_status: String,
    fail_reason: String,
    error_message: String,
    counters: [i64; 4],
    created_at: (i64, i64),
    updated_at: (i64, i64),
}

fn raw_request_log(row: &Row<'_>) -> rusqlite::Result<RawRequestLog> {
    Ok(RawRequestLog {
        id: row.get(0)?,
        session_id: row.get(1)?,
        prompt: row.get(2)?,
        response: row.get(3)?,
        attempt_number: row.get(4)?,
        retry_count: row.get(5)?,
        final_status: row.get(6)?,
        fail_reason: row.get(7)?,
        error_message: row.get(8)?,
        counters: [row.get(9)?, row.get(10)?, row.get(11)?, row.get(12)?],
        created_at: (row.get(13)?, row.get(14)?),
        updated_at: (row.get(15)?, row.get(16)?),
    })
}

impl RawRequestLog {
    fn into_request_log(self) -> Result<RequestLog, MemoryError> {
        Ok(RequestLog {
            id: self.id,
            session_id: SessionId::new(self.session_id),
            prompt: self.prompt,
            response: self.response,
            attempt_number: decode_count(self.attempt_number, "attempt_number")?,
            retry_count: decode_count(self.retry_count, "retry_count")?,
            final_status: RequestStatus::from_str(&self.final_status)
                .map_err(|error| MemoryError::storage(error.message))?,
            fail_reason: decode_fail_reason(&self.fail_reason)?,
            error_message: self.error_message,
            usage: decode_usage(self.counters)?,
            created_at: decode_system_time(self.created_at.0, self.created_at.1)?,
            updated_at: decode_system_time(self.updated_at.0, self.updated_at.1)?,
        })
    }
}

pub(crate) fn decode_fail_reason(value: &str) -> Result<Option<FailReason>, MemoryError> {
    if value.is_empty() {
        return Ok(None);
    }
    FailReason::from_str(value)
        .map(Some)
        .map_err(|error| MemoryError::storage(error.message))
}

pub(crate) fn decode_count(value: i64, column: &str) -> Result<u32, MemoryError> {
    u32::try_from(value).map_err(|_| {
        MemoryError::storage(format!("column {column} out of range, got {value}"))
    })
}

pub(crate) fn decode_usage(counters: [i64; 4]) -> Result<Usage, MemoryError> {
    Ok(Usage {
        prompt_tokens: decode_count(counters[0], "prompt_tokens")?,
        response_tokens: decode_count(counters[1], "response_tokens")?,
        total_tokens: decode_count(counters[2], "total_tokens")?,
        thought_tokens: decode_count(counters[3], "thought_tokens")?,
    })
}

fn encode_system_time(value: SystemTime) -> Result<(i64, i64), MemoryError> {
    let duration = value.duration_since(UNIX_EPOCH).map_err(|error| {
        MemoryError::invalid_request(format!("timestamp predates unix epoch: {error}"))
    })?;
    Ok((
        duration.as_secs() as i64,
        i64::from(duration.subsec_nanos()),
    ))
}

fn decode_system_time(seconds: i64, nanos: i64) -> Result<SystemTime, MemoryError> {
    if seconds < 0 {
        return Err(MemoryError::storage(format!(
            "timestamp seconds must be non-negative, got {seconds}"
        )));
    }
    if !(0..1_000_000_000).contains(&nanos) {
        return Err(MemoryError::storage(format!(
            "timestamp nanos must be in [0, 1_000_000_000), got {nanos}"
        )));
    }
    Ok(UNIX_EPOCH + Duration::new(seconds as u64, nanos as u32))
}

pub(crate) fn default_sqlite_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os("PARLEY_SQLITE_PATH") {
        return PathBuf::from(explicit);
    }

    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".parley").join("parley.sqlite3");
    }

    PathBuf::from("parley.sqlite3")
}
