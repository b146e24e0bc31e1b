//! Session, message and request-log persistence with SQLite, Postgres and in-memory backends.

mod adapter;
mod backend;
mod backends;
mod error;
mod migrations;
mod types;

pub mod prelude {
    pub use crate::{
        InMemoryMemoryBackend, MemoryBackend, MemoryBackendConfig, MemoryError, MemoryErrorKind,
        MemoryRequestLogStore, MigrationRecord, PostgresMemoryBackend, Session,
        SqliteMemoryBackend, create_default_memory_backend, create_memory_backend,
    };
}

pub use adapter::MemoryRequestLogStore;
pub use backend::{
    InMemoryMemoryBackend, MemoryBackend, MemoryBackendConfig, PostgresMemoryBackend,
    SqliteMemoryBackend, create_default_memory_backend, create_memory_backend,
};
pub use error::{MemoryError, MemoryErrorKind};
pub use migrations::{Migration, SqlDialect, embedded_migrations};
pub use types::{MigrationRecord, Session};

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::PathBuf;
    use std::sync::Arc;

    use pcommon::SessionId;
    use pprovider::{
        FailReason, NewRequestLog, ProviderErrorKind, RequestLogStore, RequestLogUpdate,
        RequestStatus, Role, Rules, Usage,
    };

    use crate::{
        InMemoryMemoryBackend, MemoryBackend, MemoryBackendConfig, MemoryErrorKind,
        MemoryRequestLogStore, SqliteMemoryBackend,
    };

    fn usage(total: u32) -> Usage {
        Usage {
            prompt_tokens: 3,
            response_tokens: total - 3,
            total_tokens: total,
            thought_tokens: 0,
        }
    }

    async fn exercise_sessions_and_messages(backend: &dyn MemoryBackend) {
        let rules = Rules::new("Reply with JSON.")
            .with_output_schema(r#"{"type":"object"}"#)
            .with_max_tokens(4096);
        let session = backend
            .create_session(rules.clone())
            .await
            .expect("session should be created");
        assert!(!session.id.is_empty());

        let loaded = backend
            .get_session(&session.id)
            .await
            .expect("session should load");
        assert_eq!(loaded.rules, rules);
        assert_eq!(loaded.id, session.id);

        let missing = backend
            .get_session(&SessionId::from("missing"))
            .await
            .expect_err("unknown session should fail");
        assert_eq!(missing.kind, MemoryErrorKind::NotFound);

        let first = backend
            .add_message(&session.id, Role::User, "hello", None)
            .await
            .expect("user message should be added");
        let second = backend
            .add_message(&session.id, Role::Assistant, r#"{"ok":true}"#, Some(usage(10)))
            .await
            .expect("assistant message should be added");
        let third = backend
            .add_message(&session.id, Role::User, "again", Some(Usage::default()))
            .await
            .expect("zero usage message should be added");
        assert_eq!((first.seq, second.seq, third.seq), (1, 2, 3));
        assert_eq!(second.usage, Some(usage(10)));

        let messages = backend
            .list_messages(&session.id)
            .await
            .expect("messages should list");
        let seqs = messages.iter().map(|m| m.seq).collect::<Vec<_>>();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, r#"{"ok":true}"#);
        assert_eq!(messages[1].usage, Some(usage(10)));
        assert_eq!(messages[0].usage, None);
        assert_eq!(messages[2].usage, None, "zero usage reads back as none");
        assert!(messages.iter().all(|m| m.session_id == session.id));

        let unknown = backend
            .add_message(&SessionId::from("missing"), Role::User, "x", None)
            .await
            .expect_err("unknown session should fail");
        assert_eq!(unknown.kind, MemoryErrorKind::NotFound);

        let empty = backend
            .list_messages(&SessionId::from("missing"))
            .await
            .expect("listing unknown session should succeed");
        assert!(empty.is_empty());
    }

    async fn exercise_request_logs(backend: &dyn MemoryBackend) {
        let session = backend
            .create_session(Rules::new("sys"))
            .await
            .expect("session should be created");

        let created = backend
            .add_request_log(NewRequestLog::new(session.id.clone(), "build it"))
            .await
            .expect("request log should be created");
        assert_eq!(created.final_status, RequestStatus::Pending);
        assert_eq!(created.attempt_number, 1);
        assert!(!created.id.is_empty());

        backend
            .update_request_log(
                &created.id,
                RequestLogUpdate::failed(FailReason::IncompleteJson, "JSON validation failed", 0)
                    .with_status(RequestStatus::Pending)
                    .with_response("{", usage(8)),
            )
            .await
            .expect("pending patch should apply");
        backend
            .update_request_log(
                &created.id,
                RequestLogUpdate::success("{}", 1, usage(12)),
            )
            .await
            .expect("success patch should apply");

        let logs = backend
            .list_request_logs(&session.id)
            .await
            .expect("request logs should list");
        assert_eq!(logs.len(), 1);
        let log = &logs[0];
        assert_eq!(log.final_status, RequestStatus::Success);
        assert_eq!(log.fail_reason, None);
        assert_eq!(log.error_message, "");
        assert_eq!(log.response, "{}");
        assert_eq!(log.retry_count, 1);
        assert_eq!(log.usage, usage(12));
        assert_eq!(log.prompt, "build it");
        assert!(log.updated_at >= log.created_at);

        let missing = backend
            .update_request_log("no-such-log", RequestLogUpdate::success("{}", 0, usage(4)))
            .await
            .expect_err("unknown log id should fail");
        assert_eq!(missing.kind, MemoryErrorKind::NotFound);
        assert_eq!(
            backend
                .list_request_logs(&session.id)
                .await
                .expect("request logs should list")
                .len(),
            1,
            "updates never insert"
        );

        backend
            .add_message(&session.id, Role::User, "hi", None)
            .await
            .expect("message should be added");
        backend
            .delete_session(&session.id)
            .await
            .expect("session should delete");

        assert!(
            backend
                .list_messages(&session.id)
                .await
                .expect("messages should list")
                .is_empty()
        );
        assert!(
            backend
                .list_request_logs(&session.id)
                .await
                .expect("request logs should list")
                .is_empty()
        );
        let again = backend
            .delete_session(&session.id)
            .await
            .expect_err("second delete should fail");
        assert_eq!(again.kind, MemoryErrorKind::NotFound);
    }

    async fn exercise_concurrent_appends(backend: Arc<dyn MemoryBackend>) {
        let session = backend
            .create_session(Rules::new("sys"))
            .await
            .expect("session should be created");

        let mut handles = Vec::new();
        for index in 0..16 {
            let backend = Arc::clone(&backend);
            let session_id = session.id.clone();
            handles.push(tokio::spawn(async move {
                let content = format!("message-{index}");
                backend
                    .add_message(&session_id, Role::User, &content, None)
                    .await
                    .map(|message| message.seq)
            }));
        }

        let mut seqs = BTreeSet::new();
        for handle in handles {
            let seq = handle
                .await
                .expect("task should join")
                .expect("append should succeed");
            assert!(seqs.insert(seq), "seq {seq} assigned twice");
        }
        assert_eq!(seqs, (1..=16).collect::<BTreeSet<u32>>());
    }

    fn temp_db(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("nested").join("parley.sqlite3")
    }

    #[tokio::test]
    async fn in_memory_backend_stores_sessions_and_messages() {
        exercise_sessions_and_messages(&InMemoryMemoryBackend::new()).await;
    }

    #[tokio::test]
    async fn in_memory_backend_patches_and_cascades_request_logs() {
        exercise_request_logs(&InMemoryMemoryBackend::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_memory_backend_assigns_contiguous_seq_under_concurrency() {
        exercise_concurrent_appends(Arc::new(InMemoryMemoryBackend::new())).await;
    }

    #[tokio::test]
    async fn sqlite_backend_stores_sessions_and_messages() {
        let backend = SqliteMemoryBackend::new_in_memory().expect("sqlite should open");
        exercise_sessions_and_messages(&backend).await;
    }

    #[tokio::test]
    async fn sqlite_backend_patches_and_cascades_request_logs() {
        let backend = SqliteMemoryBackend::new_in_memory().expect("sqlite should open");
        exercise_request_logs(&backend).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sqlite_backend_assigns_contiguous_seq_under_concurrency() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let backend = SqliteMemoryBackend::new(temp_db(&dir)).expect("sqlite should open");
        exercise_concurrent_appends(Arc::new(backend)).await;
    }

    #[tokio::test]
    async fn sqlite_file_survives_reopen_without_reapplying_migrations() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let path = temp_db(&dir);

        let session_id = {
            let backend = SqliteMemoryBackend::new(&path).expect("sqlite should open");
            let session = backend
                .create_session(Rules::new("persisted"))
                .await
                .expect("session should be created");
            backend
                .add_message(&session.id, Role::User, "kept", None)
                .await
                .expect("message should be added");
            session.id
        };

        let reopened = SqliteMemoryBackend::new(&path).expect("sqlite should reopen");
        let session = reopened
            .get_session(&session_id)
            .await
            .expect("session should survive reopen");
        assert_eq!(session.rules.system_prompt, "persisted");

        let status = reopened
            .migration_status()
            .await
            .expect("status should load");
        assert!(status.iter().all(|record| record.applied));
        assert_eq!(status.len(), 3);
    }

    #[tokio::test]
    async fn sqlite_rollback_reverts_last_migration_and_migrate_restores_it() {
        let backend = SqliteMemoryBackend::new_in_memory().expect("sqlite should open");

        backend.rollback().await.expect("rollback should succeed");
        let status = backend
            .migration_status()
            .await
            .expect("status should load");
        assert!(status[0].applied);
        assert!(status[1].applied);
        assert!(!status[2].applied);
        assert!(status[2].applied_at.is_none());

        let error = backend
            .add_request_log(NewRequestLog::new("s", "p"))
            .await
            .expect_err("request log table should be gone");
        assert_eq!(error.kind, MemoryErrorKind::Storage);

        backend.create_schema().await.expect("migrate should succeed");
        backend
            .create_schema()
            .await
            .expect("migrate should be idempotent");
        backend
            .add_request_log(NewRequestLog::new("s", "p"))
            .await
            .expect("request log table should be restored");
    }

    #[tokio::test]
    async fn sqlite_rollback_without_applied_migrations_fails() {
        let backend = SqliteMemoryBackend::new_in_memory().expect("sqlite should open");
        for _ in 0..3 {
            backend.rollback().await.expect("rollback should succeed");
        }

        let error = backend
            .rollback()
            .await
            .expect_err("nothing left to roll back");
        assert_eq!(error.kind, MemoryErrorKind::Migration);
    }

    #[tokio::test]
    async fn sqlite_drop_schema_then_create_schema_starts_fresh() {
        let backend = SqliteMemoryBackend::new_in_memory().expect("sqlite should open");
        let session = backend
            .create_session(Rules::new("sys"))
            .await
            .expect("session should be created");

        backend.drop_schema().await.expect("drop should succeed");
        backend.create_schema().await.expect("create should succeed");

        let error = backend
            .get_session(&session.id)
            .await
            .expect_err("dropped data should be gone");
        assert_eq!(error.kind, MemoryErrorKind::NotFound);
    }

    #[tokio::test]
    async fn request_log_store_adapter_forwards_to_backend() {
        let backend: Arc<dyn MemoryBackend> = Arc::new(InMemoryMemoryBackend::new());
        let store = MemoryRequestLogStore::new(Arc::clone(&backend));

        let log = store
            .add_request_log(NewRequestLog::new("session-a", "prompt"))
            .await
            .expect("adapter add should succeed");
        store
            .update_request_log(
                &log.id,
                RequestLogUpdate::failed(FailReason::Timeout, "deadline exceeded", 0),
            )
            .await
            .expect("adapter update should succeed");

        let logs = backend
            .list_request_logs(&SessionId::from("session-a"))
            .await
            .expect("logs should list");
        assert_eq!(logs[0].fail_reason, Some(FailReason::Timeout));
        assert_eq!(logs[0].final_status, RequestStatus::Failed);

        let error = store
            .update_request_log("missing", RequestLogUpdate::success("{}", 0, Usage::default()))
            .await
            .expect_err("unknown id should fail");
        assert_eq!(error.kind, ProviderErrorKind::Other);
        assert!(error.message.contains("NotFound"));
    }

    #[test]
    fn backend_config_follows_database_url_scheme() {
        assert_eq!(
            MemoryBackendConfig::from_database_url("postgres://u:p@localhost/db"),
            MemoryBackendConfig::Postgres {
                url: "postgres://u:p@localhost/db".to_string()
            }
        );
        assert!(matches!(
            MemoryBackendConfig::from_database_url("postgresql://localhost/db"),
            MemoryBackendConfig::Postgres { .. }
        ));
        assert_eq!(
            MemoryBackendConfig::from_database_url("sqlite:///tmp/parley.db"),
            MemoryBackendConfig::Sqlite {
                path: PathBuf::from("/tmp/parley.db")
            }
        );
        assert!(matches!(
            MemoryBackendConfig::from_database_url(""),
            MemoryBackendConfig::Sqlite { .. }
        ));
    }
}
