//! Embedded schema migrations and the bookkeeping shared by SQL backends.

use std::collections::HashMap;
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::error::MemoryError;
use crate::types::MigrationRecord;

pub(crate) const MIGRATIONS_TABLE: &str = "parley_migrations";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub name: &'static str,
    pub up: &'static str,
    pub down: Option<&'static str>,
}

impl Migration {
    /// Lowercase hex SHA-256 of the up script.
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.up.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    Sqlite,
}

macro_rules! migration {
    ($dialect:literal, $name:literal) => {
        Migration {
            name: $name,
            up: include_str!(concat!("../migrations/", $dialect, "/", $name, ".up.sql")),
            down: Some(include_str!(concat!(
                "../migrations/",
                $dialect,
                "/",
                $name,
                ".down.sql"
            ))),
        }
    };
}

const POSTGRES_MIGRATIONS: &[Migration] = &[
    migration!("postgres", "0001_create_sessions"),
    migration!("postgres", "0002_create_messages"),
    migration!("postgres", "0003_create_request_logs"),
];

const SQLITE_MIGRATIONS: &[Migration] = &[
    migration!("sqlite", "0001_create_sessions"),
    migration!("sqlite", "0002_create_messages"),
    migration!("sqlite", "0003_create_request_logs"),
];

/// Known migrations for a dialect, in application order.
pub fn embedded_migrations(dialect: SqlDialect) -> &'static [Migration] {
    match dialect {
        SqlDialect::Postgres => POSTGRES_MIGRATIONS,
        SqlDialect::Sqlite => SQLITE_MIGRATIONS,
    }
}

/// A row of the migrations table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AppliedMigration {
    pub id: i64,
    pub name: String,
    pub applied_at: SystemTime,
    pub checksum: String,
}

/// Returns the migrations that still need to run, failing on checksum drift.
pub(crate) fn pending_migrations<'m>(
    known: &'m [Migration],
    applied: &[AppliedMigration],
) -> Result<Vec<&'m Migration>, MemoryError> {
    let applied = index_by_name(applied);
    let mut pending = Vec::new();

    for migration in known {
        match applied.get(migration.name) {
            Some(record) => {
                let expected = migration.checksum();
                if record.checksum != expected {
                    return Err(MemoryError::migration(format!(
                        "migration {} checksum mismatch (recorded {}, embedded {})",
                        migration.name, record.checksum, expected
                    )));
                }
            }
            None => pending.push(migration),
        }
    }

    Ok(pending)
}

/// Picks the most recently applied migration and its down script.
pub(crate) fn rollback_target<'m>(
    known: &'m [Migration],
    applied: &[AppliedMigration],
) -> Result<(AppliedMigration, &'m str), MemoryError> {
    let last = applied
        .iter()
        .max_by_key(|record| record.id)
        .cloned()
        .ok_or_else(|| MemoryError::migration("no applied migrations to roll back"))?;

    let down = known
        .iter()
        .find(|migration| migration.name == last.name)
        .and_then(|migration| migration.down)
        .filter(|script| !script.trim().is_empty())
        .ok_or_else(|| {
            MemoryError::migration(format!("no down migration for {}", last.name))
        })?;

    Ok((last, down))
}

pub(crate) fn migration_records(
    known: &[Migration],
    applied: &[AppliedMigration],
) -> Vec<MigrationRecord> {
    let applied = index_by_name(applied);

    known
        .iter()
        .map(|migration| match applied.get(migration.name) {
            Some(record) => MigrationRecord {
                name: migration.name.to_string(),
                applied: true,
                applied_at: Some(record.applied_at),
                checksum: record.checksum.clone(),
            },
            None => MigrationRecord {
                name: migration.name.to_string(),
                applied: false,
                applied_at: None,
                checksum: String::new(),
            },
        })
        .collect()
}

fn index_by_name(applied: &[AppliedMigration]) -> HashMap<&str, &AppliedMigration> {
    applied
        .iter()
        .map(|record| (record.name.as_str(), record))
        .collect()
}
