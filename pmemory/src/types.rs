//! Stored session and migration records.

use std::time::SystemTime;

use pcommon::SessionId;
use pprovider::Rules;
use serde::{Deserialize, Serialize};

/// A conversation container. Rules are fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub rules: Rules,
    pub created_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub name: String,
    pub applied: bool,
    pub applied_at: Option<SystemTime>,
    /// Checksum stored when the migration was applied; empty when pending.
    pub checksum: String,
}
