//! Conversation model values shared by the provider, memory, and chat crates.
//!
//! ```rust
//! use pprovider::{Message, Role, Rules};
//!
//! let rules = Rules::new("Reply with JSON.").with_max_tokens(512);
//! let turn = Message::new(Role::User, "hello");
//!
//! assert_eq!(rules.max_tokens, 512);
//! assert_eq!(turn.role.as_str(), "user");
//! ```

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::SystemTime;

use pcommon::SessionId;
use serde::{Deserialize, Serialize};

use crate::ProviderError;

/// Per-session generation configuration. Travels with every send for that session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules {
    pub system_prompt: String,
    /// Serialized response schema. Ignored by providers when it does not parse.
    pub output_schema: String,
    /// Output token cap; `0` leaves the provider default in place.
    pub max_tokens: u32,
}

impl Rules {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_output_schema(mut self, output_schema: impl Into<String>) -> Self {
        self.output_schema = output_schema.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(ProviderError::other(format!("unknown message role '{value}'"))),
        }
    }
}

/// Token counters as reported by the provider. `total_tokens` is not recomputed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub response_tokens: u32,
    pub total_tokens: u32,
    pub thought_tokens: u32,
}

impl Usage {
    pub fn is_zero(&self) -> bool {
        self.prompt_tokens == 0
            && self.response_tokens == 0
            && self.total_tokens == 0
            && self.thought_tokens == 0
    }
}

/// One conversation turn.
///
/// Stored messages are ordered by `seq` only, which is 1-indexed and gapless per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: SessionId,
    pub seq: u32,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub created_at: SystemTime,
}

impl Message {
    /// Builds a transient turn that has not been stored.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            session_id: SessionId::default(),
            seq: 0,
            role,
            content: content.into(),
            usage: None,
            created_at: SystemTime::now(),
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Successful generation output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Success,
    Failed,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(ProviderError::other(format!(
                "unknown request status '{value}'"
            ))),
        }
    }
}

/// Audit code recorded on a request log when an attempt does not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    Timeout,
    NetworkError,
    UnknownError,
    IncompleteJson,
    MaxRetriesExceeded,
}

impl FailReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::UnknownError => "unknown_error",
            Self::IncompleteJson => "incomplete_json",
            Self::MaxRetriesExceeded => "max_retries_exceeded",
        }
    }
}

impl Display for FailReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailReason {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "timeout" => Ok(Self::Timeout),
            "network_error" => Ok(Self::NetworkError),
            "unknown_error" => Ok(Self::UnknownError),
            "incomplete_json" => Ok(Self::IncompleteJson),
            "max_retries_exceeded" => Ok(Self::MaxRetriesExceeded),
            _ => Err(ProviderError::other(format!("unknown fail reason '{value}'"))),
        }
    }
}

/// Request log fields supplied by the caller; the store assigns identity and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequestLog {
    pub session_id: SessionId,
    pub prompt: String,
    pub response: String,
    pub attempt_number: u32,
    pub retry_count: u32,
}

impl NewRequestLog {
    pub fn new(session_id: impl Into<SessionId>, prompt: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            prompt: prompt.into(),
            response: String::new(),
            attempt_number: 1,
            retry_count: 0,
        }
    }
}

/// One audited send call. Created pending, then patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLog {
    pub id: String,
    pub session_id: SessionId,
    pub prompt: String,
    pub response: String,
    pub attempt_number: u32,
    pub retry_count: u32,
    pub final_status: RequestStatus,
    pub fail_reason: Option<FailReason>,
    pub error_message: String,
    pub usage: Usage,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Patch applied to an existing request log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLogUpdate {
    pub response: String,
    pub status: RequestStatus,
    pub fail_reason: Option<FailReason>,
    pub error_message: String,
    pub retry_count: u32,
    pub usage: Option<Usage>,
}

impl RequestLogUpdate {
    pub fn success(response: impl Into<String>, retry_count: u32, usage: Usage) -> Self {
        Self {
            response: response.into(),
            status: RequestStatus::Success,
            fail_reason: None,
            error_message: String::new(),
            retry_count,
            usage: Some(usage),
        }
    }

    pub fn failed(
        fail_reason: FailReason,
        error_message: impl Into<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            response: String::new(),
            status: RequestStatus::Failed,
            fail_reason: Some(fail_reason),
            error_message: error_message.into(),
            retry_count,
            usage: None,
        }
    }

    pub fn with_status(mut self, status: RequestStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_response(mut self, response: impl Into<String>, usage: Usage) -> Self {
        self.response = response.into();
        self.usage = Some(usage);
        self
    }

    /// Applies the patch to a loaded row. A missing usage resets the counters.
    pub fn apply_to(&self, log: &mut RequestLog) {
        log.response = self.response.clone();
        log.final_status = self.status;
        log.fail_reason = self.fail_reason;
        log.error_message = self.error_message.clone();
        log.retry_count = self.retry_count;
        log.usage = self.usage.unwrap_or_default();
        log.updated_at = SystemTime::now();
    }
}
