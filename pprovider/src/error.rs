//! Shared provider error kinds and error value helpers.
//!
//! ```rust
//! use pprovider::{FailReason, ProviderError};
//!
//! let empty = ProviderError::empty_prompt();
//! assert!(!empty.is_provider_failed());
//!
//! let timeout = ProviderError::timeout("deadline exceeded");
//! assert!(timeout.retryable);
//! assert_eq!(timeout.fail_reason(), FailReason::Timeout);
//! ```

use crate::FailReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    EmptyPrompt,
    Timeout,
    Network,
    Cancelled,
    Http,
    Decode,
    EmptyResponse,
    MaxRetriesExceeded,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn empty_prompt() -> Self {
        Self::new(ProviderErrorKind::EmptyPrompt, "prompt is empty", false)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message, true)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message, true)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Cancelled, message, true)
    }

    pub fn http(status: u16, body: impl AsRef<str>) -> Self {
        Self::new(
            ProviderErrorKind::Http,
            format!("status {status}: {}", body.as_ref()),
            true,
        )
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Decode, message, true)
    }

    pub fn empty_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::EmptyResponse, message, true)
    }

    pub fn max_retries_exceeded(attempts: u32) -> Self {
        Self::new(
            ProviderErrorKind::MaxRetriesExceeded,
            format!("JSON validation failed after {attempts} attempts"),
            false,
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Other, message, false)
    }

    /// Every error except a rejected empty prompt is a provider failure.
    pub fn is_provider_failed(&self) -> bool {
        self.kind != ProviderErrorKind::EmptyPrompt
    }

    /// Audit classification recorded on the request log.
    pub fn fail_reason(&self) -> FailReason {
        match self.kind {
            ProviderErrorKind::Timeout => FailReason::Timeout,
            ProviderErrorKind::Network | ProviderErrorKind::Cancelled => FailReason::NetworkError,
            ProviderErrorKind::MaxRetriesExceeded => FailReason::MaxRetriesExceeded,
            _ => FailReason::UnknownError,
        }
    }
}
