//! Operational hook contracts for provider attempts.

use crate::{FailReason, ProviderError, Usage};

/// Observes the attempt loop of a provider. All callbacks default to no-ops.
pub trait ProviderOperationHooks: Send + Sync {
    fn on_attempt_start(&self, _model: &str, _attempt: u32) {}

    fn on_retry_scheduled(&self, _model: &str, _attempt: u32, _reason: FailReason) {}

    fn on_success(&self, _model: &str, _attempts: u32, _usage: &Usage) {}

    fn on_failure(&self, _model: &str, _attempts: u32, _error: &ProviderError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOperationHooks;

impl ProviderOperationHooks for NoopOperationHooks {}
