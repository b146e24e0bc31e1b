//! Tracing-based observability hooks for generation attempts.
//!
//! ```rust
//! use pobserve::TracingObservabilityHooks;
//! use pprovider::ProviderOperationHooks;
//!
//! fn accepts_provider_hooks(_hooks: &dyn ProviderOperationHooks) {}
//!
//! let hooks = TracingObservabilityHooks;
//! accepts_provider_hooks(&hooks);
//! ```

use pprovider::{FailReason, ProviderError, ProviderOperationHooks, Usage};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObservabilityHooks;

impl ProviderOperationHooks for TracingObservabilityHooks {
    fn on_attempt_start(&self, model: &str, attempt: u32) {
        tracing::info!(phase = "provider", event = "attempt_start", model, attempt);
    }

    fn on_retry_scheduled(&self, model: &str, attempt: u32, reason: FailReason) {
        tracing::warn!(
            phase = "provider",
            event = "retry_scheduled",
            model,
            attempt,
            fail_reason = %reason
        );
    }

    fn on_success(&self, model: &str, attempts: u32, usage: &Usage) {
        tracing::info!(
            phase = "provider",
            event = "success",
            model,
            attempts,
            prompt_tokens = usage.prompt_tokens,
            response_tokens = usage.response_tokens,
            total_tokens = usage.total_tokens,
            thought_tokens = usage.thought_tokens
        );
    }

    fn on_failure(&self, model: &str, attempts: u32, error: &ProviderError) {
        tracing::error!(
            phase = "provider",
            event = "failure",
            model,
            attempts,
            error_kind = ?error.kind,
            fail_reason = %error.fail_reason(),
            error = %error
        );
    }
}
