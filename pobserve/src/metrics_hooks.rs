//! Metrics-based observability hooks for generation attempts.
//!
//! ```rust
//! use pobserve::MetricsObservabilityHooks;
//! use pprovider::ProviderOperationHooks;
//!
//! fn accepts_provider_hooks(_hooks: &dyn ProviderOperationHooks) {}
//!
//! let hooks = MetricsObservabilityHooks;
//! accepts_provider_hooks(&hooks);
//! ```

use pprovider::{FailReason, ProviderError, ProviderOperationHooks, Usage};

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsObservabilityHooks;

impl ProviderOperationHooks for MetricsObservabilityHooks {
    fn on_attempt_start(&self, model: &str, _attempt: u32) {
        metrics::counter!(
            "parley_provider_attempt_start_total",
            "model" => model.to_string()
        )
        .increment(1);
    }

    fn on_retry_scheduled(&self, model: &str, _attempt: u32, reason: FailReason) {
        metrics::counter!(
            "parley_provider_retry_scheduled_total",
            "model" => model.to_string(),
            "fail_reason" => reason.as_str()
        )
        .increment(1);
    }

    fn on_success(&self, model: &str, attempts: u32, usage: &Usage) {
        metrics::counter!(
            "parley_provider_success_total",
            "model" => model.to_string()
        )
        .increment(1);
        metrics::histogram!(
            "parley_provider_attempts_per_success",
            "model" => model.to_string()
        )
        .record(f64::from(attempts));

        for (kind, count) in [
            ("prompt", usage.prompt_tokens),
            ("response", usage.response_tokens),
            ("thought", usage.thought_tokens),
        ] {
            metrics::histogram!(
                "parley_provider_tokens",
                "model" => model.to_string(),
                "kind" => kind
            )
            .record(f64::from(count));
        }
    }

    fn on_failure(&self, model: &str, attempts: u32, error: &ProviderError) {
        metrics::counter!(
            "parley_provider_failure_total",
            "model" => model.to_string(),
            "fail_reason" => error.fail_reason().as_str()
        )
        .increment(1);
        metrics::histogram!(
            "parley_provider_attempts_per_failure",
            "model" => model.to_string()
        )
        .record(f64::from(attempts));
    }
}
