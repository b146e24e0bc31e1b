use std::panic::{AssertUnwindSafe, catch_unwind};

use pprovider::{FailReason, ProviderError, ProviderOperationHooks, Usage};

/// Contains panics raised by the wrapped hooks so the attempt loop keeps running.
pub struct SafeProviderHooks<H> {
    inner: H,
}

impl<H> SafeProviderHooks<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> ProviderOperationHooks for SafeProviderHooks<H>
where
    H: ProviderOperationHooks,
{
    fn on_attempt_start(&self, model: &str, attempt: u32) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_attempt_start(model, attempt)
        }));
    }

    fn on_retry_scheduled(&self, model: &str, attempt: u32, reason: FailReason) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_retry_scheduled(model, attempt, reason)
        }));
    }

    fn on_success(&self, model: &str, attempts: u32, usage: &Usage) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_success(model, attempts, usage)
        }));
    }

    fn on_failure(&self, model: &str, attempts: u32, error: &ProviderError) {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            self.inner.on_failure(model, attempts, error)
        }));
    }
}
