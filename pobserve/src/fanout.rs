use std::sync::Arc;

use pprovider::{FailReason, ProviderError, ProviderOperationHooks, Usage};

/// Forwards every callback to each registered hook in insertion order.
#[derive(Clone, Default)]
pub struct FanoutProviderHooks {
    hooks: Vec<Arc<dyn ProviderOperationHooks>>,
}

impl FanoutProviderHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ProviderOperationHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl ProviderOperationHooks for FanoutProviderHooks {
    fn on_attempt_start(&self, model: &str, attempt: u32) {
        for hooks in &self.hooks {
            hooks.on_attempt_start(model, attempt);
        }
    }

    fn on_retry_scheduled(&self, model: &str, attempt: u32, reason: FailReason) {
        for hooks in &self.hooks {
            hooks.on_retry_scheduled(model, attempt, reason);
        }
    }

    fn on_success(&self, model: &str, attempts: u32, usage: &Usage) {
        for hooks in &self.hooks {
            hooks.on_success(model, attempts, usage);
        }
    }

    fn on_failure(&self, model: &str, attempts: u32, error: &ProviderError) {
        for hooks in &self.hooks {
            hooks.on_failure(model, attempts, error);
        }
    }
}
