//! Adapter that exposes a memory backend as the provider's request-log sink.

use std::sync::Arc;

use pprovider::{
    NewRequestLog, ProviderError, ProviderFuture, RequestLog, RequestLogStore, RequestLogUpdate,
};

use crate::backend::MemoryBackend;
use crate::error::MemoryError;

#[derive(Clone)]
pub struct MemoryRequestLogStore {
    backend: Arc<dyn MemoryBackend>,
}

impl MemoryRequestLogStore {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> Arc<dyn MemoryBackend> {
        Arc::clone(&self.backend)
    }
}

impl RequestLogStore for MemoryRequestLogStore {
    fn add_request_log<'a>(
        &'a self,
        log: NewRequestLog,
    ) -> ProviderFuture<'a, Result<RequestLog, ProviderError>> {
        Box::pin(async move {
            self.backend
                .add_request_log(log)
                .await
                .map_err(memory_error_to_provider_error)
        })
    }

    fn update_request_log<'a>(
        &'a self,
        id: &'a str,
        update: RequestLogUpdate,
    ) -> ProviderFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            self.backend
                .update_request_log(id, update)
                .await
                .map_err(memory_error_to_provider_error)
        })
    }
}

fn memory_error_to_provider_error(error: MemoryError) -> ProviderError {
    ProviderError::other(format!("request log store: {error}"))
}
