//! Runtime wiring helpers: storage, provider, and chat service in one bundle.

use std::sync::Arc;

use pchat::ChatService;
use pmemory::{InMemoryMemoryBackend, MemoryBackend, MemoryRequestLogStore, create_memory_backend};
use pprovider::{GenerationProvider, RequestLogStore};

use crate::{AppConfig, RuntimeError, build_gemini_provider};

#[derive(Clone)]
pub struct RuntimeBundle {
    pub backend: Arc<dyn MemoryBackend>,
    pub provider: Arc<dyn GenerationProvider>,
    pub chat: ChatService,
}

pub fn in_memory_backend() -> Arc<dyn MemoryBackend> {
    Arc::new(InMemoryMemoryBackend::new())
}

pub fn request_log_store(backend: Arc<dyn MemoryBackend>) -> Arc<dyn RequestLogStore> {
    Arc::new(MemoryRequestLogStore::new(backend))
}

/// Opens the configured backend, applies pending migrations, and wires the Gemini provider
/// to audit into the same backend.
pub async fn build_runtime(config: &AppConfig) -> Result<RuntimeBundle, RuntimeError> {
    let backend = create_memory_backend(config.memory_config())?;
    backend.create_schema().await?;
    tracing::info!(
        phase = "runtime",
        event = "schema_ready",
        model = %config.model_id,
    );

    build_runtime_with_memory(config, backend)
}

pub fn build_runtime_with_memory(
    config: &AppConfig,
    backend: Arc<dyn MemoryBackend>,
) -> Result<RuntimeBundle, RuntimeError> {
    let provider = build_gemini_provider(config, Some(request_log_store(Arc::clone(&backend))))?;
    Ok(build_runtime_with(provider, backend))
}

pub fn build_runtime_with(
    provider: Arc<dyn GenerationProvider>,
    backend: Arc<dyn MemoryBackend>,
) -> RuntimeBundle {
    let chat = ChatService::new(Arc::clone(&provider), Arc::clone(&backend));
    RuntimeBundle {
        backend,
        provider,
        chat,
    }
}
