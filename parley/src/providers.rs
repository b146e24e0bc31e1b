//! Provider construction surface for facade consumers.

use std::sync::Arc;

use pobserve::{
    FanoutProviderHooks, MetricsObservabilityHooks, SafeProviderHooks, TracingObservabilityHooks,
};
use pprovider::{GenerationProvider, ProviderError, ProviderOperationHooks, RequestLogStore};
use reqwest::Client;

use crate::AppConfig;

/// Tracing and metrics hooks, each isolated from the attempt loop's control flow.
pub fn default_hooks() -> Arc<dyn ProviderOperationHooks> {
    Arc::new(
        FanoutProviderHooks::new()
            .with_hooks(Arc::new(SafeProviderHooks::new(TracingObservabilityHooks)))
            .with_hooks(Arc::new(SafeProviderHooks::new(MetricsObservabilityHooks))),
    )
}

/// Builds the Gemini provider described by `config`, auditing through `store` when given.
pub fn build_gemini_provider(
    config: &AppConfig,
    store: Option<Arc<dyn RequestLogStore>>,
) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
    if config.gemini_api.expose().trim().is_empty() {
        return Err(ProviderError::other("GEMINI_API must not be empty"));
    }
    if config.model_id.trim().is_empty() {
        return Err(ProviderError::other("MODEL_ID must not be empty"));
    }

    let http = Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|err| ProviderError::other(err.to_string()))?;

    build_gemini(config, store, http)
}

#[cfg(feature = "provider-gemini")]
fn build_gemini(
    config: &AppConfig,
    store: Option<Arc<dyn RequestLogStore>>,
    http: Client,
) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
    use pprovider::adapters::gemini::{GeminiHttpTransport, GeminiProvider};

    let mut transport = GeminiHttpTransport::new(http);
    if let Some(base_url) = &config.gemini_base_url {
        transport = transport.with_base_url(base_url.clone());
    }

    let mut provider = GeminiProvider::new(
        config.gemini_api.clone(),
        config.model_id.trim(),
        Arc::new(transport),
    )
    .with_hooks(default_hooks());
    if let Some(store) = store {
        provider = provider.with_request_log_store(store);
    }

    Ok(Arc::new(provider))
}

#[cfg(not(feature = "provider-gemini"))]
fn build_gemini(
    _config: &AppConfig,
    _store: Option<Arc<dyn RequestLogStore>>,
    _http: Client,
) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
    Err(ProviderError::other(
        "provider-gemini feature is not enabled on parley",
    ))
}
