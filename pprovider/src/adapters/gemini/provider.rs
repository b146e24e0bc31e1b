//! Gemini provider: validated, audited, at most two attempts per send.

use std::sync::Arc;

use pcommon::SessionId;
use serde_json::Value;

use crate::{
    FailReason, GenerationProvider, GenerationResult, Message, NewRequestLog, NoopOperationHooks,
    ProviderError, ProviderFuture, ProviderOperationHooks, RequestLogStore, RequestLogUpdate,
    RequestStatus, Role, Rules, SecretString, SendOptions, is_structurally_complete,
};

use super::transport::{GeminiHttpTransport, GeminiTransport};
use super::types::{GeminiAuth, GeminiContent, GeminiRequest, GeminiResponse};

pub const MAX_ATTEMPTS: u32 = 2;

pub(crate) const INCOMPLETE_JSON_MESSAGE: &str = "JSON validation failed";
pub(crate) const MAX_RETRIES_MESSAGE: &str = "JSON validation failed after max retries";
pub(crate) const REGENERATE_INSTRUCTION: &str = "Your previous response had incomplete JSON (mismatched brackets). Please regenerate the complete, valid JSON response.";

#[derive(Clone)]
pub struct GeminiProvider {
    api_key: SecretString,
    model: String,
    transport: Arc<dyn GeminiTransport>,
    request_logs: Option<Arc<dyn RequestLogStore>>,
    hooks: Arc<dyn ProviderOperationHooks>,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &self.api_key)
            .field("model", &self.model)
            .field("transport", &self.transport)
            .field("request_logs", &self.request_logs.is_some())
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<SecretString>,
        model: impl Into<String>,
        transport: Arc<dyn GeminiTransport>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            transport,
            request_logs: None,
            hooks: Arc::new(NoopOperationHooks),
        }
    }

    /// Builds a provider that talks to the public endpoint through `client`.
    pub fn from_client(
        api_key: impl Into<SecretString>,
        model: impl Into<String>,
        client: reqwest::Client,
    ) -> Self {
        Self::new(api_key, model, Arc::new(GeminiHttpTransport::new(client)))
    }

    pub fn with_request_log_store(mut self, store: Arc<dyn RequestLogStore>) -> Self {
        self.request_logs = Some(store);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ProviderOperationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn build_gemini_request(
        &self,
        rules: &Rules,
        history: &[Message],
        prompt: &str,
    ) -> GeminiRequest {
        let mut contents = history.iter().map(GeminiContent::from).collect::<Vec<_>>();
        contents.push(GeminiContent::user(prompt));

        let system_instruction =
            (!rules.system_prompt.is_empty()).then(|| rules.system_prompt.clone());
        let max_output_tokens = (rules.max_tokens > 0).then_some(rules.max_tokens);

        // A schema that is not a JSON object is left out rather than rejected.
        let response_schema = if rules.output_schema.is_empty() {
            None
        } else {
            serde_json::from_str::<Value>(&rules.output_schema)
                .ok()
                .filter(Value::is_object)
        };

        GeminiRequest {
            model: self.model.clone(),
            contents,
            system_instruction,
            max_output_tokens,
            response_schema,
        }
    }

    async fn attempt(
        &self,
        request: GeminiRequest,
        options: &SendOptions,
    ) -> Result<GeminiResponse, ProviderError> {
        if options.is_cancelled() {
            return Err(ProviderError::cancelled("send was cancelled"));
        }
        if options.deadline_passed() {
            return Err(ProviderError::timeout("deadline exceeded before request"));
        }

        let call = self
            .transport
            .generate(request, GeminiAuth::new(self.api_key.clone()));

        let bounded = async {
            match options.deadline {
                Some(deadline) => {
                    tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), call)
                        .await
                        .map_err(|_| ProviderError::timeout("deadline exceeded during request"))?
                }
                None => call.await,
            }
        };

        match &options.cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(ProviderError::cancelled("send was cancelled")),
                    result = bounded => result,
                }
            }
            None => bounded.await,
        }
    }

    async fn run(
        &self,
        rules: &Rules,
        history: &[Message],
        prompt: &str,
        options: SendOptions,
    ) -> Result<GenerationResult, ProviderError> {
        if prompt.is_empty() {
            return Err(ProviderError::empty_prompt());
        }

        let session_id = history
            .first()
            .map(|message| message.session_id.clone())
            .filter(|session_id| !session_id.is_empty())
            .or_else(|| options.session_hint.clone())
            .unwrap_or_default();

        let audit = AuditTrail::open(self.request_logs.as_deref(), session_id, prompt).await;
        let mut history = history.to_vec();
        let mut attempt = 1;

        loop {
            self.hooks.on_attempt_start(&self.model, attempt);
            let retry_count = attempt - 1;
            let last_attempt = attempt >= MAX_ATTEMPTS;
            let request = self.build_gemini_request(rules, &history, prompt);

            let response = match self.attempt(request, &options).await {
                Ok(response) => response,
                Err(error) => {
                    let reason = error.fail_reason();
                    audit
                        .record(RequestLogUpdate::failed(
                            reason,
                            error.message.clone(),
                            retry_count,
                        ))
                        .await;

                    if last_attempt {
                        self.hooks.on_failure(&self.model, attempt, &error);
                        return Err(error);
                    }

                    self.hooks.on_retry_scheduled(&self.model, attempt, reason);
                    attempt += 1;
                    continue;
                }
            };

            let result = GenerationResult {
                content: response.text,
                usage: response.usage.into(),
            };

            if is_structurally_complete(&result.content) {
                audit
                    .record(RequestLogUpdate::success(
                        result.content.clone(),
                        retry_count,
                        result.usage,
                    ))
                    .await;
                self.hooks.on_success(&self.model, attempt, &result.usage);
                return Ok(result);
            }

            if last_attempt {
                let error = ProviderError::max_retries_exceeded(MAX_ATTEMPTS);
                audit
                    .record(
                        RequestLogUpdate::failed(
                            FailReason::MaxRetriesExceeded,
                            MAX_RETRIES_MESSAGE,
                            retry_count,
                        )
                        .with_response(result.content, result.usage),
                    )
                    .await;
                self.hooks.on_failure(&self.model, attempt, &error);
                return Err(error);
            }

            audit
                .record(
                    RequestLogUpdate::failed(
                        FailReason::IncompleteJson,
                        INCOMPLETE_JSON_MESSAGE,
                        retry_count,
                    )
                    .with_status(RequestStatus::Pending)
                    .with_response(result.content.clone(), result.usage),
                )
                .await;
            self.hooks
                .on_retry_scheduled(&self.model, attempt, FailReason::IncompleteJson);

            history.push(Message::new(Role::Assistant, result.content));
            history.push(Message::new(Role::User, REGENERATE_INSTRUCTION));
            attempt += 1;
        }
    }
}

impl GenerationProvider for GeminiProvider {
    fn send<'a>(
        &'a self,
        rules: &'a Rules,
        history: &'a [Message],
        prompt: &'a str,
        options: SendOptions,
    ) -> ProviderFuture<'a, Result<GenerationResult, ProviderError>> {
        Box::pin(self.run(rules, history, prompt, options))
    }
}

/// Request log row for one send. Store failures never reach the caller.
struct AuditTrail<'a> {
    store: Option<&'a dyn RequestLogStore>,
    log_id: Option<String>,
}

impl<'a> AuditTrail<'a> {
    async fn open(
        store: Option<&'a dyn RequestLogStore>,
        session_id: SessionId,
        prompt: &str,
    ) -> Self {
        let log_id = match store {
            Some(store) => match store
                .add_request_log(NewRequestLog::new(session_id.clone(), prompt))
                .await
            {
                Ok(log) => Some(log.id),
                Err(error) => {
                    tracing::warn!(
                        phase = "provider",
                        event = "request_log_create_failed",
                        session_id = %session_id,
                        error = %error,
                        "request log could not be created; attempts will not be audited"
                    );
                    None
                }
            },
            None => None,
        };

        Self { store, log_id }
    }

    async fn record(&self, update: RequestLogUpdate) {
        let (Some(store), Some(log_id)) = (self.store, self.log_id.as_deref()) else {
            return;
        };

        if let Err(error) = store.update_request_log(log_id, update).await {
            tracing::warn!(
                phase = "provider",
                event = "request_log_update_failed",
                log_id,
                error = %error,
                "request log update failed"
            );
        }
    }
}
