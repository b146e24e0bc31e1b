#![cfg(feature = "provider-gemini")]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use pcommon::SessionId;
use pprovider::adapters::gemini::{
    GeminiAuth, GeminiProvider, GeminiRequest, GeminiResponse, GeminiRole, GeminiTransport,
    GeminiUsage,
};
use pprovider::{
    FailReason, GenerationProvider, Message, NewRequestLog, ProviderError, ProviderErrorKind,
    ProviderFuture, ProviderOperationHooks, RequestLog, RequestLogStore, RequestLogUpdate,
    RequestStatus, Role, Rules, SendOptions, Usage,
};
use tokio_util::sync::CancellationToken;

const REGENERATE: &str = "Your previous response had incomplete JSON (mismatched brackets). Please regenerate the complete, valid JSON response.";

#[derive(Debug, Default)]
struct FakeTransport {
    responses: Mutex<VecDeque<Result<GeminiResponse, ProviderError>>>,
    captured_requests: Mutex<Vec<GeminiRequest>>,
    captured_keys: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl FakeTransport {
    fn scripted(responses: Vec<Result<GeminiResponse, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn requests(&self) -> Vec<GeminiRequest> {
        self.captured_requests.lock().expect("requests lock").clone()
    }
}

impl GeminiTransport for FakeTransport {
    fn generate<'a>(
        &'a self,
        request: GeminiRequest,
        auth: GeminiAuth,
    ) -> ProviderFuture<'a, Result<GeminiResponse, ProviderError>> {
        Box::pin(async move {
            self.captured_requests
                .lock()
                .expect("requests lock")
                .push(request);
            self.captured_keys
                .lock()
                .expect("keys lock")
                .push(auth.api_key.expose().to_string());

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .unwrap_or_else(|| Ok(reply(r#"{"default":true}"#)))
        })
    }
}

fn reply(text: &str) -> GeminiResponse {
    GeminiResponse {
        text: text.to_string(),
        usage: GeminiUsage {
            prompt_token_count: 10,
            candidates_token_count: 5,
            total_token_count: 15,
            thoughts_token_count: 0,
        },
    }
}

fn expected_usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        response_tokens: 5,
        total_tokens: 15,
        thought_tokens: 0,
    }
}

#[derive(Default)]
struct RecordingLogStore {
    created: Mutex<Vec<NewRequestLog>>,
    updates: Mutex<Vec<(String, RequestLogUpdate)>>,
    fail_create: bool,
    fail_update: bool,
}

impl RecordingLogStore {
    fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    fn failing_update() -> Self {
        Self {
            fail_update: true,
            ..Self::default()
        }
    }

    fn created(&self) -> Vec<NewRequestLog> {
        self.created.lock().expect("created lock").clone()
    }

    fn updates(&self) -> Vec<RequestLogUpdate> {
        self.updates
            .lock()
            .expect("updates lock")
            .iter()
            .map(|(_, update)| update.clone())
            .collect()
    }
}

impl RequestLogStore for RecordingLogStore {
    fn add_request_log<'a>(
        &'a self,
        log: NewRequestLog,
    ) -> ProviderFuture<'a, Result<RequestLog, ProviderError>> {
        Box::pin(async move {
            if self.fail_create {
                return Err(ProviderError::other("database unavailable"));
            }

            let mut created = self.created.lock().expect("created lock");
            let now = SystemTime::now();
            let row = RequestLog {
                id: format!("log-{}", created.len() + 1),
                session_id: log.session_id.clone(),
                prompt: log.prompt.clone(),
                response: log.response.clone(),
                attempt_number: log.attempt_number,
                retry_count: log.retry_count,
                final_status: RequestStatus::Pending,
                fail_reason: None,
                error_message: String::new(),
                usage: Usage::default(),
                created_at: now,
                updated_at: now,
            };
            created.push(log);
            Ok(row)
        })
    }

    fn update_request_log<'a>(
        &'a self,
        id: &'a str,
        update: RequestLogUpdate,
    ) -> ProviderFuture<'a, Result<(), ProviderError>> {
        Box::pin(async move {
            self.updates
                .lock()
                .expect("updates lock")
                .push((id.to_string(), update));
            if self.fail_update {
                return Err(ProviderError::other("write failed"));
            }
            Ok(())
        })
    }
}

fn provider(transport: Arc<FakeTransport>, store: Arc<RecordingLogStore>) -> GeminiProvider {
    GeminiProvider::new("test-key", "gemini-2.5-flash", transport).with_request_log_store(store)
}

fn rules() -> Rules {
    Rules::new("Reply with JSON.").with_max_tokens(1024)
}

#[tokio::test]
async fn balanced_first_response_succeeds_in_one_attempt() {
    let transport = Arc::new(FakeTransport::scripted(vec![Ok(reply(r#"{"a":1}"#))]));
    let store = Arc::new(RecordingLogStore::default());

    let result = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(&rules(), &[], "make a thing", SendOptions::new())
        .await
        .expect("send should succeed");

    assert_eq!(result.content, r#"{"a":1}"#);
    assert_eq!(result.usage, expected_usage());
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(
        *transport.captured_keys.lock().expect("keys lock"),
        vec!["test-key".to_string()]
    );

    let created = store.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].prompt, "make a thing");
    assert_eq!(created[0].attempt_number, 1);
    assert_eq!(created[0].retry_count, 0);

    assert_eq!(
        store.updates(),
        vec![RequestLogUpdate::success(r#"{"a":1}"#, 0, expected_usage())]
    );
}

#[tokio::test]
async fn truncated_then_balanced_response_retries_with_corrective_turns() {
    let transport = Arc::new(FakeTransport::scripted(vec![
        Ok(reply(r#"{"a":[1,2"#)),
        Ok(reply(r#"{"a":[1,2]}"#)),
    ]));
    let store = Arc::new(RecordingLogStore::default());
    let history = vec![
        Message::new(Role::User, "earlier").with_session_id("session-9"),
        Message::new(Role::Assistant, "{}").with_session_id("session-9"),
    ];

    let result = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(&rules(), &history, "now this", SendOptions::new())
        .await
        .expect("second attempt should succeed");

    assert_eq!(result.content, r#"{"a":[1,2]}"#);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].contents.len(), 3);

    let retry_contents = &requests[1].contents;
    assert_eq!(retry_contents.len(), 5);
    assert_eq!(retry_contents[2].role, GeminiRole::Model);
    assert_eq!(retry_contents[2].text, r#"{"a":[1,2"#);
    assert_eq!(retry_contents[3].role, GeminiRole::User);
    assert_eq!(retry_contents[3].text, REGENERATE);
    assert_eq!(retry_contents[4].role, GeminiRole::User);
    assert_eq!(retry_contents[4].text, "now this");

    assert_eq!(history.len(), 2, "caller history must not change");

    let updates = store.updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].status, RequestStatus::Pending);
    assert_eq!(updates[0].fail_reason, Some(FailReason::IncompleteJson));
    assert_eq!(updates[0].error_message, "JSON validation failed");
    assert_eq!(updates[0].response, r#"{"a":[1,2"#);
    assert_eq!(updates[0].retry_count, 0);
    assert_eq!(updates[0].usage, Some(expected_usage()));
    assert_eq!(
        updates[1],
        RequestLogUpdate::success(r#"{"a":[1,2]}"#, 1, expected_usage())
    );
}

#[tokio::test]
async fn two_truncated_responses_fail_with_max_retries_exceeded() {
    let transport = Arc::new(FakeTransport::scripted(vec![
        Ok(reply(r#"{"a":"#)),
        Ok(reply(r#"{"a":["#)),
    ]));
    let store = Arc::new(RecordingLogStore::default());

    let error = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(&rules(), &[], "go", SendOptions::new())
        .await
        .expect_err("send should fail");

    assert_eq!(error.kind, ProviderErrorKind::MaxRetriesExceeded);
    assert!(error.is_provider_failed());
    assert_eq!(error.fail_reason(), FailReason::MaxRetriesExceeded);
    assert_eq!(transport.requests().len(), 2);

    let updates = store.updates();
    assert_eq!(updates.len(), 2);
    let last = &updates[1];
    assert_eq!(last.status, RequestStatus::Failed);
    assert_eq!(last.fail_reason, Some(FailReason::MaxRetriesExceeded));
    assert_eq!(last.error_message, "JSON validation failed after max retries");
    assert_eq!(last.response, r#"{"a":["#);
    assert_eq!(last.retry_count, 1);
}

#[tokio::test]
async fn transport_failure_is_retried_without_corrective_turns() {
    let transport = Arc::new(FakeTransport::scripted(vec![
        Err(ProviderError::timeout("request timed out")),
        Ok(reply(r#"{"ok":true}"#)),
    ]));
    let store = Arc::new(RecordingLogStore::default());

    let result = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(&rules(), &[], "go", SendOptions::new())
        .await
        .expect("retry should succeed");

    assert_eq!(result.content, r#"{"ok":true}"#);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].contents, requests[1].contents);

    let updates = store.updates();
    assert_eq!(
        updates[0],
        RequestLogUpdate::failed(FailReason::Timeout, "request timed out", 0)
    );
    assert_eq!(updates[0].response, "");
    assert_eq!(updates[0].usage, None);
    assert_eq!(updates[1].status, RequestStatus::Success);
    assert_eq!(updates[1].retry_count, 1);
}

#[tokio::test]
async fn repeated_transport_failures_return_last_error_and_classify_each() {
    let transport = Arc::new(FakeTransport::scripted(vec![
        Err(ProviderError::network("connection refused")),
        Err(ProviderError::http(500, "backend error")),
    ]));
    let store = Arc::new(RecordingLogStore::default());

    let error = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(&rules(), &[], "go", SendOptions::new())
        .await
        .expect_err("send should fail");

    assert_eq!(error.kind, ProviderErrorKind::Http);
    assert!(error.is_provider_failed());

    let reasons = store
        .updates()
        .into_iter()
        .map(|update| (update.fail_reason, update.retry_count))
        .collect::<Vec<_>>();
    assert_eq!(
        reasons,
        vec![
            (Some(FailReason::NetworkError), 0),
            (Some(FailReason::UnknownError), 1)
        ]
    );
}

#[tokio::test]
async fn empty_prompt_is_rejected_before_any_side_effect() {
    let transport = Arc::new(FakeTransport::default());
    let store = Arc::new(RecordingLogStore::default());

    let error = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(&rules(), &[], "", SendOptions::new())
        .await
        .expect_err("empty prompt should fail");

    assert_eq!(error.kind, ProviderErrorKind::EmptyPrompt);
    assert!(!error.is_provider_failed());
    assert!(transport.requests().is_empty());
    assert!(store.created().is_empty());
}

#[tokio::test]
async fn audit_session_comes_from_history_then_hint() {
    let transport = Arc::new(FakeTransport::default());
    let store = Arc::new(RecordingLogStore::default());
    let provider = provider(Arc::clone(&transport), Arc::clone(&store));
    let history = vec![Message::new(Role::User, "hi").with_session_id("from-history")];

    provider
        .send(
            &rules(),
            &history,
            "one",
            SendOptions::new().with_session_hint("from-hint"),
        )
        .await
        .expect("send should succeed");
    provider
        .send(
            &rules(),
            &[],
            "two",
            SendOptions::new().with_session_hint("from-hint"),
        )
        .await
        .expect("send should succeed");
    provider
        .send(&rules(), &[], "three", SendOptions::new())
        .await
        .expect("send should succeed");

    let sessions = store
        .created()
        .into_iter()
        .map(|log| log.session_id)
        .collect::<Vec<_>>();
    assert_eq!(
        sessions,
        vec![
            SessionId::from("from-history"),
            SessionId::from("from-hint"),
            SessionId::default()
        ]
    );
}

#[tokio::test]
async fn request_log_creation_failure_does_not_affect_the_result() {
    let transport = Arc::new(FakeTransport::scripted(vec![Ok(reply("[1]"))]));
    let store = Arc::new(RecordingLogStore::failing_create());

    let result = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(&rules(), &[], "go", SendOptions::new())
        .await
        .expect("send should succeed without audit");

    assert_eq!(result.content, "[1]");
    assert!(store.updates().is_empty());
}

#[tokio::test]
async fn request_log_update_failure_does_not_affect_the_result() {
    let transport = Arc::new(FakeTransport::scripted(vec![
        Ok(reply("{")),
        Ok(reply("{}")),
    ]));
    let store = Arc::new(RecordingLogStore::failing_update());

    let result = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(&rules(), &[], "go", SendOptions::new())
        .await
        .expect("send should succeed despite audit errors");

    assert_eq!(result.content, "{}");
    assert_eq!(store.updates().len(), 2);
}

#[tokio::test]
async fn provider_without_store_still_validates_and_retries() {
    let transport = Arc::new(FakeTransport::scripted(vec![
        Ok(reply("[")),
        Ok(reply("[]")),
    ]));
    let provider = GeminiProvider::new("k", "gemini-2.5-flash", transport.clone());

    let result = provider
        .send(&Rules::default(), &[], "go", SendOptions::new())
        .await
        .expect("send should succeed");

    assert_eq!(result.content, "[]");
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn cancelled_token_fails_without_calling_transport() {
    let transport = Arc::new(FakeTransport::default());
    let store = Arc::new(RecordingLogStore::default());
    let token = CancellationToken::new();
    token.cancel();

    let error = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(
            &rules(),
            &[],
            "go",
            SendOptions::new().with_cancellation(token),
        )
        .await
        .expect_err("cancelled send should fail");

    assert_eq!(error.kind, ProviderErrorKind::Cancelled);
    assert_eq!(error.fail_reason(), FailReason::NetworkError);
    assert!(transport.requests().is_empty());
    assert!(
        store
            .updates()
            .iter()
            .all(|update| update.fail_reason == Some(FailReason::NetworkError))
    );
}

#[tokio::test]
async fn expired_deadline_fails_as_timeout() {
    let transport = Arc::new(FakeTransport::default());
    let store = Arc::new(RecordingLogStore::default());

    let error = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(
            &rules(),
            &[],
            "go",
            SendOptions::new().with_deadline(Instant::now()),
        )
        .await
        .expect_err("expired deadline should fail");

    assert_eq!(error.kind, ProviderErrorKind::Timeout);
    assert!(transport.requests().is_empty());
    assert_eq!(store.updates().len(), 2);
    assert_eq!(store.updates()[1].fail_reason, Some(FailReason::Timeout));
}

#[tokio::test]
async fn deadline_interrupts_a_slow_request() {
    let transport = Arc::new(FakeTransport::slow(Duration::from_secs(30)));
    let store = Arc::new(RecordingLogStore::default());
    let started = Instant::now();

    let error = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(
            &rules(),
            &[],
            "go",
            SendOptions::new().with_deadline(Instant::now() + Duration::from_millis(50)),
        )
        .await
        .expect_err("slow request should time out");

    assert_eq!(error.kind, ProviderErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn cancellation_interrupts_an_in_flight_request() {
    let transport = Arc::new(FakeTransport::slow(Duration::from_secs(30)));
    let store = Arc::new(RecordingLogStore::default());
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let error = provider(Arc::clone(&transport), Arc::clone(&store))
        .send(
            &rules(),
            &[],
            "go",
            SendOptions::new().with_cancellation(token),
        )
        .await
        .expect_err("cancelled request should fail");

    assert_eq!(error.kind, ProviderErrorKind::Cancelled);
}

#[derive(Default)]
struct CountingHooks {
    starts: AtomicU32,
    retries: AtomicU32,
    successes: AtomicU32,
    failures: AtomicU32,
    last_attempts: AtomicU32,
}

impl ProviderOperationHooks for CountingHooks {
    fn on_attempt_start(&self, _model: &str, _attempt: u32) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_retry_scheduled(&self, _model: &str, _attempt: u32, _reason: FailReason) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    fn on_success(&self, _model: &str, attempts: u32, _usage: &Usage) {
        self.successes.fetch_add(1, Ordering::SeqCst);
        self.last_attempts.store(attempts, Ordering::SeqCst);
    }

    fn on_failure(&self, _model: &str, attempts: u32, _error: &ProviderError) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        self.last_attempts.store(attempts, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn hooks_observe_each_attempt() {
    let transport = Arc::new(FakeTransport::scripted(vec![
        Ok(reply("{")),
        Ok(reply("{}")),
    ]));
    let hooks = Arc::new(CountingHooks::default());
    let provider =
        GeminiProvider::new("k", "gemini-2.5-flash", transport).with_hooks(hooks.clone());

    provider
        .send(&rules(), &[], "go", SendOptions::new())
        .await
        .expect("send should succeed");

    assert_eq!(hooks.starts.load(Ordering::SeqCst), 2);
    assert_eq!(hooks.retries.load(Ordering::SeqCst), 1);
    assert_eq!(hooks.successes.load(Ordering::SeqCst), 1);
    assert_eq!(hooks.failures.load(Ordering::SeqCst), 0);
    assert_eq!(hooks.last_attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn shared_provider_serves_concurrent_sends() {
    let transport = Arc::new(FakeTransport::default());
    let store = Arc::new(RecordingLogStore::default());
    let provider = Arc::new(provider(Arc::clone(&transport), Arc::clone(&store)));

    let mut handles = Vec::new();
    for index in 0..8 {
        let provider = Arc::clone(&provider);
        handles.push(tokio::spawn(async move {
            let rules = rules();
            let prompt = format!("prompt-{index}");
            provider
                .send(&rules, &[], &prompt, SendOptions::new())
                .await
        }));
    }

    for handle in handles {
        handle
            .await
            .expect("task should join")
            .expect("send should succeed");
    }

    assert_eq!(store.created().len(), 8);
    assert_eq!(store.updates().len(), 8);
    assert_eq!(transport.requests().len(), 8);
}
