//! Unified facade over the parley workspace crates.
//!
//! Re-exports the provider, memory, chat, and observability crates and wires them
//! together from environment configuration.

mod config;
mod error;
mod macros;
mod providers;

pub mod prelude;
pub mod runtime;

pub use pchat;
pub use pcommon;
pub use pmemory;
pub use pobserve;
pub use pprovider;

pub use config::{
    AppConfig, DATABASE_URL_VAR, DEFAULT_MAX_TOKENS, DEFAULT_REQUEST_TIMEOUT, GEMINI_API_VAR,
    MAX_TOKENS_VAR, MODEL_ID_VAR,
};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use pchat::{ChatError, ChatErrorKind, ChatService, ChatTurnResult};
pub use pcommon::{BoxFuture, SessionId};
pub use pmemory::{
    InMemoryMemoryBackend, MemoryBackend, MemoryBackendConfig, MemoryError, MemoryErrorKind,
    MemoryRequestLogStore, MigrationRecord, PostgresMemoryBackend, Session, SqliteMemoryBackend,
};
pub use pobserve::{
    FanoutProviderHooks, MetricsObservabilityHooks, SafeProviderHooks, TracingObservabilityHooks,
};
pub use pprovider::{
    FailReason, GenerationProvider, GenerationResult, Message, NewRequestLog,
    NoopOperationHooks, ProviderError, ProviderErrorKind, ProviderFuture, ProviderOperationHooks,
    RequestLog, RequestLogStore, RequestLogUpdate, RequestStatus, Role, Rules, SecretString,
    SendOptions, Usage, is_structurally_complete,
};
#[cfg(feature = "provider-gemini")]
pub use pprovider::adapters::gemini::{GeminiHttpTransport, GeminiProvider, GeminiTransport};

pub use providers::{build_gemini_provider, default_hooks};
pub use runtime::{
    RuntimeBundle, build_runtime, build_runtime_with, build_runtime_with_memory,
    in_memory_backend, request_log_store,
};
