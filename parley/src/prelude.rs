//! Common imports for most parley applications.

pub use crate::{
    AppConfig, ChatError, ChatErrorKind, ChatService, ChatTurnResult, GenerationProvider,
    GenerationResult, InMemoryMemoryBackend, MemoryBackend, MemoryBackendConfig, MemoryError,
    Message, ProviderError, ProviderErrorKind, Role, Rules, RuntimeBundle, RuntimeError,
    SendOptions, Session, SessionId, Usage, build_gemini_provider, build_runtime,
    build_runtime_with, build_runtime_with_memory, in_memory_backend,
};
pub use crate::{parley_messages, parley_msg, parley_rules};

#[cfg(feature = "provider-gemini")]
pub use crate::GeminiProvider;
