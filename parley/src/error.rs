use pchat::ChatError;
use pmemory::MemoryError;
use pprovider::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    Provider,
    Memory,
    Chat,
}

/// Failure while wiring or bootstrapping a [`RuntimeBundle`](crate::RuntimeBundle).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ProviderError> for RuntimeError {
    fn from(value: ProviderError) -> Self {
        Self::new(RuntimeErrorKind::Provider, value.to_string())
    }
}

impl From<MemoryError> for RuntimeError {
    fn from(value: MemoryError) -> Self {
        Self::new(RuntimeErrorKind::Memory, value.to_string())
    }
}

impl From<ChatError> for RuntimeError {
    fn from(value: ChatError) -> Self {
        Self::new(RuntimeErrorKind::Chat, value.to_string())
    }
}
