use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use pcommon::SessionId;
use tokio_util::sync::CancellationToken;

use crate::{GenerationResult, Message, ProviderError, Rules};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Call-scoped inputs that are not part of the conversation itself.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Session used for audit rows when `history` is empty.
    pub session_hint: Option<SessionId>,
    pub deadline: Option<Instant>,
    pub cancellation: Option<CancellationToken>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_hint(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_hint = Some(session_id.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Produces the next assistant turn for a conversation.
///
/// Implementations keep no conversation state: everything arrives through `history`,
/// which never contains `prompt`.
pub trait GenerationProvider: Send + Sync {
    fn send<'a>(
        &'a self,
        rules: &'a Rules,
        history: &'a [Message],
        prompt: &'a str,
        options: SendOptions,
    ) -> ProviderFuture<'a, Result<GenerationResult, ProviderError>>;
}
