//! Chat service orchestrating one validated generation per turn.

use std::sync::Arc;

use pcommon::SessionId;
use pmemory::{MemoryBackend, Session};
use pprovider::{GenerationProvider, Role, Rules, SendOptions};

use crate::{ChatError, ChatTurnResult};

#[derive(Clone)]
pub struct ChatService {
    provider: Arc<dyn GenerationProvider>,
    backend: Arc<dyn MemoryBackend>,
}

impl ChatService {
    pub fn new(provider: Arc<dyn GenerationProvider>, backend: Arc<dyn MemoryBackend>) -> Self {
        Self { provider, backend }
    }

    pub fn backend(&self) -> &Arc<dyn MemoryBackend> {
        &self.backend
    }

    pub async fn start_session(&self, rules: Rules) -> Result<Session, ChatError> {
        Ok(self.backend.create_session(rules).await?)
    }

    pub async fn run_turn(
        &self,
        session_id: &SessionId,
        prompt: &str,
    ) -> Result<ChatTurnResult, ChatError> {
        self.run_turn_with_options(session_id, prompt, SendOptions::new())
            .await
    }

    /// Runs one turn; the session hint in `options` is always replaced by `session_id`.
    ///
    /// Both messages are appended only after the provider succeeds.
    pub async fn run_turn_with_options(
        &self,
        session_id: &SessionId,
        prompt: &str,
        options: SendOptions,
    ) -> Result<ChatTurnResult, ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::invalid_request("prompt must not be empty"));
        }

        let session = self.backend.get_session(session_id).await?;
        let history = self.backend.list_messages(session_id).await?;
        let options = options.with_session_hint(session_id.clone());

        let generation = self
            .provider
            .send(&session.rules, &history, prompt, options)
            .await
            .inspect_err(|error| {
                tracing::debug!(
                    phase = "chat",
                    event = "turn_failed",
                    session_id = %session_id,
                    error = %error,
                );
            })?;

        let user_message = self
            .backend
            .add_message(session_id, Role::User, prompt, None)
            .await?;
        let assistant_message = self
            .backend
            .add_message(
                session_id,
                Role::Assistant,
                &generation.content,
                Some(generation.usage),
            )
            .await?;

        Ok(ChatTurnResult {
            session_id: session.id,
            user_message,
            assistant_message,
            usage: generation.usage,
        })
    }
}
