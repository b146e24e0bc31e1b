//! Chat turn result types.

use pcommon::SessionId;
use pprovider::{Message, Usage};

/// Both persisted messages of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurnResult {
    pub session_id: SessionId,
    pub user_message: Message,
    pub assistant_message: Message,
    pub usage: Usage,
}
