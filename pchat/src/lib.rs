//! Conversational turns over a validated generation provider.
//!
//! ```rust
//! use pchat::prelude::*;
//!
//! let error = ChatError::invalid_request("prompt must not be empty");
//! assert_eq!(error.kind, ChatErrorKind::InvalidRequest);
//! ```

mod error;
mod service;
mod types;

pub mod prelude {
    pub use crate::{ChatError, ChatErrorKind, ChatService, ChatTurnResult};
    pub use pcommon::SessionId;
}

pub use error::{ChatError, ChatErrorKind};
pub use pcommon::SessionId;
pub use service::ChatService;
pub use types::ChatTurnResult;
