//! Conversation model, provider contract, and the validated Gemini provider.

mod credentials;
mod error;
mod hooks;
mod model;
mod provider;
mod request_log;
mod validation;

pub mod adapters;

pub mod prelude {
    pub use crate::{
        FailReason, GenerationProvider, GenerationResult, Message, NewRequestLog,
        NoopOperationHooks, ProviderError, ProviderErrorKind, ProviderOperationHooks, RequestLog,
        RequestLogStore, RequestLogUpdate, RequestStatus, Role, Rules, SendOptions, Usage,
        is_structurally_complete,
    };
    pub use pcommon::{BoxFuture, SessionId};

    #[cfg(feature = "provider-gemini")]
    pub use crate::adapters::gemini::{GeminiHttpTransport, GeminiProvider, GeminiTransport};
}

pub use credentials::SecretString;
pub use error::{ProviderError, ProviderErrorKind};
pub use hooks::{NoopOperationHooks, ProviderOperationHooks};
pub use model::{
    FailReason, GenerationResult, Message, NewRequestLog, RequestLog, RequestLogUpdate,
    RequestStatus, Role, Rules, Usage,
};
pub use provider::{GenerationProvider, ProviderFuture, SendOptions};
pub use request_log::RequestLogStore;
pub use validation::is_structurally_complete;
