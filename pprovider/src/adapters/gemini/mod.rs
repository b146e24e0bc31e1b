mod provider;
mod serde_api;
mod transport;
mod types;

pub use provider::{GeminiProvider, MAX_ATTEMPTS};
pub use transport::{DEFAULT_GEMINI_BASE_URL, GeminiHttpTransport, GeminiTransport};
pub use types::{
    GeminiAuth, GeminiContent, GeminiRequest, GeminiResponse, GeminiRole, GeminiUsage,
};
