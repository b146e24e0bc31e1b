//! Environment-driven application configuration.

use std::time::Duration;

use pmemory::MemoryBackendConfig;
use pprovider::{Rules, SecretString};

pub const DEFAULT_MAX_TOKENS: u32 = 16_384;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const GEMINI_API_VAR: &str = "GEMINI_API";
pub const MODEL_ID_VAR: &str = "MODEL_ID";
pub const MAX_TOKENS_VAR: &str = "MAX_TOKENS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub gemini_api: SecretString,
    pub model_id: String,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    /// Overrides the public Gemini endpoint, e.g. for a proxy or a local stub.
    pub gemini_base_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            gemini_api: SecretString::default(),
            model_id: String::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            gemini_base_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source. Missing variables read as empty.
    ///
    /// ```rust
    /// use parley::{AppConfig, DEFAULT_MAX_TOKENS};
    ///
    /// let config = AppConfig::from_lookup(|key| match key {
    ///     "MODEL_ID" => Some("gemini-2.5-flash".to_string()),
    ///     "MAX_TOKENS" => Some("-5".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.model_id, "gemini-2.5-flash");
    /// assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).unwrap_or_default();

        Self {
            database_url: read(DATABASE_URL_VAR),
            gemini_api: SecretString::new(read(GEMINI_API_VAR)),
            model_id: read(MODEL_ID_VAR),
            max_tokens: parse_max_tokens(lookup(MAX_TOKENS_VAR).as_deref()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            gemini_base_url: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_gemini_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.gemini_base_url = Some(base_url.into());
        self
    }

    pub fn memory_config(&self) -> MemoryBackendConfig {
        MemoryBackendConfig::from_database_url(&self.database_url)
    }

    /// Session rules carrying this config's token budget.
    pub fn rules(&self, system_prompt: impl Into<String>) -> Rules {
        Rules::new(system_prompt).with_max_tokens(self.max_tokens)
    }
}

fn parse_max_tokens(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_MAX_TOKENS)
}
