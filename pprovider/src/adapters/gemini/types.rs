//! Gemini adapter types and provider-agnostic conversion logic.

use serde_json::Value;

use crate::{Message, Role, SecretString, Usage};

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiRequest {
    pub model: String,
    pub contents: Vec<GeminiContent>,
    pub system_instruction: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub response_schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiContent {
    pub role: GeminiRole,
    pub text: String,
}

impl GeminiContent {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: GeminiRole::User,
            text: text.into(),
        }
    }
}

impl From<&Message> for GeminiContent {
    fn from(value: &Message) -> Self {
        Self {
            role: value.role.into(),
            text: value.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeminiRole {
    User,
    Model,
}

impl GeminiRole {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl From<Role> for GeminiRole {
    fn from(value: Role) -> Self {
        match value {
            Role::User => Self::User,
            Role::Assistant => Self::Model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiResponse {
    pub text: String,
    pub usage: GeminiUsage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeminiUsage {
    pub prompt_token_count: u32,
    pub candidates_token_count: u32,
    pub total_token_count: u32,
    pub thoughts_token_count: u32,
}

impl From<GeminiUsage> for Usage {
    fn from(value: GeminiUsage) -> Self {
        Self {
            prompt_tokens: value.prompt_token_count,
            response_tokens: value.candidates_token_count,
            total_tokens: value.total_token_count,
            thought_tokens: value.thoughts_token_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiAuth {
    pub api_key: SecretString,
}

impl GeminiAuth {
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}
