//! Gemini HTTP payload serde models and conversion helpers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProviderError;

use super::types::{GeminiRequest, GeminiResponse, GeminiUsage};

pub(crate) const JSON_MIME_TYPE: &str = "application/json";

pub(crate) fn build_api_request(request: GeminiRequest) -> GenerateContentRequest {
    let contents = request
        .contents
        .into_iter()
        .map(|content| ApiContent {
            role: content.role.as_str().to_string(),
            parts: vec![ApiPart { text: content.text }],
        })
        .collect();

    let system_instruction = request
        .system_instruction
        .filter(|text| !text.is_empty())
        .map(|text| ApiSystemInstruction {
            parts: vec![ApiPart { text }],
        });

    GenerateContentRequest {
        contents,
        generation_config: ApiGenerationConfig {
            response_mime_type: JSON_MIME_TYPE.to_string(),
            max_output_tokens: request.max_output_tokens,
            response_schema: request.response_schema,
        },
        system_instruction,
    }
}

pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ApiErrorEnvelope>(body).ok()?;
    Some(parsed.error.message)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub error: ApiError,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub contents: Vec<ApiContent>,
    pub generation_config: ApiGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<ApiSystemInstruction>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiContent {
    pub role: String,
    pub parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiSystemInstruction {
    pub parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiPart {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiGenerationConfig {
    pub response_mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<ApiCandidate>,
    #[serde(default)]
    pub usage_metadata: ApiUsageMetadata,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCandidate {
    #[serde(default)]
    pub content: ApiCandidateContent,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiCandidateContent {
    #[serde(default)]
    pub parts: Vec<ApiResponsePart>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponsePart {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ApiUsageMetadata {
    pub prompt_token_count: u32,
    pub candidates_token_count: u32,
    pub total_token_count: u32,
    pub thoughts_token_count: u32,
}

impl TryFrom<GenerateContentResponse> for GeminiResponse {
    type Error = ProviderError;

    fn try_from(value: GenerateContentResponse) -> Result<Self, Self::Error> {
        let candidate = value.candidates.into_iter().next().ok_or_else(|| {
            ProviderError::empty_response("Gemini response did not include candidates")
        })?;

        let part = candidate.content.parts.into_iter().next().ok_or_else(|| {
            ProviderError::empty_response("Gemini candidate did not include content parts")
        })?;

        let usage = value.usage_metadata;
        Ok(Self {
            text: part.text,
            usage: GeminiUsage {
                prompt_token_count: usage.prompt_token_count,
                candidates_token_count: usage.candidates_token_count,
                total_token_count: usage.total_token_count,
                thoughts_token_count: usage.thoughts_token_count,
            },
        })
    }
}
