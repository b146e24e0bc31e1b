//! Gemini transport trait and reqwest-based HTTP implementation.

use reqwest::{Client, Response};

use crate::{ProviderError, ProviderFuture};

use super::serde_api::{GenerateContentResponse, build_api_request, extract_error_message};
use super::types::{GeminiAuth, GeminiRequest, GeminiResponse};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub trait GeminiTransport: Send + Sync + std::fmt::Debug {
    fn generate<'a>(
        &'a self,
        request: GeminiRequest,
        auth: GeminiAuth,
    ) -> ProviderFuture<'a, Result<GeminiResponse, ProviderError>>;
}

#[derive(Debug, Clone)]
pub struct GeminiHttpTransport {
    client: Client,
    base_url: String,
}

impl GeminiHttpTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }

    async fn parse_error(response: Response) -> ProviderError {
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return map_reqwest_error(err),
        };
        let message = extract_error_message(&body).unwrap_or(body);

        ProviderError::http(status.as_u16(), message)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(err.to_string())
    } else if err.is_builder() {
        ProviderError::other(err.to_string())
    } else {
        ProviderError::network(err.to_string())
    }
}

impl GeminiTransport for GeminiHttpTransport {
    fn generate<'a>(
        &'a self,
        request: GeminiRequest,
        auth: GeminiAuth,
    ) -> ProviderFuture<'a, Result<GeminiResponse, ProviderError>> {
        Box::pin(async move {
            let url = self.endpoint(&request.model);
            let api_request = build_api_request(request);
            let response = self
                .client
                .post(url)
                .query(&[("key", auth.api_key.expose())])
                .json(&api_request)
                .send()
                .await
                .map_err(map_reqwest_error)?;

            if !response.status().is_success() {
                return Err(Self::parse_error(response).await);
            }

            let body = response.bytes().await.map_err(map_reqwest_error)?;
            let parsed: GenerateContentResponse = serde_json::from_slice(&body)
                .map_err(|err| ProviderError::decode(format!("invalid Gemini response: {err}")))?;

            GeminiResponse::try_from(parsed)
        })
    }
}
