use crate::{models::StreamOptions, sse_parser::SSEParser, *};
use async_trait::async_trait;
use reqwest::{header::HeaderValue, Client};
use std::time::Duration;

/// Configuration for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl OpenAiCompatibleConfig {
    pub fn new(base_url: String, api_key: Option<String>, timeout_seconds: Option<u64>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout_seconds: timeout_seconds.unwrap_or(30),
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

/// Streams chat completions from any server speaking the OpenAI wire format
/// (vLLM, OpenAI itself, most hosted gateways).
pub struct OpenAiCompatibleProvider {
    config: OpenAiCompatibleConfig,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatibleConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .read_timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CompletionError::Unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Build HTTP request headers
    fn build_headers(&self) -> Result<reqwest::header::HeaderMap, String> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));

        if let Some(ref api_key) = self.config.api_key {
            let auth_value = format!("Bearer {api_key}");
            let header_value = HeaderValue::from_str(&auth_value)
                .map_err(|e| format!("Invalid API key format: {e}"))?;
            headers.insert("Authorization", header_value);
        }

        Ok(headers)
    }
}

#[async_trait]
impl InferenceProvider for OpenAiCompatibleProvider {
    async fn chat_completion_stream(
        &self,
        params: ChatCompletionParams,
    ) -> Result<StreamingResult, CompletionError> {
        let url = self.config.chat_completions_url();

        let mut streaming_params = params;
        streaming_params.stream = Some(true);
        streaming_params.stream_options = Some(StreamOptions {
            include_usage: Some(true),
        });

        let headers = self
            .build_headers()
            .map_err(CompletionError::CompletionError)?;

        tracing::debug!(
            url = %url,
            model = %streaming_params.model,
            messages = streaming_params.messages.len(),
            "Sending streaming chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(&streaming_params)
            .send()
            .await
            .map_err(|e| CompletionError::CompletionError(e.to_string()))?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error response body: {e}"));
            return Err(CompletionError::HttpError {
                status_code,
                message: error_text,
            });
        }

        let sse_stream = SSEParser::new(response.bytes_stream());
        Ok(Box::pin(sse_stream))
    }
}
