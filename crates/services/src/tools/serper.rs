use super::ports::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct SerperWebSearchProvider {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl SerperWebSearchProvider {
    pub fn new(config: &config::SearchConfig) -> Result<Self, WebSearchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| WebSearchError::WebSearchRequestFailed(e.to_string()))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct SerperSearchRequest<'a> {
    q: &'a str,
    num: usize,
}

/// Root response from the Serper search API
#[derive(Debug, Clone, Deserialize)]
pub struct SerperSearchResponse {
    #[serde(default)]
    pub organic: Vec<SerperOrganicResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SerperOrganicResult {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl SerperSearchResponse {
    pub fn into_results(self, count: usize) -> Vec<WebSearchResult> {
        self.organic
            .into_iter()
            .take(count)
            .map(|result| WebSearchResult {
                title: result.title,
                link: result.link,
                snippet: result.snippet.unwrap_or_default(),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl WebSearchProviderTrait for SerperWebSearchProvider {
    async fn search(
        &self,
        query: String,
        count: usize,
    ) -> Result<Vec<WebSearchResult>, WebSearchError> {
        tracing::debug!(query = %query, count, "Searching the web");
        let response = self
            .client
            .post(&self.base_url)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperSearchRequest {
                q: &query,
                num: count,
            })
            .send()
            .await
            .map_err(|e| WebSearchError::WebSearchRequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            tracing::error!("Serper API error (status {}): {}", status, error_body);
            return Err(WebSearchError::WebSearchRequestFailed(format!(
                "HTTP {status}: {error_body}"
            )));
        }

        let serper_response: SerperSearchResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse Serper response: {}", e);
            WebSearchError::WebSearchResponseParsingFailed(format!("JSON parsing error: {e}"))
        })?;

        let results = serper_response.into_results(count);
        tracing::debug!("Found {} results", results.len());
        Ok(results)
    }
}
