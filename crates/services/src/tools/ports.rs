use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

/// Result from a web search
///
/// Kept structured; turning it into markdown is a rendering concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WebSearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum WebSearchError {
    #[error("Web search request failed: {0}")]
    WebSearchRequestFailed(String),
    #[error("Web search response parsing failed: {0}")]
    WebSearchResponseParsingFailed(String),
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait WebSearchProviderTrait: Send + Sync {
    /// Ordered results, best first, at most `count` of them
    async fn search(
        &self,
        query: String,
        count: usize,
    ) -> Result<Vec<WebSearchResult>, WebSearchError>;
}
