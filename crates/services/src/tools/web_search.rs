//! Web search tool
//!
//! Uniform invocation contract over the search provider: arguments in,
//! structured results out, abortable through a cancellation token.

use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::ports::{WebSearchProviderTrait, WebSearchResult};
use super::ToolError;
use inference_providers::{FunctionDefinition, ToolDefinition};

pub const WEB_SEARCH_TOOL_NAME: &str = "searchWeb";
pub const DEFAULT_RESULT_COUNT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchArgs {
    pub query: String,
}

impl WebSearchArgs {
    /// Parse the JSON argument string produced by the engine
    pub fn parse(arguments: &str) -> Result<Self, ToolError> {
        let args: WebSearchArgs = serde_json::from_str(arguments)
            .map_err(|e| ToolError::InvalidArguments(format!("{e}: {arguments}")))?;
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("query is empty".to_string()));
        }
        Ok(args)
    }
}

pub struct WebSearchTool {
    provider: Arc<dyn WebSearchProviderTrait>,
    result_count: usize,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn WebSearchProviderTrait>, result_count: usize) -> Self {
        Self {
            provider,
            result_count,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            type_: "function".to_string(),
            function: FunctionDefinition {
                name: WEB_SEARCH_TOOL_NAME.to_string(),
                description: Some("Search the web for up-to-date information".to_string()),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The query to search the web for"
                        }
                    },
                    "required": ["query"],
                    "additionalProperties": false
                }),
            },
        }
    }

    /// Run one search. Cancelling `cancel` drops the in-flight request and
    /// yields `ToolError::Cancelled`; no partial result is returned.
    pub async fn invoke(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<WebSearchResult>, ToolError> {
        let search = self.provider.search(query.to_string(), self.result_count);

        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(query = %query, "Web search cancelled");
                return Err(ToolError::Cancelled);
            }
            results = search => results.map_err(|e| ToolError::ExecutionFailed(e.to_string()))?,
        };

        // Providers may ignore the requested count
        Ok(results.into_iter().take(self.result_count).collect())
    }
}
