pub mod ports;
pub mod serper;
pub mod web_search;

pub use ports::{WebSearchError, WebSearchProviderTrait, WebSearchResult};
pub use serper::SerperWebSearchProvider;
pub use web_search::{WebSearchArgs, WebSearchTool, DEFAULT_RESULT_COUNT, WEB_SEARCH_TOOL_NAME};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool call cancelled")]
    Cancelled,
}
