use inference_providers::CompletionError;

use crate::conversations::ConversationError;
use crate::tools::ToolError;

/// Errors returned before the event stream starts
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Conversation not found")]
    NotFoundOrForbidden,
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<ConversationError> for ChatError {
    fn from(error: ConversationError) -> Self {
        match error {
            ConversationError::NotFoundOrForbidden
            | ConversationError::NotFound
            | ConversationError::Forbidden => ChatError::NotFoundOrForbidden,
            ConversationError::InvalidParams(msg) => ChatError::InvalidParams(msg),
            ConversationError::InternalError(msg) => ChatError::InternalError(msg),
        }
    }
}

/// Why a running turn stopped early. Only logged; clients get a generic event.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Generation engine failed: {0}")]
    GenerationEngineFailed(#[from] CompletionError),
    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(ToolError),
    #[error("Storage failed: {0}")]
    StorageFailed(#[from] ConversationError),
    #[error("Turn exceeded its time limit")]
    Timeout,
    #[error("Turn cancelled")]
    Cancelled,
    #[error("Client stopped reading the stream")]
    ClientDisconnected,
}

impl TurnError {
    /// Aborted turns end silently; everything else gets an error event
    pub fn is_abort(&self) -> bool {
        matches!(self, TurnError::Cancelled | TurnError::ClientDisconnected)
    }
}

impl From<ToolError> for TurnError {
    fn from(error: ToolError) -> Self {
        match error {
            ToolError::Cancelled => TurnError::Cancelled,
            other => TurnError::ToolExecutionFailed(other),
        }
    }
}
