#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    /// Missing or owned by someone else; the two are deliberately indistinguishable
    #[error("Conversation not found")]
    NotFoundOrForbidden,
    /// Write attempted by a user who does not own the conversation
    #[error("You are not authorized to update this conversation")]
    Forbidden,
    #[error("Conversation not found")]
    NotFound,
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}
