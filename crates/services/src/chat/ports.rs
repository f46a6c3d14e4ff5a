use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::errors::ChatError;
use super::models::{ChatTurn, ChatTurnRequest};

#[async_trait]
pub trait ChatServiceTrait: Send + Sync {
    /// Validate the request and resolve the conversation, then start
    /// generating in the background. Errors here happen before any event.
    ///
    /// Cancelling `cancel` aborts the turn: nothing further is emitted and
    /// nothing from the turn is persisted.
    async fn start_turn(
        &self,
        request: ChatTurnRequest,
        cancel: CancellationToken,
    ) -> Result<ChatTurn, ChatError>;
}
