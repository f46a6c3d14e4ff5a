use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::UserId;
use crate::conversations::{errors::ConversationError, models, ports};

/// Conversation service for managing chat transcripts
pub struct ConversationServiceImpl {
    pub conv_repo: Arc<dyn ports::ConversationRepository>,
}

impl ConversationServiceImpl {
    pub fn new(conv_repo: Arc<dyn ports::ConversationRepository>) -> Self {
        Self { conv_repo }
    }
}

#[async_trait]
impl ports::ConversationServiceTrait for ConversationServiceImpl {
    async fn resolve_or_create(
        &self,
        id: Option<models::ConversationId>,
        owner: UserId,
        seed_title: String,
        seed_messages: Vec<models::Message>,
    ) -> Result<ports::ResolvedConversation, ConversationError> {
        if let Some(id) = id {
            let existing = self.conv_repo.get_conversation(id).await.map_err(|e| {
                ConversationError::InternalError(format!("Failed to get conversation: {e}"))
            })?;

            return match existing {
                Some(conversation) if conversation.user_id == owner => {
                    Ok(ports::ResolvedConversation { id, created: false })
                }
                Some(_) => {
                    tracing::warn!(
                        conversation_id = %id,
                        user_id = %owner,
                        "Conversation access denied: not the owner"
                    );
                    Err(ConversationError::NotFoundOrForbidden)
                }
                None => Err(ConversationError::NotFoundOrForbidden),
            };
        }

        let id = models::ConversationId::new();
        tracing::info!(
            conversation_id = %id,
            user_id = %owner,
            messages = seed_messages.len(),
            "Creating conversation"
        );

        let conversation = self
            .conv_repo
            .create(id, owner, seed_title, seed_messages)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to create conversation: {e}"))
            })?;

        Ok(ports::ResolvedConversation {
            id: conversation.id,
            created: true,
        })
    }

    async fn replace_all(
        &self,
        id: models::ConversationId,
        owner: UserId,
        title: String,
        messages: Vec<models::Message>,
    ) -> Result<(), ConversationError> {
        let count = messages.len();
        let outcome = self
            .conv_repo
            .replace_all(id, owner, title, messages)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to replace messages: {e}"))
            })?;

        match outcome {
            ports::ReplaceOutcome::Replaced => {
                tracing::info!(conversation_id = %id, messages = count, "Replaced transcript");
                Ok(())
            }
            ports::ReplaceOutcome::OwnerMismatch => {
                tracing::warn!(
                    conversation_id = %id,
                    user_id = %owner,
                    "Rejected transcript write from non-owner"
                );
                Err(ConversationError::Forbidden)
            }
            ports::ReplaceOutcome::NotFound => Err(ConversationError::NotFound),
        }
    }

    async fn fetch_one(
        &self,
        id: models::ConversationId,
        owner: UserId,
    ) -> Result<models::ConversationWithMessages, ConversationError> {
        self.conv_repo
            .get_with_messages(id, owner)
            .await
            .map_err(|e| {
                ConversationError::InternalError(format!("Failed to get conversation: {e}"))
            })?
            .ok_or(ConversationError::NotFoundOrForbidden)
    }

    async fn fetch_all_for_user(
        &self,
        owner: UserId,
    ) -> Result<Vec<models::Conversation>, ConversationError> {
        let conversations = self.conv_repo.list_by_user(owner).await.map_err(|e| {
            ConversationError::InternalError(format!("Failed to list conversations: {e}"))
        })?;

        tracing::debug!(user_id = %owner, count = conversations.len(), "Listed conversations");
        Ok(conversations)
    }
}
