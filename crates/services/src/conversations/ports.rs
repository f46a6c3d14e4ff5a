use async_trait::async_trait;

use super::errors::ConversationError;
use super::models::{Conversation, ConversationId, ConversationWithMessages, Message};
use crate::auth::UserId;
use crate::common::RepositoryError;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

/// Outcome of a whole-list replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced,
    NotFound,
    OwnerMismatch,
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Create a conversation and persist `messages` at positions 0..N-1, atomically.
    async fn create(
        &self,
        id: ConversationId,
        owner: UserId,
        title: String,
        messages: Vec<Message>,
    ) -> Result<Conversation, RepositoryError>;

    /// Metadata only, regardless of owner
    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// In one transaction: check the owner, delete every message, insert
    /// `messages` at positions 0..N-1, update title and `updated_at`.
    async fn replace_all(
        &self,
        id: ConversationId,
        owner: UserId,
        title: String,
        messages: Vec<Message>,
    ) -> Result<ReplaceOutcome, RepositoryError>;

    /// Conversation with messages if it exists and is owned by `owner`
    async fn get_with_messages(
        &self,
        id: ConversationId,
        owner: UserId,
    ) -> Result<Option<ConversationWithMessages>, RepositoryError>;

    /// Most recently updated first
    async fn list_by_user(&self, owner: UserId) -> Result<Vec<Conversation>, RepositoryError>;
}

/// Result of `resolve_or_create`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedConversation {
    pub id: ConversationId,
    pub created: bool,
}

/// Transcript persistence protocol
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait ConversationServiceTrait: Send + Sync {
    /// Without an id, create a conversation seeded with `seed_messages`.
    /// With an id, verify it exists and is owned by `owner`.
    async fn resolve_or_create(
        &self,
        id: Option<ConversationId>,
        owner: UserId,
        seed_title: String,
        seed_messages: Vec<Message>,
    ) -> Result<ResolvedConversation, ConversationError>;

    async fn replace_all(
        &self,
        id: ConversationId,
        owner: UserId,
        title: String,
        messages: Vec<Message>,
    ) -> Result<(), ConversationError>;

    async fn fetch_one(
        &self,
        id: ConversationId,
        owner: UserId,
    ) -> Result<ConversationWithMessages, ConversationError>;

    async fn fetch_all_for_user(&self, owner: UserId)
        -> Result<Vec<Conversation>, ConversationError>;
}
