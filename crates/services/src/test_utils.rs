// In-memory fakes for the storage ports.
// Used by unit tests here and, through the `test-mocks` feature, by the api tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::{
    auth::{SessionRepository, User, UserId, UserRepository},
    common::RepositoryError,
    conversations::{
        Conversation, ConversationId, ConversationRepository, ConversationWithMessages, Message,
        ReplaceOutcome, StoredMessage,
    },
    quota::UsageRepository,
};

#[derive(Default)]
pub struct InMemoryUsageRepository {
    records: Mutex<Vec<(UserId, DateTime<Utc>)>>,
}

impl InMemoryUsageRepository {
    pub async fn total_records(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn records_for(&self, user_id: UserId) -> usize {
        self.records
            .lock()
            .await
            .iter()
            .filter(|(id, _)| *id == user_id)
            .count()
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn count_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|(id, at)| *id == user_id && *at >= start && *at < end)
            .count() as i64)
    }

    async fn record(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.records.lock().await.push((user_id, at));
        Ok(())
    }
}

struct StoredConversation {
    conversation: Conversation,
    messages: Vec<Message>,
    /// Tie-breaker for identical timestamps
    touched: u64,
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    state: Mutex<(HashMap<ConversationId, StoredConversation>, u64)>,
}

impl InMemoryConversationRepository {
    pub async fn conversation_count(&self) -> usize {
        self.state.lock().await.0.len()
    }

    /// Raw message list, bypassing ownership checks
    pub async fn messages_of(&self, id: ConversationId) -> Option<Vec<Message>> {
        self.state
            .lock()
            .await
            .0
            .get(&id)
            .map(|stored| stored.messages.clone())
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(
        &self,
        id: ConversationId,
        owner: UserId,
        title: String,
        messages: Vec<Message>,
    ) -> Result<Conversation, RepositoryError> {
        let mut guard = self.state.lock().await;
        let (conversations, clock) = &mut *guard;
        if conversations.contains_key(&id) {
            return Err(RepositoryError::AlreadyExists);
        }

        *clock += 1;
        let now = Utc::now();
        let conversation = Conversation {
            id,
            user_id: owner,
            title,
            created_at: now,
            updated_at: now,
        };
        conversations.insert(
            id,
            StoredConversation {
                conversation: conversation.clone(),
                messages,
                touched: *clock,
            },
        );
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self
            .state
            .lock()
            .await
            .0
            .get(&id)
            .map(|stored| stored.conversation.clone()))
    }

    async fn replace_all(
        &self,
        id: ConversationId,
        owner: UserId,
        title: String,
        messages: Vec<Message>,
    ) -> Result<ReplaceOutcome, RepositoryError> {
        let mut guard = self.state.lock().await;
        let (conversations, clock) = &mut *guard;
        let Some(stored) = conversations.get_mut(&id) else {
            return Ok(ReplaceOutcome::NotFound);
        };
        if stored.conversation.user_id != owner {
            return Ok(ReplaceOutcome::OwnerMismatch);
        }

        *clock += 1;
        stored.messages = messages;
        stored.conversation.title = title;
        stored.conversation.updated_at = Utc::now();
        stored.touched = *clock;
        Ok(ReplaceOutcome::Replaced)
    }

    async fn get_with_messages(
        &self,
        id: ConversationId,
        owner: UserId,
    ) -> Result<Option<ConversationWithMessages>, RepositoryError> {
        let guard = self.state.lock().await;
        Ok(guard
            .0
            .get(&id)
            .filter(|stored| stored.conversation.user_id == owner)
            .map(|stored| ConversationWithMessages {
                conversation: stored.conversation.clone(),
                messages: stored
                    .messages
                    .iter()
                    .enumerate()
                    .map(|(position, message)| StoredMessage {
                        position: position as i32,
                        message: message.clone(),
                    })
                    .collect(),
            }))
    }

    async fn list_by_user(&self, owner: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let guard = self.state.lock().await;
        let mut owned: Vec<&StoredConversation> = guard
            .0
            .values()
            .filter(|stored| stored.conversation.user_id == owner)
            .collect();
        owned.sort_by(|a, b| {
            b.conversation
                .updated_at
                .cmp(&a.conversation.updated_at)
                .then(b.touched.cmp(&a.touched))
        });
        Ok(owned
            .into_iter()
            .map(|stored| stored.conversation.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<UserId, User>>,
}

impl InMemoryUserRepository {
    pub async fn insert(&self, user: User) {
        self.users.lock().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.lock().await.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<String, (UserId, DateTime<Utc>)>>,
}

impl InMemorySessionRepository {
    pub async fn insert(&self, token_hash: String, user_id: UserId, expires_at: DateTime<Utc>) {
        self.sessions
            .lock()
            .await
            .insert(token_hash, (user_id, expires_at));
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_user_by_token_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, RepositoryError> {
        Ok(self
            .sessions
            .lock()
            .await
            .get(token_hash)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(user_id, _)| *user_id))
    }
}
