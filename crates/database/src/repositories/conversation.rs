use crate::retry_db;
use crate::{
    pool::DbPool,
    repositories::utils::{get_client, map_db_error},
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use services::auth::UserId;
use services::common::RepositoryError;
use services::conversations::{
    Conversation, ConversationId, ConversationRepository, ConversationWithMessages, Message, Part,
    ReplaceOutcome, Role, StoredMessage,
};
use tokio_postgres::{Row, Transaction};
use tracing::debug;
use uuid::Uuid;

const INSERT_MESSAGE: &str = r#"
    INSERT INTO messages (conversation_id, position, role, parts, created_at)
    VALUES ($1, $2, $3, $4, $5)
"#;

pub struct PgConversationRepository {
    pool: DbPool,
}

impl PgConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn row_to_conversation(row: &Row) -> Result<Conversation, RepositoryError> {
        let id: Uuid = row
            .try_get("id")
            .map_err(|e| RepositoryError::DataConversionError(e.into()))?;
        let user_id: Uuid = row
            .try_get("user_id")
            .map_err(|e| RepositoryError::DataConversionError(e.into()))?;

        Ok(Conversation {
            id: id.into(),
            user_id: user_id.into(),
            title: row
                .try_get("title")
                .map_err(|e| RepositoryError::DataConversionError(e.into()))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| RepositoryError::DataConversionError(e.into()))?,
            updated_at: row
                .try_get("updated_at")
                .map_err(|e| RepositoryError::DataConversionError(e.into()))?,
        })
    }

    fn row_to_stored_message(row: &Row) -> Result<StoredMessage, RepositoryError> {
        let position: i32 = row
            .try_get("position")
            .map_err(|e| RepositoryError::DataConversionError(e.into()))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| RepositoryError::DataConversionError(e.into()))?;
        let parts: serde_json::Value = row
            .try_get("parts")
            .map_err(|e| RepositoryError::DataConversionError(e.into()))?;

        let role: Role = role
            .parse()
            .map_err(|e| RepositoryError::DataConversionError(anyhow!("{e}")))?;
        let parts: Vec<Part> = serde_json::from_value(parts).map_err(|e| {
            RepositoryError::DataConversionError(anyhow!(
                "Invalid parts at position {position}: {e}"
            ))
        })?;

        Ok(StoredMessage {
            position,
            message: Message::new(role, parts),
        })
    }

    /// Write `messages` at positions 0..N-1
    async fn insert_messages(
        transaction: &Transaction<'_>,
        id: Uuid,
        messages: &[Message],
    ) -> Result<(), RepositoryError> {
        if messages.is_empty() {
            return Ok(());
        }

        let statement = transaction
            .prepare(INSERT_MESSAGE)
            .await
            .map_err(map_db_error)?;
        let now = Utc::now();

        for (position, message) in messages.iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| {
                RepositoryError::ValidationFailed("Too many messages in conversation".to_string())
            })?;
            let parts = serde_json::to_value(&message.parts)
                .map_err(|e| RepositoryError::DataConversionError(e.into()))?;

            transaction
                .execute(
                    &statement,
                    &[&id, &position, &message.role.as_str(), &parts, &now],
                )
                .await
                .map_err(map_db_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create(
        &self,
        id: ConversationId,
        owner: UserId,
        title: String,
        messages: Vec<Message>,
    ) -> Result<Conversation, RepositoryError> {
        let row = retry_db!("create_conversation", {
            let mut client = get_client(&self.pool).await?;
            let transaction = client.transaction().await.map_err(map_db_error)?;
            let now = Utc::now();

            let row = transaction
                .query_one(
                    r#"
                    INSERT INTO conversations (id, user_id, title, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $4)
                    RETURNING *
                    "#,
                    &[&id.0, &owner.0, &title, &now],
                )
                .await
                .map_err(map_db_error)?;

            Self::insert_messages(&transaction, id.0, &messages).await?;
            transaction.commit().await.map_err(map_db_error)?;

            Ok::<Row, RepositoryError>(row)
        })?;

        debug!(
            conversation_id = %id,
            user_id = %owner,
            messages = messages.len(),
            "Created conversation"
        );
        Self::row_to_conversation(&row)
    }

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = retry_db!("get_conversation", {
            let client = get_client(&self.pool).await?;
            client
                .query_opt("SELECT * FROM conversations WHERE id = $1", &[&id.0])
                .await
                .map_err(map_db_error)
        })?;

        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn replace_all(
        &self,
        id: ConversationId,
        owner: UserId,
        title: String,
        messages: Vec<Message>,
    ) -> Result<ReplaceOutcome, RepositoryError> {
        let outcome = retry_db!("replace_conversation_messages", {
            let mut client = get_client(&self.pool).await?;
            let transaction = client.transaction().await.map_err(map_db_error)?;

            // Row lock serializes concurrent rewrites of one conversation
            let current_owner = transaction
                .query_opt(
                    "SELECT user_id FROM conversations WHERE id = $1 FOR UPDATE",
                    &[&id.0],
                )
                .await
                .map_err(map_db_error)?;

            match current_owner {
                None => return Ok(ReplaceOutcome::NotFound),
                Some(row) => {
                    let user_id: Uuid = row.get(0);
                    if user_id != owner.0 {
                        return Ok(ReplaceOutcome::OwnerMismatch);
                    }
                }
            }

            transaction
                .execute("DELETE FROM messages WHERE conversation_id = $1", &[&id.0])
                .await
                .map_err(map_db_error)?;
            Self::insert_messages(&transaction, id.0, &messages).await?;
            transaction
                .execute(
                    "UPDATE conversations SET title = $2, updated_at = $3 WHERE id = $1",
                    &[&id.0, &title, &Utc::now()],
                )
                .await
                .map_err(map_db_error)?;

            transaction.commit().await.map_err(map_db_error)?;
            Ok::<ReplaceOutcome, RepositoryError>(ReplaceOutcome::Replaced)
        })?;

        debug!(
            conversation_id = %id,
            outcome = ?outcome,
            messages = messages.len(),
            "Replaced conversation messages"
        );
        Ok(outcome)
    }

    async fn get_with_messages(
        &self,
        id: ConversationId,
        owner: UserId,
    ) -> Result<Option<ConversationWithMessages>, RepositoryError> {
        let rows = retry_db!("get_conversation_with_messages", {
            let mut client = get_client(&self.pool).await?;
            // One snapshot for metadata and messages
            let transaction = client
                .build_transaction()
                .read_only(true)
                .isolation_level(tokio_postgres::IsolationLevel::RepeatableRead)
                .start()
                .await
                .map_err(map_db_error)?;

            let conversation = transaction
                .query_opt(
                    "SELECT * FROM conversations WHERE id = $1 AND user_id = $2",
                    &[&id.0, &owner.0],
                )
                .await
                .map_err(map_db_error)?;
            let Some(conversation) = conversation else {
                return Ok(None);
            };

            let messages = transaction
                .query(
                    r#"
                    SELECT position, role, parts FROM messages
                    WHERE conversation_id = $1
                    ORDER BY position ASC
                    "#,
                    &[&id.0],
                )
                .await
                .map_err(map_db_error)?;

            transaction.commit().await.map_err(map_db_error)?;
            Ok::<Option<(Row, Vec<Row>)>, RepositoryError>(Some((conversation, messages)))
        })?;

        let Some((conversation, messages)) = rows else {
            return Ok(None);
        };
        Ok(Some(ConversationWithMessages {
            conversation: Self::row_to_conversation(&conversation)?,
            messages: messages
                .iter()
                .map(Self::row_to_stored_message)
                .collect::<Result<_, _>>()?,
        }))
    }

    async fn list_by_user(&self, owner: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = retry_db!("list_conversations_by_user", {
            let client = get_client(&self.pool).await?;
            client
                .query(
                    r#"
                    SELECT * FROM conversations
                    WHERE user_id = $1
                    ORDER BY updated_at DESC, created_at DESC
                    "#,
                    &[&owner.0],
                )
                .await
                .map_err(map_db_error)
        })?;

        rows.iter().map(Self::row_to_conversation).collect()
    }
}
