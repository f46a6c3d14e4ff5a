use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use services::conversations::{
    Conversation, ConversationId, ConversationWithMessages, Message, Part, Role,
};
use utoipa::ToSchema;
use uuid::Uuid;

// ============================================
// Chat
// ============================================

/// Body of `POST /chat`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    /// Full conversation history, ending with the new user message
    pub messages: Vec<ChatRequestMessage>,
    /// Existing conversation to continue; omit to start a new one
    #[serde(default, rename = "chatId", alias = "chat_id")]
    pub chat_id: Option<String>,
}

/// A message as sent by clients: structured `parts`, or plain `content`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequestMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<Part>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A request that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedChatRequest {
    pub chat_id: Option<ConversationId>,
    pub messages: Vec<Message>,
}

impl ChatRequest {
    pub fn validate(self) -> Result<ValidatedChatRequest, String> {
        if self.messages.is_empty() {
            return Err("No messages provided".to_string());
        }

        let chat_id = self
            .chat_id
            .filter(|id| !id.trim().is_empty())
            .map(|id| {
                id.parse::<ConversationId>()
                    .map_err(|_| format!("Invalid chatId: {id}"))
            })
            .transpose()?;

        let messages = self
            .messages
            .into_iter()
            .enumerate()
            .map(|(index, message)| message.into_message(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidatedChatRequest { chat_id, messages })
    }
}

impl ChatRequestMessage {
    fn into_message(self, index: usize) -> Result<Message, String> {
        let role: Role = self
            .role
            .parse()
            .map_err(|_| format!("messages[{index}]: unknown role '{}'", self.role))?;

        let parts = match (self.parts, self.content) {
            (Some(parts), _) if !parts.is_empty() => parts,
            (_, Some(content)) => vec![Part::text(content)],
            _ => return Err(format!("messages[{index}]: message has no content")),
        };

        Ok(Message::new(role, parts))
    }
}

// ============================================
// Conversations
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationSummary {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id.0,
            title: conversation.title,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationListResponse {
    pub object: String,
    pub data: Vec<ConversationSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: ConversationSummary,
    /// Ascending by position
    pub messages: Vec<Message>,
}

impl From<ConversationWithMessages> for ConversationDetail {
    fn from(value: ConversationWithMessages) -> Self {
        Self {
            conversation: value.conversation.into(),
            messages: value
                .messages
                .into_iter()
                .map(|stored| stored.message)
                .collect(),
        }
    }
}

// ============================================
// Errors
// ============================================

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub param: Option<String>,
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: String, error_type: String) -> Self {
        Self {
            error: ErrorDetail {
                message,
                r#type: error_type,
                param: None,
                code: None,
            },
        }
    }
}
