use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

use crate::auth::UserId;
use crate::conversations::{ConversationId, Message, SourcePart, ToolInvocation};

/// Instruction sent ahead of every conversation
pub const SYSTEM_PROMPT: &str = "You are a research assistant that answers with the help of a web search tool.
For every user question:
1. Call the searchWeb tool at least once with a focused query before answering, even when you believe you already know the answer.
2. Read the returned results carefully and base your answer on them.
3. Cite the result behind each fact or claim with an inline markdown link written as [title](url).
4. Write every URL as a markdown link.
5. Keep the answer clear, accurate and helpful.";

/// The only error text clients ever see for a failed turn
pub const GENERIC_ERROR_MESSAGE: &str = "Oops, an error occurred!";

pub const SEED_TITLE_MAX_CHARS: usize = 100;
pub const TURN_TITLE_MAX_CHARS: usize = 50;

/// Why a successful turn stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The engine finished without requesting more tools
    Stop,
    /// The step budget ran out
    StepBudgetExhausted,
}

/// Events delivered to the client, in generation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// Only sent first, and only when the request carried no chat id
    ChatCreated { chat_id: ConversationId },
    TextDelta { delta: String },
    /// One event per lifecycle transition, carrying the full invocation
    ToolInvocation { tool_invocation: ToolInvocation },
    Source { source: SourcePart },
    Finish { reason: FinishReason },
    Error { message: String },
}

impl ChatStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatStreamEvent::ChatCreated { .. } => "chat_created",
            ChatStreamEvent::TextDelta { .. } => "text_delta",
            ChatStreamEvent::ToolInvocation { .. } => "tool_invocation",
            ChatStreamEvent::Source { .. } => "source",
            ChatStreamEvent::Finish { .. } => "finish",
            ChatStreamEvent::Error { .. } => "error",
        }
    }
}

pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatStreamEvent> + Send>>;

/// Generation loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Generating,
    AwaitingToolResult,
    Completed,
    Aborted,
}

#[derive(Debug, Clone)]
pub struct ChatTurnRequest {
    pub user_id: UserId,
    pub chat_id: Option<ConversationId>,
    /// Full prior history, ending with the new user message
    pub messages: Vec<Message>,
}

pub struct ChatTurn {
    pub chat_id: ConversationId,
    pub created: bool,
    pub events: ChatEventStream,
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    /// Label put on source parts
    pub provider_name: String,
    pub step_budget: usize,
    pub request_timeout: Duration,
}

impl ChatSettings {
    pub fn from_config(inference: &config::InferenceConfig, chat: &config::ChatConfig) -> Self {
        Self {
            model: inference.model.clone(),
            provider_name: inference.provider_name.clone(),
            step_budget: chat.step_budget,
            request_timeout: Duration::from_secs(chat.request_timeout_seconds),
        }
    }
}
