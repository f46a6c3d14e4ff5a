use futures::channel::mpsc::UnboundedSender;
use inference_providers::{CompletionError, ToolCall, ToolCallDelta};
use std::collections::BTreeMap;

use super::errors::TurnError;
use super::models::{ChatStreamEvent, FinishReason};
use crate::conversations::{ConversationId, Message, Part, Role, SourcePart, ToolInvocation};

/// Writes events to the client channel. A failed send means the client is gone.
pub(super) struct EventEmitter {
    tx: UnboundedSender<ChatStreamEvent>,
}

impl EventEmitter {
    pub fn new(tx: UnboundedSender<ChatStreamEvent>) -> Self {
        Self { tx }
    }

    pub fn emit_chat_created(&self, chat_id: ConversationId) -> Result<(), TurnError> {
        self.send(ChatStreamEvent::ChatCreated { chat_id })
    }

    pub fn emit_text_delta(&self, delta: String) -> Result<(), TurnError> {
        self.send(ChatStreamEvent::TextDelta { delta })
    }

    pub fn emit_tool_invocation(&self, tool_invocation: ToolInvocation) -> Result<(), TurnError> {
        self.send(ChatStreamEvent::ToolInvocation { tool_invocation })
    }

    pub fn emit_source(&self, source: SourcePart) -> Result<(), TurnError> {
        self.send(ChatStreamEvent::Source { source })
    }

    pub fn emit_finish(&self, reason: FinishReason) -> Result<(), TurnError> {
        self.send(ChatStreamEvent::Finish { reason })
    }

    pub fn emit_error(&self, message: &str) -> Result<(), TurnError> {
        self.send(ChatStreamEvent::Error {
            message: message.to_string(),
        })
    }

    fn send(&self, event: ChatStreamEvent) -> Result<(), TurnError> {
        self.tx.unbounded_send(event).map_err(|e| {
            tracing::debug!("Event receiver dropped: {}", e);
            TurnError::ClientDisconnected
        })
    }
}

/// Builds the single assistant message a turn appends to the transcript
#[derive(Debug, Default)]
pub(super) struct AssistantMessageBuilder {
    parts: Vec<Part>,
}

impl AssistantMessageBuilder {
    /// Consecutive deltas extend the same text part
    pub fn push_text(&mut self, delta: &str) {
        if let Some(Part::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
        } else {
            self.parts.push(Part::text(delta));
        }
    }

    pub fn push_source(&mut self, source: SourcePart) {
        self.parts.push(Part::Source { source });
    }

    /// Replace the invocation with the same call id in place, or append it
    pub fn upsert_tool_invocation(&mut self, invocation: ToolInvocation) {
        let existing = self.parts.iter_mut().find_map(|part| match part {
            Part::ToolInvocation { tool_invocation }
                if tool_invocation.tool_call_id == invocation.tool_call_id =>
            {
                Some(tool_invocation)
            }
            _ => None,
        });
        match existing {
            Some(slot) => *slot = invocation,
            None => self.parts.push(Part::ToolInvocation {
                tool_invocation: invocation,
            }),
        }
    }

    pub fn build(self) -> Option<Message> {
        if self.parts.is_empty() {
            None
        } else {
            Some(Message::new(Role::Assistant, self.parts))
        }
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
    announced: bool,
}

/// A tool call whose arguments have fully arrived
#[derive(Debug, Clone, PartialEq)]
pub(super) struct RequestedToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl RequestedToolCall {
    pub fn to_engine_call(&self) -> ToolCall {
        ToolCall::function(&self.id, &self.name, self.arguments.clone())
    }
}

/// Reassembles streamed tool call fragments, keyed by the engine's call index
#[derive(Debug, Default)]
pub(super) struct ToolCallAccumulator {
    calls: BTreeMap<i64, PartialToolCall>,
}

impl ToolCallAccumulator {
    /// Returns a pending invocation the first time a call's name is known
    pub fn accept(&mut self, fragment: ToolCallDelta) -> Option<ToolInvocation> {
        let entry = self.calls.entry(fragment.index).or_default();

        if entry.id.is_none() {
            entry.id = fragment.id;
        }
        if let Some(function) = fragment.function {
            if entry.name.is_none() {
                entry.name = function.name.filter(|name| !name.is_empty());
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }

        if entry.announced {
            return None;
        }
        let name = entry.name.clone()?;
        let id = entry
            .id
            .get_or_insert_with(|| format!("call_{}", uuid::Uuid::new_v4().simple()))
            .clone();
        entry.announced = true;
        Some(ToolInvocation::pending(id, name))
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn finish(self) -> Result<Vec<RequestedToolCall>, CompletionError> {
        self.calls
            .into_iter()
            .map(|(index, call)| {
                let (Some(id), Some(name)) = (call.id, call.name) else {
                    return Err(CompletionError::InvalidResponse(format!(
                        "Tool call at index {index} has no function name"
                    )));
                };
                let arguments = if call.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    call.arguments
                };
                Ok(RequestedToolCall {
                    id,
                    name,
                    arguments,
                })
            })
            .collect()
    }
}
