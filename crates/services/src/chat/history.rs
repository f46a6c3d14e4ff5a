//! Conversion of the stored transcript into engine messages

use inference_providers::{ChatMessage, ToolCall};

use crate::conversations::{Message, Part, Role, ToolInvocationState};

/// System prompt first, then every message in order. Completed tool
/// invocations become an assistant tool call plus a tool result; invocations
/// that never completed and source parts carry nothing the engine needs.
pub fn to_engine_messages(system_prompt: &str, transcript: &[Message]) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];

    for message in transcript {
        match message.role {
            Role::User => {
                let text = message.text();
                if !text.is_empty() {
                    messages.push(ChatMessage::user(text));
                }
            }
            Role::Assistant => append_assistant(&mut messages, message, true),
            // Tool messages contribute recorded results only
            Role::Tool => append_assistant(&mut messages, message, false),
        }
    }

    messages
}

fn append_assistant(messages: &mut Vec<ChatMessage>, message: &Message, keep_text: bool) {
    let mut text = String::new();

    for part in &message.parts {
        match part {
            Part::Text { text: delta } if keep_text => text.push_str(delta),
            Part::ToolInvocation { tool_invocation }
                if tool_invocation.state == ToolInvocationState::Completed =>
            {
                let preceding = std::mem::take(&mut text);
                messages.push(ChatMessage::assistant_tool_calls(
                    (!preceding.is_empty()).then_some(preceding),
                    vec![ToolCall::function(
                        &tool_invocation.tool_call_id,
                        &tool_invocation.tool_name,
                        tool_invocation.args.to_string(),
                    )],
                ));
                let result = serde_json::to_string(
                    tool_invocation.result.as_deref().unwrap_or_default(),
                )
                .unwrap_or_else(|_| "[]".to_string());
                messages.push(ChatMessage::tool_result(
                    &tool_invocation.tool_call_id,
                    result,
                ));
            }
            Part::Text { .. } | Part::ToolInvocation { .. } | Part::Source { .. } => {}
        }
    }

    if !text.is_empty() {
        messages.push(ChatMessage::assistant(text));
    }
}
