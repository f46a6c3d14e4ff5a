use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use inference_providers::{
    Annotation, ChatCompletionParams, ChatMessage, InferenceProvider, StreamingResult, ToolChoice,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::errors::{ChatError, TurnError};
use super::history;
use super::models::*;
use super::ports::ChatServiceTrait;
use super::service_helpers::{
    AssistantMessageBuilder, EventEmitter, RequestedToolCall, ToolCallAccumulator,
};
use crate::auth::UserId;
use crate::common::truncate_with_ellipsis;
use crate::conversations::{
    ConversationId, ConversationServiceTrait, Message, Role, SourcePart, ToolInvocation,
};
use crate::tools::{ToolError, WebSearchArgs, WebSearchTool, WEB_SEARCH_TOOL_NAME};

const UNTITLED_CHAT: &str = "New chat";

pub struct ChatServiceImpl {
    conversations: Arc<dyn ConversationServiceTrait>,
    engine: Arc<dyn InferenceProvider>,
    web_search: Arc<WebSearchTool>,
    settings: ChatSettings,
}

impl ChatServiceImpl {
    pub fn new(
        conversations: Arc<dyn ConversationServiceTrait>,
        engine: Arc<dyn InferenceProvider>,
        web_search: Arc<WebSearchTool>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            conversations,
            engine,
            web_search,
            settings,
        }
    }
}

#[async_trait]
impl ChatServiceTrait for ChatServiceImpl {
    async fn start_turn(
        &self,
        request: ChatTurnRequest,
        cancel: CancellationToken,
    ) -> Result<ChatTurn, ChatError> {
        if request.messages.is_empty() {
            return Err(ChatError::InvalidParams("No messages provided".to_string()));
        }

        let seed_title = title_from(&request.messages, SEED_TITLE_MAX_CHARS);
        let resolved = self
            .conversations
            .resolve_or_create(
                request.chat_id,
                request.user_id,
                seed_title,
                request.messages.clone(),
            )
            .await?;

        info!(
            conversation_id = %resolved.id,
            user_id = %request.user_id,
            created = resolved.created,
            messages = request.messages.len(),
            "Starting chat turn"
        );

        let (tx, rx) = mpsc::unbounded();
        let emitter = EventEmitter::new(tx);
        if resolved.created {
            emitter
                .emit_chat_created(resolved.id)
                .map_err(|e| ChatError::InternalError(e.to_string()))?;
        }

        let runner = TurnRunner {
            conversation_id: resolved.id,
            user_id: request.user_id,
            history: request.messages,
            conversations: self.conversations.clone(),
            engine: self.engine.clone(),
            web_search: self.web_search.clone(),
            settings: self.settings.clone(),
            emitter,
            cancel,
            state: TurnState::Generating,
        };
        tokio::spawn(runner.run());

        Ok(ChatTurn {
            chat_id: resolved.id,
            created: resolved.created,
            events: Box::pin(rx),
        })
    }
}

/// Owns everything one turn needs so it can outlive the request handler
struct TurnRunner {
    conversation_id: ConversationId,
    user_id: UserId,
    history: Vec<Message>,
    conversations: Arc<dyn ConversationServiceTrait>,
    engine: Arc<dyn InferenceProvider>,
    web_search: Arc<WebSearchTool>,
    settings: ChatSettings,
    emitter: EventEmitter,
    cancel: CancellationToken,
    state: TurnState,
}

/// What one engine call produced
struct StepOutput {
    text: String,
    tool_calls: Vec<RequestedToolCall>,
}

impl TurnRunner {
    async fn run(mut self) {
        // The deadline bounds generation only; a started write is never cut short
        let deadline = self.settings.request_timeout;
        let generated = match tokio::time::timeout(deadline, self.generate()).await {
            Ok(generated) => generated,
            Err(_) => Err(TurnError::Timeout),
        };
        let result = match generated {
            Ok((finish, assistant)) => self.complete(finish, assistant).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(reason) => {
                info!(
                    conversation_id = %self.conversation_id,
                    reason = ?reason,
                    "Chat turn completed"
                );
            }
            Err(e) if e.is_abort() => {
                self.transition(TurnState::Aborted);
                info!(
                    conversation_id = %self.conversation_id,
                    "Chat turn aborted: {}", e
                );
            }
            Err(e) => {
                self.transition(TurnState::Aborted);
                error!(
                    conversation_id = %self.conversation_id,
                    user_id = %self.user_id,
                    error = %e,
                    "Chat turn failed"
                );
                if self.emitter.emit_error(GENERIC_ERROR_MESSAGE).is_err() {
                    debug!("Client gone before error event could be delivered");
                }
            }
        }
    }

    fn transition(&mut self, next: TurnState) {
        debug!(
            conversation_id = %self.conversation_id,
            from = ?self.state,
            to = ?next,
            "Turn state change"
        );
        self.state = next;
    }

    /// Step loop. Returns why it stopped and everything the assistant produced.
    async fn generate(&mut self) -> Result<(FinishReason, AssistantMessageBuilder), TurnError> {
        let mut engine_messages = history::to_engine_messages(SYSTEM_PROMPT, &self.history);
        let tools = vec![self.web_search.definition()];
        let mut assistant = AssistantMessageBuilder::default();
        let mut finish = FinishReason::StepBudgetExhausted;

        for step in 1..=self.settings.step_budget {
            debug!(conversation_id = %self.conversation_id, step, "Requesting engine step");

            let mut params =
                ChatCompletionParams::new(self.settings.model.clone(), engine_messages.clone());
            params.tools = Some(tools.clone());
            params.tool_choice = Some(ToolChoice::String("auto".to_string()));

            let engine = self.engine.clone();
            let stream = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TurnError::Cancelled),
                stream = engine.chat_completion_stream(params) => stream?,
            };

            let output = self.consume_step(stream, &mut assistant).await?;
            if output.tool_calls.is_empty() {
                finish = FinishReason::Stop;
                break;
            }

            self.transition(TurnState::AwaitingToolResult);
            engine_messages.push(ChatMessage::assistant_tool_calls(
                (!output.text.is_empty()).then_some(output.text),
                output
                    .tool_calls
                    .iter()
                    .map(RequestedToolCall::to_engine_call)
                    .collect(),
            ));

            for call in &output.tool_calls {
                let result = self.execute_tool_call(call, &mut assistant).await?;
                engine_messages.push(ChatMessage::tool_result(&call.id, result));
            }
            self.transition(TurnState::Generating);
        }

        if finish == FinishReason::StepBudgetExhausted {
            warn!(
                conversation_id = %self.conversation_id,
                step_budget = self.settings.step_budget,
                "Step budget exhausted"
            );
        }

        Ok((finish, assistant))
    }

    async fn complete(
        &mut self,
        finish: FinishReason,
        assistant: AssistantMessageBuilder,
    ) -> Result<FinishReason, TurnError> {
        self.persist(assistant).await?;
        self.transition(TurnState::Completed);
        self.emitter.emit_finish(finish)?;
        Ok(finish)
    }

    /// Relay one engine stream: text and sources go out as they arrive,
    /// tool call fragments are collected until the stream ends.
    async fn consume_step(
        &self,
        mut stream: StreamingResult,
        assistant: &mut AssistantMessageBuilder,
    ) -> Result<StepOutput, TurnError> {
        let mut text = String::new();
        let mut tool_calls = ToolCallAccumulator::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TurnError::Cancelled),
                next = stream.next() => next,
            };
            let Some(event) = next else { break };
            let event = event.inspect_err(|e| {
                error!(conversation_id = %self.conversation_id, "Error in engine stream: {}", e);
            })?;

            for choice in event.chunk.choices {
                let Some(delta) = choice.delta else { continue };

                if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                    text.push_str(&content);
                    assistant.push_text(&content);
                    self.emitter.emit_text_delta(content)?;
                }

                for annotation in delta.annotations.unwrap_or_default() {
                    if let Annotation::UrlCitation { url_citation } = annotation {
                        let source = SourcePart {
                            url: url_citation.url,
                            title: url_citation.title,
                            provider: Some(self.settings.provider_name.clone()),
                        };
                        assistant.push_source(source.clone());
                        self.emitter.emit_source(source)?;
                    }
                }

                for fragment in delta.tool_calls.unwrap_or_default() {
                    if let Some(pending) = tool_calls.accept(fragment) {
                        assistant.upsert_tool_invocation(pending.clone());
                        self.emitter.emit_tool_invocation(pending)?;
                    }
                }
            }
        }

        let tool_calls = if tool_calls.is_empty() {
            Vec::new()
        } else {
            tool_calls.finish()?
        };
        Ok(StepOutput { text, tool_calls })
    }

    /// Run one requested tool, emitting called and completed.
    /// Returns the JSON result handed back to the engine.
    async fn execute_tool_call(
        &self,
        call: &RequestedToolCall,
        assistant: &mut AssistantMessageBuilder,
    ) -> Result<String, TurnError> {
        if call.name != WEB_SEARCH_TOOL_NAME {
            return Err(ToolError::UnknownTool(call.name.clone()).into());
        }
        let args = WebSearchArgs::parse(&call.arguments)?;

        let called = ToolInvocation::pending(&call.id, &call.name)
            .called(serde_json::json!({ "query": args.query }));
        assistant.upsert_tool_invocation(called.clone());
        self.emitter.emit_tool_invocation(called.clone())?;

        info!(
            conversation_id = %self.conversation_id,
            tool_call_id = %call.id,
            query = %args.query,
            "Running web search"
        );
        let results = self.web_search.invoke(&args.query, &self.cancel).await?;
        let payload = serde_json::to_string(&results)
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let completed = called.completed(results);
        assistant.upsert_tool_invocation(completed.clone());
        self.emitter.emit_tool_invocation(completed)?;

        Ok(payload)
    }

    /// Replace the stored transcript with the request history plus this
    /// turn's single assistant message
    async fn persist(&self, assistant: AssistantMessageBuilder) -> Result<(), TurnError> {
        if self.cancel.is_cancelled() {
            return Err(TurnError::Cancelled);
        }

        let mut messages = self.history.clone();
        messages.extend(assistant.build());
        let title = title_from(&self.history, TURN_TITLE_MAX_CHARS);

        self.conversations
            .replace_all(self.conversation_id, self.user_id, title, messages)
            .await?;
        Ok(())
    }
}

/// Title from the most recent user message, or the last message if none is a user's
fn title_from(messages: &[Message], max_chars: usize) -> String {
    let source = messages
        .iter()
        .rev()
        .find(|message| message.role == Role::User)
        .or_else(|| messages.last())
        .map(Message::text)
        .unwrap_or_default();

    let title = truncate_with_ellipsis(&source, max_chars);
    if title.is_empty() {
        UNTITLED_CHAT.to_string()
    } else {
        title
    }
}
