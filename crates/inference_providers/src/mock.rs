//! Mock implementation of InferenceProvider for testing
//!
//! Each call to `chat_completion_stream` consumes the next scripted
//! response, so a test can lay out an agent loop step by step: first a
//! tool call, then the answer text. When the script runs out the default
//! response is used.

use crate::{
    Annotation, ChatChoice, ChatCompletionChunk, ChatCompletionParams, ChatDelta,
    CompletionError, FinishReason, FunctionCallDelta, InferenceProvider, MessageRole, SSEEvent,
    StreamingResult, TokenUsage, ToolCallDelta, UrlCitation,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
enum ScriptItem {
    Text(String),
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    Source {
        url: String,
        title: Option<String>,
    },
}

/// Template for one engine step
#[derive(Clone, Debug, Default)]
pub struct ResponseTemplate {
    items: Vec<ScriptItem>,
    /// Yield an error instead of chunk N (stream ends afterwards)
    error_after_chunks: Option<usize>,
    /// Stop producing after N chunks without ever finishing
    stall_after_chunks: Option<usize>,
    chunk_delay: Option<Duration>,
}

impl ResponseTemplate {
    /// Create a new response template streaming the given content word by word
    pub fn new(content: impl Into<String>) -> Self {
        Self::default().with_text(content)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        for (i, word) in content.split(' ').enumerate() {
            let word = if i == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            };
            self.items.push(ScriptItem::Text(word));
        }
        self
    }

    /// Request a tool call; arguments are streamed in two fragments
    pub fn with_tool_call(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        self.items.push(ScriptItem::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.to_string(),
        });
        self
    }

    pub fn with_source(mut self, url: impl Into<String>, title: Option<&str>) -> Self {
        self.items.push(ScriptItem::Source {
            url: url.into(),
            title: title.map(str::to_string),
        });
        self
    }

    pub fn with_error_after(mut self, chunks: usize) -> Self {
        self.error_after_chunks = Some(chunks);
        self
    }

    pub fn with_stall_after(mut self, chunks: usize) -> Self {
        self.stall_after_chunks = Some(chunks);
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    fn requests_tools(&self) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, ScriptItem::ToolCall { .. }))
    }

    fn generate_chunks(&self, id: &str, model: &str) -> Vec<ChatCompletionChunk> {
        let mut deltas = Vec::new();
        let mut tool_index = 0;

        for item in &self.items {
            match item {
                ScriptItem::Text(text) => deltas.push(ChatDelta {
                    content: Some(text.clone()),
                    ..Default::default()
                }),
                ScriptItem::ToolCall {
                    id,
                    name,
                    arguments,
                } => {
                    let split = arguments
                        .char_indices()
                        .nth(arguments.chars().count() / 2)
                        .map(|(i, _)| i)
                        .unwrap_or(arguments.len());
                    let (head, tail) = arguments.split_at(split);
                    deltas.push(ChatDelta {
                        tool_calls: Some(vec![ToolCallDelta {
                            index: tool_index,
                            id: Some(id.clone()),
                            type_: Some("function".to_string()),
                            function: Some(FunctionCallDelta {
                                name: Some(name.clone()),
                                arguments: Some(head.to_string()),
                            }),
                        }]),
                        ..Default::default()
                    });
                    deltas.push(ChatDelta {
                        tool_calls: Some(vec![ToolCallDelta {
                            index: tool_index,
                            id: None,
                            type_: None,
                            function: Some(FunctionCallDelta {
                                name: None,
                                arguments: Some(tail.to_string()),
                            }),
                        }]),
                        ..Default::default()
                    });
                    tool_index += 1;
                }
                ScriptItem::Source { url, title } => deltas.push(ChatDelta {
                    annotations: Some(vec![Annotation::UrlCitation {
                        url_citation: UrlCitation {
                            url: url.clone(),
                            title: title.clone(),
                            start_index: None,
                            end_index: None,
                        },
                    }]),
                    ..Default::default()
                }),
            }
        }

        if let Some(first) = deltas.first_mut() {
            first.role = Some(MessageRole::Assistant);
        }

        let finish_reason = if self.requests_tools() {
            FinishReason::ToolCalls
        } else {
            FinishReason::Stop
        };
        let output_tokens = deltas.len() as i32;

        let mut chunks: Vec<ChatCompletionChunk> = deltas
            .into_iter()
            .map(|delta| chunk(id, model, Some(delta), None, None))
            .collect();
        chunks.push(chunk(
            id,
            model,
            Some(ChatDelta::default()),
            Some(finish_reason),
            None,
        ));
        // Final usage-only chunk, as engines send with include_usage
        chunks.push(ChatCompletionChunk {
            choices: vec![],
            usage: Some(TokenUsage::new(0, output_tokens)),
            ..chunk(id, model, None, None, None)
        });
        chunks
    }
}

fn chunk(
    id: &str,
    model: &str,
    delta: Option<ChatDelta>,
    finish_reason: Option<FinishReason>,
    usage: Option<TokenUsage>,
) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            delta,
            finish_reason,
        }],
        usage,
    }
}

fn to_event(chunk: ChatCompletionChunk) -> Result<SSEEvent, CompletionError> {
    let json = serde_json::to_string(&chunk)
        .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;
    Ok(SSEEvent {
        raw_bytes: Bytes::from(format!("data: {json}\n\n")),
        chunk,
    })
}

/// Mock provider that implements InferenceProvider for testing
#[derive(Clone)]
pub struct MockProvider {
    script: Arc<Mutex<VecDeque<Result<ResponseTemplate, CompletionError>>>>,
    default_response: ResponseTemplate,
    requests: Arc<Mutex<Vec<ChatCompletionParams>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_default_response(ResponseTemplate::new("1. 2. 3."))
    }

    pub fn with_default_response(default_response: ResponseTemplate) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            default_response,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue the response for the next engine call
    pub async fn respond_with(&self, response: ResponseTemplate) {
        self.script.lock().await.push_back(Ok(response));
    }

    /// Make the next engine call fail before any chunk is produced
    pub async fn fail_with(&self, error: CompletionError) {
        self.script.lock().await.push_back(Err(error));
    }

    /// Every request received so far, in call order
    pub async fn requests(&self) -> Vec<ChatCompletionParams> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceProvider for MockProvider {
    async fn chat_completion_stream(
        &self,
        params: ChatCompletionParams,
    ) -> Result<StreamingResult, CompletionError> {
        let model = params.model.clone();
        self.requests.lock().await.push(params);

        let template = match self.script.lock().await.pop_front() {
            Some(scripted) => scripted?,
            None => self.default_response.clone(),
        };

        let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
        let mut events: Vec<Result<SSEEvent, CompletionError>> = template
            .generate_chunks(&id, &model)
            .into_iter()
            .map(to_event)
            .collect();

        if let Some(n) = template.error_after_chunks {
            events.truncate(n);
            events.push(Err(CompletionError::CompletionError(
                "mock stream failure".to_string(),
            )));
        }
        let stall = template.stall_after_chunks.is_some();
        if let Some(n) = template.stall_after_chunks {
            events.truncate(n);
        }

        let delay = template.chunk_delay;
        let body = stream::iter(events).then(move |event| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            event
        });

        if stall {
            Ok(Box::pin(body.chain(stream::pending())))
        } else {
            Ok(Box::pin(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatMessage;

    fn params() -> ChatCompletionParams {
        ChatCompletionParams::new("mock-model", vec![ChatMessage::user("hi")])
    }

    async fn collect(provider: &MockProvider) -> Vec<ChatCompletionChunk> {
        let stream = provider.chat_completion_stream(params()).await.unwrap();
        stream
            .map(|event| event.unwrap().chunk)
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn test_default_response_streams_words_then_stop() {
        let provider = MockProvider::new();
        let chunks = collect(&provider).await;

        let text: String = chunks
            .iter()
            .filter_map(|c| c.choices.first())
            .filter_map(|c| c.delta.as_ref())
            .filter_map(|d| d.content.clone())
            .collect();
        assert_eq!(text, "1. 2. 3.");

        let finish = chunks
            .iter()
            .filter_map(|c| c.choices.first())
            .find_map(|c| c.finish_reason);
        assert_eq!(finish, Some(FinishReason::Stop));
        assert!(chunks.last().unwrap().usage.is_some());
    }

    #[tokio::test]
    async fn test_scripted_responses_are_consumed_in_order() {
        let provider = MockProvider::new();
        provider
            .respond_with(ResponseTemplate::empty().with_tool_call(
                "call_1",
                "searchWeb",
                serde_json::json!({"query": "rust"}),
            ))
            .await;
        provider.respond_with(ResponseTemplate::new("done")).await;

        let first = collect(&provider).await;
        let arguments: String = first
            .iter()
            .filter_map(|c| c.choices.first())
            .filter_map(|c| c.delta.as_ref())
            .filter_map(|d| d.tool_calls.as_ref())
            .flatten()
            .filter_map(|t| t.function.as_ref())
            .filter_map(|f| f.arguments.clone())
            .collect();
        assert_eq!(arguments, r#"{"query":"rust"}"#);
        assert!(first
            .iter()
            .filter_map(|c| c.choices.first())
            .any(|c| c.finish_reason == Some(FinishReason::ToolCalls)));

        let second = collect(&provider).await;
        assert!(second
            .iter()
            .filter_map(|c| c.choices.first())
            .any(|c| c.finish_reason == Some(FinishReason::Stop)));
        assert_eq!(provider.request_count().await, 2);
    }

    #[tokio::test]
    async fn test_error_after_chunks() {
        let provider = MockProvider::new();
        provider
            .respond_with(ResponseTemplate::new("a b c").with_error_after(1))
            .await;

        let stream = provider.chat_completion_stream(params()).await.unwrap();
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(events[1].is_err());
    }

    #[tokio::test]
    async fn test_fail_with_rejects_the_call() {
        let provider = MockProvider::new();
        provider
            .fail_with(CompletionError::HttpError {
                status_code: 503,
                message: "overloaded".to_string(),
            })
            .await;

        let result = provider.chat_completion_stream(params()).await;
        assert!(matches!(
            result,
            Err(CompletionError::HttpError {
                status_code: 503,
                ..
            })
        ));
        assert_eq!(provider.request_count().await, 1);
    }
}
