//! Inference providers crate for the generation engine behind the chat loop
//!
//! This crate provides a streaming-first trait interface over chat completion
//! backends. A single implementation speaks the OpenAI wire format, which
//! covers vLLM and most hosted gateways; a scripted mock drives tests.
//!
//! # Streaming-First Design
//!
//! Completions are returned as a stream of parsed SSE events. Text deltas,
//! tool-call fragments and citations arrive incrementally so callers can
//! forward them to clients as soon as they exist.
//!
//! # Usage
//!
//! ```rust,ignore
//! use inference_providers::{ChatCompletionParams, ChatMessage, InferenceProvider};
//! use futures_util::StreamExt;
//!
//! async fn example<P: InferenceProvider>(provider: P) -> Result<(), CompletionError> {
//!     let params = ChatCompletionParams::new("model", vec![ChatMessage::user("hello")]);
//!
//!     let mut stream = provider.chat_completion_stream(params).await?;
//!     while let Some(event) = stream.next().await {
//!         for choice in event?.chunk.choices {
//!             if let Some(content) = choice.delta.and_then(|d| d.content) {
//!                 print!("{content}");
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod mock;
pub mod models;
pub mod openai_compatible;
pub mod sse_parser;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

// Re-export commonly used types for convenience
pub use mock::{MockProvider, ResponseTemplate};
pub use models::{
    Annotation, ChatChoice, ChatCompletionChunk, ChatCompletionParams, ChatDelta, ChatMessage,
    CompletionError, FinishReason, FunctionCall, FunctionCallDelta, FunctionChoice,
    FunctionDefinition, MessageRole, StreamOptions, TokenUsage, ToolCall, ToolCallDelta,
    ToolChoice, ToolDefinition, UrlCitation,
};
pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
pub use sse_parser::SSEEvent;

/// Type alias for streaming completion results
///
/// Each item carries the raw SSE bytes and the parsed chunk.
pub type StreamingResult = Pin<Box<dyn Stream<Item = Result<SSEEvent, CompletionError>> + Send>>;

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Performs a streaming chat completion request
    ///
    /// Returns a stream of parsed chunks that can be processed incrementally.
    /// Errors before the first byte (connection, non-2xx status) are returned
    /// directly; errors after that arrive as stream items.
    async fn chat_completion_stream(
        &self,
        params: ChatCompletionParams,
    ) -> Result<StreamingResult, CompletionError>;
}
