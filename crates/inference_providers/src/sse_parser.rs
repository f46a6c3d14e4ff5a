use crate::{ChatCompletionChunk, CompletionError};
use bytes::Bytes;
use futures_util::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Represents a single SSE event with both raw bytes and parsed content
#[derive(Debug, Clone, serde::Serialize)]
pub struct SSEEvent {
    /// The raw bytes of this SSE event (including "data: " prefix and newline)
    #[serde(skip)]
    pub raw_bytes: Bytes,
    /// The parsed chunk
    pub chunk: ChatCompletionChunk,
}

/// SSE (Server-Sent Events) stream parser that properly handles buffering
/// of incomplete events across HTTP chunks
pub struct SSEParser<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: VecDeque<Result<SSEEvent, CompletionError>>,
    finished: bool,
}

impl<S, E> SSEParser<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn parse_sse_event(data: &str) -> Result<Option<ChatCompletionChunk>, CompletionError> {
        // Handle end-of-stream marker
        if data == "[DONE]" {
            return Ok(None);
        }

        serde_json::from_str::<ChatCompletionChunk>(data)
            .map(Some)
            .map_err(|e| {
                tracing::warn!(error = %e, "Failed to parse chat completion chunk");
                CompletionError::InvalidResponse(format!("Invalid JSON in SSE event: {e}"))
            })
    }

    /// Moves every complete line out of the buffer into the pending queue
    fn process_buffer(&mut self) {
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                match Self::parse_sse_event(data.trim_start()) {
                    Ok(Some(chunk)) => self.pending.push_back(Ok(SSEEvent {
                        raw_bytes: Bytes::from(raw),
                        chunk,
                    })),
                    Ok(None) => {} // [DONE] marker
                    Err(e) => self.pending.push_back(Err(e)),
                }
            }
        }
    }
}

impl<S, E> Stream for SSEParser<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = Result<SSEEvent, CompletionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(result) = self.pending.pop_front() {
                return Poll::Ready(Some(result));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.process_buffer();
                }
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(CompletionError::CompletionError(
                        e.to_string(),
                    ))));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    // A final event may arrive without a trailing newline
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                        self.process_buffer();
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{stream, StreamExt};

    fn chunk_json(content: &str) -> String {
        format!(
            r#"{{"id":"c1","object":"chat.completion.chunk","created":1,"model":"m","choices":[{{"index":0,"delta":{{"content":"{content}"}}}}]}}"#
        )
    }

    fn content_of(event: &SSEEvent) -> String {
        event.chunk.choices[0]
            .delta
            .as_ref()
            .and_then(|d| d.content.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_multiple_events_in_one_read_are_all_yielded() {
        let body = format!(
            "data: {}\n\ndata: {}\n\ndata: [DONE]\n\n",
            chunk_json("Hello"),
            chunk_json(" world")
        );
        let input = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(body))]);

        let events: Vec<_> = SSEParser::new(input).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(content_of(events[0].as_ref().unwrap()), "Hello");
        assert_eq!(content_of(events[1].as_ref().unwrap()), " world");
    }

    #[tokio::test]
    async fn test_event_split_across_reads() {
        let line = format!("data: {}\n\n", chunk_json("split"));
        let (first, second) = line.split_at(20);
        let input = stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from(first.to_string())),
            Ok(Bytes::from(second.to_string())),
        ]);

        let events: Vec<_> = SSEParser::new(input).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(content_of(events[0].as_ref().unwrap()), "split");
    }

    #[tokio::test]
    async fn test_malformed_event_is_reported() {
        let input = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(
            "data: {not json}\n\n",
        ))]);

        let events: Vec<_> = SSEParser::new(input).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(CompletionError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_comments_and_trailing_event_without_newline() {
        let body = format!(": keep-alive\ndata: {}", chunk_json("tail"));
        let input = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(body))]);

        let events: Vec<_> = SSEParser::new(input).collect().await;
        assert_eq!(events.len(), 1);
        assert_eq!(content_of(events[0].as_ref().unwrap()), "tail");
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let input = stream::iter(vec![
            Err(std::io::Error::other("connection reset")),
            Ok(Bytes::from(format!("data: {}\n", chunk_json("late")))),
        ]);

        let events: Vec<_> = SSEParser::new(input).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(CompletionError::CompletionError(_))));
    }
}
