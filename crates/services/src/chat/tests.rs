use async_trait::async_trait;
use futures::StreamExt;
use inference_providers::mock::{MockProvider, ResponseTemplate};
use inference_providers::{CompletionError, MessageRole};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::auth::UserId;
use crate::common::RepositoryError;
use crate::conversations::{
    Conversation, ConversationId, ConversationRepository, ConversationServiceImpl,
    ConversationServiceTrait, ConversationWithMessages, Message, Part, ReplaceOutcome, Role,
    ToolInvocationState,
};
use crate::test_utils::InMemoryConversationRepository;
use crate::tools::{
    ports::MockWebSearchProviderTrait, WebSearchError, WebSearchProviderTrait, WebSearchResult,
    WebSearchTool,
};

fn search_result(n: usize) -> WebSearchResult {
    WebSearchResult {
        title: format!("Result {n}"),
        link: format!("https://example.com/{n}"),
        snippet: format!("Snippet {n}"),
    }
}

fn static_search(results: Vec<WebSearchResult>) -> Arc<dyn WebSearchProviderTrait> {
    let mut provider = MockWebSearchProviderTrait::new();
    provider
        .expect_search()
        .returning(move |_, _| Ok(results.clone()));
    Arc::new(provider)
}

struct SlowSearch;

#[async_trait]
impl WebSearchProviderTrait for SlowSearch {
    async fn search(
        &self,
        _query: String,
        _count: usize,
    ) -> Result<Vec<WebSearchResult>, WebSearchError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![])
    }
}

struct Harness {
    service: ChatServiceImpl,
    engine: MockProvider,
    repo: Arc<InMemoryConversationRepository>,
    conversations: Arc<ConversationServiceImpl>,
    user: UserId,
}

fn settings(step_budget: usize, timeout: Duration) -> ChatSettings {
    ChatSettings {
        model: "test-model".to_string(),
        provider_name: "test-engine".to_string(),
        step_budget,
        request_timeout: timeout,
    }
}

fn harness_with(search: Arc<dyn WebSearchProviderTrait>, settings: ChatSettings) -> Harness {
    let engine = MockProvider::new();
    let repo = Arc::new(InMemoryConversationRepository::default());
    let conversations = Arc::new(ConversationServiceImpl::new(repo.clone()));
    let service = ChatServiceImpl::new(
        conversations.clone(),
        Arc::new(engine.clone()),
        Arc::new(WebSearchTool::new(search, 10)),
        settings,
    );
    Harness {
        service,
        engine,
        repo,
        conversations,
        user: UserId(uuid::Uuid::new_v4()),
    }
}

fn harness() -> Harness {
    harness_with(
        static_search(vec![search_result(1), search_result(2)]),
        settings(10, Duration::from_secs(5)),
    )
}

fn request(h: &Harness, chat_id: Option<ConversationId>, text: &str) -> ChatTurnRequest {
    ChatTurnRequest {
        user_id: h.user,
        chat_id,
        messages: vec![Message::user_text(text)],
    }
}

fn search_call(id: &str, query: &str) -> ResponseTemplate {
    ResponseTemplate::empty().with_tool_call(id, "searchWeb", json!({ "query": query }))
}

fn invocation_states(events: &[ChatStreamEvent]) -> Vec<ToolInvocationState> {
    events
        .iter()
        .filter_map(|event| match event {
            ChatStreamEvent::ToolInvocation { tool_invocation } => Some(tool_invocation.state),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_empty_messages_rejected_before_anything_happens() {
    let h = harness();
    let result = h
        .service
        .start_turn(
            ChatTurnRequest {
                user_id: h.user,
                chat_id: None,
                messages: vec![],
            },
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(ChatError::InvalidParams(_))));
    assert_eq!(h.engine.request_count().await, 0);
    assert_eq!(h.repo.conversation_count().await, 0);
}

#[tokio::test]
async fn test_new_chat_streams_chat_created_first_and_persists() {
    let h = harness();
    h.engine
        .respond_with(ResponseTemplate::new("Hello there"))
        .await;

    let turn = h
        .service
        .start_turn(request(&h, None, "Hi"), CancellationToken::new())
        .await
        .unwrap();
    assert!(turn.created);
    let chat_id = turn.chat_id;

    let events: Vec<_> = turn.events.collect().await;
    assert_eq!(events[0], ChatStreamEvent::ChatCreated { chat_id });
    assert_eq!(
        events.last().unwrap(),
        &ChatStreamEvent::Finish {
            reason: FinishReason::Stop
        }
    );
    let text: String = events
        .iter()
        .filter_map(|event| match event {
            ChatStreamEvent::TextDelta { delta } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello there");

    assert_eq!(h.repo.conversation_count().await, 1);
    let stored = h.conversations.fetch_one(chat_id, h.user).await.unwrap();
    assert_eq!(stored.conversation.title, "Hi");
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[0].message, Message::user_text("Hi"));
    assert_eq!(stored.messages[1].message.role, Role::Assistant);
    assert_eq!(stored.messages[1].message.text(), "Hello there");
}

#[tokio::test]
async fn test_existing_chat_has_no_chat_created_event() {
    let h = harness();
    let first = h
        .service
        .start_turn(request(&h, None, "First"), CancellationToken::new())
        .await
        .unwrap();
    let chat_id = first.chat_id;
    let _: Vec<_> = first.events.collect().await;

    let mut history = h
        .conversations
        .fetch_one(chat_id, h.user)
        .await
        .unwrap()
        .messages
        .into_iter()
        .map(|stored| stored.message)
        .collect::<Vec<_>>();
    history.push(Message::user_text("Second"));

    let second = h
        .service
        .start_turn(
            ChatTurnRequest {
                user_id: h.user,
                chat_id: Some(chat_id),
                messages: history,
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(!second.created);

    let events: Vec<_> = second.events.collect().await;
    assert!(!events
        .iter()
        .any(|e| matches!(e, ChatStreamEvent::ChatCreated { .. })));

    let stored = h.conversations.fetch_one(chat_id, h.user).await.unwrap();
    assert_eq!(stored.conversation.title, "Second");
    assert_eq!(stored.messages.len(), 4);
    assert_eq!(h.repo.conversation_count().await, 1);
}

#[tokio::test]
async fn test_foreign_or_unknown_chat_is_not_found() {
    let h = harness();
    let owner_turn = h
        .service
        .start_turn(request(&h, None, "Mine"), CancellationToken::new())
        .await
        .unwrap();
    let _: Vec<_> = owner_turn.events.collect().await;
    let requests_before = h.engine.request_count().await;

    let intruder = ChatTurnRequest {
        user_id: UserId(uuid::Uuid::new_v4()),
        chat_id: Some(owner_turn.chat_id),
        messages: vec![Message::user_text("Let me in")],
    };
    let result = h
        .service
        .start_turn(intruder, CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ChatError::NotFoundOrForbidden)));

    let result = h
        .service
        .start_turn(
            request(&h, Some(ConversationId::new()), "Anyone?"),
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(ChatError::NotFoundOrForbidden)));
    assert_eq!(h.engine.request_count().await, requests_before);
}

#[tokio::test]
async fn test_tool_lifecycle_precedes_answer_text() {
    let h = harness();
    h.engine.respond_with(search_call("call_1", "rust")).await;
    h.engine
        .respond_with(
            ResponseTemplate::new("Rust is a language")
                .with_source("https://example.com/1", Some("Result 1")),
        )
        .await;

    let turn = h
        .service
        .start_turn(request(&h, None, "What is rust?"), CancellationToken::new())
        .await
        .unwrap();
    let chat_id = turn.chat_id;
    let events: Vec<_> = turn.events.collect().await;

    assert_eq!(
        invocation_states(&events),
        vec![
            ToolInvocationState::Pending,
            ToolInvocationState::Called,
            ToolInvocationState::Completed
        ]
    );
    let completed_at = events
        .iter()
        .position(|e| {
            matches!(e, ChatStreamEvent::ToolInvocation { tool_invocation }
                if tool_invocation.state == ToolInvocationState::Completed)
        })
        .unwrap();
    let first_text_at = events
        .iter()
        .position(|e| matches!(e, ChatStreamEvent::TextDelta { .. }))
        .unwrap();
    assert!(completed_at < first_text_at);

    let source = events
        .iter()
        .find_map(|e| match e {
            ChatStreamEvent::Source { source } => Some(source.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(source.url, "https://example.com/1");
    assert_eq!(source.provider.as_deref(), Some("test-engine"));

    let stored = h.conversations.fetch_one(chat_id, h.user).await.unwrap();
    let assistant = &stored.messages[1].message;
    match &assistant.parts[0] {
        Part::ToolInvocation { tool_invocation } => {
            assert_eq!(tool_invocation.state, ToolInvocationState::Completed);
            assert_eq!(tool_invocation.args, json!({"query": "rust"}));
            assert_eq!(
                tool_invocation.result.as_ref().unwrap(),
                &vec![search_result(1), search_result(2)]
            );
        }
        other => panic!("expected tool invocation, got {other:?}"),
    }
    assert_eq!(assistant.text(), "Rust is a language");
    assert!(matches!(assistant.parts.last(), Some(Part::Source { .. })));
}

#[tokio::test]
async fn test_engine_receives_system_prompt_tools_and_tool_results() {
    let h = harness();
    h.engine.respond_with(search_call("call_1", "rust")).await;
    h.engine.respond_with(ResponseTemplate::new("Done")).await;

    let turn = h
        .service
        .start_turn(request(&h, None, "What is rust?"), CancellationToken::new())
        .await
        .unwrap();
    let _: Vec<_> = turn.events.collect().await;

    let requests = h.engine.requests().await;
    assert_eq!(requests.len(), 2);

    let first = &requests[0];
    assert_eq!(first.model, "test-model");
    assert_eq!(first.messages[0].role, MessageRole::System);
    assert_eq!(first.messages[0].content.as_deref(), Some(SYSTEM_PROMPT));
    assert_eq!(first.tools.as_ref().unwrap()[0].function.name, "searchWeb");

    let second = &requests[1];
    let tool_message = second.messages.last().unwrap();
    assert_eq!(tool_message.role, MessageRole::Tool);
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    let results: Vec<WebSearchResult> =
        serde_json::from_str(tool_message.content.as_ref().unwrap()).unwrap();
    assert_eq!(results.len(), 2);

    let call_message = &second.messages[second.messages.len() - 2];
    assert_eq!(call_message.role, MessageRole::Assistant);
    assert_eq!(call_message.tool_calls.as_ref().unwrap()[0].id, "call_1");
}

#[tokio::test]
async fn test_step_budget_bounds_engine_calls() {
    let h = harness_with(
        static_search(vec![search_result(1)]),
        settings(3, Duration::from_secs(5)),
    );
    for n in 0..5 {
        h.engine
            .respond_with(search_call(&format!("call_{n}"), "again"))
            .await;
    }

    let turn = h
        .service
        .start_turn(request(&h, None, "Loop forever"), CancellationToken::new())
        .await
        .unwrap();
    let chat_id = turn.chat_id;
    let events: Vec<_> = turn.events.collect().await;

    assert_eq!(h.engine.request_count().await, 3);
    assert_eq!(
        events.last().unwrap(),
        &ChatStreamEvent::Finish {
            reason: FinishReason::StepBudgetExhausted
        }
    );
    let stored = h.conversations.fetch_one(chat_id, h.user).await.unwrap();
    assert_eq!(stored.messages.len(), 2);
}

#[tokio::test]
async fn test_engine_failure_emits_single_generic_error_and_skips_persistence() {
    let h = harness();
    h.engine
        .respond_with(ResponseTemplate::new("partial answer that breaks").with_error_after(2))
        .await;

    let turn = h
        .service
        .start_turn(request(&h, None, "Hi"), CancellationToken::new())
        .await
        .unwrap();
    let chat_id = turn.chat_id;
    let events: Vec<_> = turn.events.collect().await;

    let errors: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ChatStreamEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        events.last().unwrap(),
        &ChatStreamEvent::Error {
            message: GENERIC_ERROR_MESSAGE.to_string()
        }
    );
    assert!(!events
        .iter()
        .any(|e| matches!(e, ChatStreamEvent::Finish { .. })));

    // Seeded transcript only
    assert_eq!(
        h.repo.messages_of(chat_id).await.unwrap(),
        vec![Message::user_text("Hi")]
    );
}

#[tokio::test]
async fn test_engine_refusing_request_is_an_in_band_error() {
    let h = harness();
    h.engine
        .fail_with(CompletionError::HttpError {
            status_code: 500,
            message: "boom".into(),
        })
        .await;

    let turn = h
        .service
        .start_turn(request(&h, None, "Hi"), CancellationToken::new())
        .await
        .unwrap();
    let events: Vec<_> = turn.events.collect().await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ChatStreamEvent::ChatCreated { .. }));
    assert!(matches!(events[1], ChatStreamEvent::Error { .. }));
}

#[tokio::test]
async fn test_failed_search_aborts_turn_with_error() {
    let mut provider = MockWebSearchProviderTrait::new();
    provider.expect_search().returning(|_, _| {
        Err(WebSearchError::WebSearchRequestFailed(
            "upstream down".into(),
        ))
    });
    let h = harness_with(Arc::new(provider), settings(10, Duration::from_secs(5)));
    h.engine.respond_with(search_call("call_1", "rust")).await;

    let turn = h
        .service
        .start_turn(request(&h, None, "Search"), CancellationToken::new())
        .await
        .unwrap();
    let chat_id = turn.chat_id;
    let events: Vec<_> = turn.events.collect().await;

    assert!(matches!(events.last(), Some(ChatStreamEvent::Error { .. })));
    assert_eq!(h.engine.request_count().await, 1);
    assert_eq!(h.repo.messages_of(chat_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_tool_aborts_turn() {
    let h = harness();
    h.engine
        .respond_with(ResponseTemplate::empty().with_tool_call(
            "call_1",
            "deleteEverything",
            json!({}),
        ))
        .await;

    let turn = h
        .service
        .start_turn(request(&h, None, "Hi"), CancellationToken::new())
        .await
        .unwrap();
    let events: Vec<_> = turn.events.collect().await;
    assert!(matches!(events.last(), Some(ChatStreamEvent::Error { .. })));
}

#[tokio::test]
async fn test_cancellation_during_search_ends_stream_silently() {
    let h = harness_with(Arc::new(SlowSearch), settings(10, Duration::from_secs(60)));
    h.engine.respond_with(search_call("call_1", "slow")).await;

    let cancel = CancellationToken::new();
    let mut turn = h
        .service
        .start_turn(request(&h, None, "Hi"), cancel.clone())
        .await
        .unwrap();
    let chat_id = turn.chat_id;

    // Wait until the tool is running
    while let Some(event) = turn.events.next().await {
        if let ChatStreamEvent::ToolInvocation { tool_invocation } = &event {
            if tool_invocation.state == ToolInvocationState::Called {
                break;
            }
        }
    }
    cancel.cancel();

    let rest = tokio::time::timeout(Duration::from_secs(5), turn.events.collect::<Vec<_>>())
        .await
        .expect("stream should close after cancellation");
    assert!(rest.is_empty());
    assert_eq!(h.engine.request_count().await, 1);
    assert_eq!(
        h.repo.messages_of(chat_id).await.unwrap(),
        vec![Message::user_text("Hi")]
    );
}

#[tokio::test]
async fn test_dropped_receiver_aborts_without_persisting() {
    let h = harness();
    h.engine
        .respond_with(
            ResponseTemplate::new("one two three four five six")
                .with_chunk_delay(Duration::from_millis(20)),
        )
        .await;

    let mut turn = h
        .service
        .start_turn(request(&h, None, "Hi"), CancellationToken::new())
        .await
        .unwrap();
    let chat_id = turn.chat_id;
    let first = turn.events.next().await.unwrap();
    assert!(matches!(first, ChatStreamEvent::ChatCreated { .. }));
    drop(turn.events);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        h.repo.messages_of(chat_id).await.unwrap(),
        vec![Message::user_text("Hi")]
    );
}

#[tokio::test]
async fn test_stalled_engine_times_out_with_error() {
    let h = harness_with(
        static_search(vec![]),
        settings(10, Duration::from_millis(200)),
    );
    h.engine
        .respond_with(ResponseTemplate::new("never ends").with_stall_after(1))
        .await;

    let turn = h
        .service
        .start_turn(request(&h, None, "Hi"), CancellationToken::new())
        .await
        .unwrap();
    let chat_id = turn.chat_id;
    let events = tokio::time::timeout(Duration::from_secs(5), turn.events.collect::<Vec<_>>())
        .await
        .expect("turn should hit its deadline");

    assert_eq!(
        events.last().unwrap(),
        &ChatStreamEvent::Error {
            message: GENERIC_ERROR_MESSAGE.to_string()
        }
    );
    assert_eq!(h.repo.messages_of(chat_id).await.unwrap().len(), 1);
}

/// Delegates to the in-memory store but takes its time committing a turn
struct SlowWrites {
    inner: Arc<InMemoryConversationRepository>,
    delay: Duration,
}

#[async_trait]
impl ConversationRepository for SlowWrites {
    async fn create(
        &self,
        id: ConversationId,
        owner: UserId,
        title: String,
        messages: Vec<Message>,
    ) -> Result<Conversation, RepositoryError> {
        self.inner.create(id, owner, title, messages).await
    }

    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        self.inner.get_conversation(id).await
    }

    async fn replace_all(
        &self,
        id: ConversationId,
        owner: UserId,
        title: String,
        messages: Vec<Message>,
    ) -> Result<ReplaceOutcome, RepositoryError> {
        tokio::time::sleep(self.delay).await;
        self.inner.replace_all(id, owner, title, messages).await
    }

    async fn get_with_messages(
        &self,
        id: ConversationId,
        owner: UserId,
    ) -> Result<Option<ConversationWithMessages>, RepositoryError> {
        self.inner.get_with_messages(id, owner).await
    }

    async fn list_by_user(&self, owner: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        self.inner.list_by_user(owner).await
    }
}

#[tokio::test]
async fn test_slow_commit_is_not_cut_off_by_request_timeout() {
    let repo = Arc::new(InMemoryConversationRepository::default());
    let conversations = Arc::new(ConversationServiceImpl::new(Arc::new(SlowWrites {
        inner: repo.clone(),
        delay: Duration::from_millis(300),
    })));
    let engine = MockProvider::new();
    engine.respond_with(ResponseTemplate::new("Quick answer")).await;
    let service = ChatServiceImpl::new(
        conversations,
        Arc::new(engine.clone()),
        Arc::new(WebSearchTool::new(static_search(vec![]), 10)),
        settings(10, Duration::from_millis(100)),
    );
    let user = UserId(uuid::Uuid::new_v4());

    let turn = service
        .start_turn(
            ChatTurnRequest {
                user_id: user,
                chat_id: None,
                messages: vec![Message::user_text("Hi")],
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();
    let chat_id = turn.chat_id;
    let events = tokio::time::timeout(Duration::from_secs(5), turn.events.collect::<Vec<_>>())
        .await
        .expect("turn should finish once the write lands");

    assert_eq!(
        events.last().unwrap(),
        &ChatStreamEvent::Finish {
            reason: FinishReason::Stop
        }
    );
    let stored = repo.messages_of(chat_id).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].text(), "Quick answer");
}
