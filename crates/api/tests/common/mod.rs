#![allow(dead_code)]

use api::{build_app, init_auth_state, init_domain_services, DomainServices};
use async_trait::async_trait;
use chrono::Utc;
use inference_providers::mock::MockProvider;
use services::{
    auth::{hash_session_token, User, UserId},
    test_utils::{
        InMemoryConversationRepository, InMemorySessionRepository, InMemoryUsageRepository,
        InMemoryUserRepository,
    },
    tools::{WebSearchError, WebSearchProviderTrait, WebSearchResult, WebSearchTool},
};
use std::sync::Arc;

pub const SESSION_TOKEN: &str = "test-session-token";
pub const DAILY_LIMIT: i64 = 3;

/// Always answers with the same two results
pub struct StaticSearch;

#[async_trait]
impl WebSearchProviderTrait for StaticSearch {
    async fn search(
        &self,
        query: String,
        count: usize,
    ) -> Result<Vec<WebSearchResult>, WebSearchError> {
        Ok((1..=2)
            .take(count)
            .map(|n| WebSearchResult {
                title: format!("{query} result {n}"),
                link: format!("https://example.com/{n}"),
                snippet: format!("Snippet {n}"),
            })
            .collect())
    }
}

pub struct TestContext {
    pub server: axum_test::TestServer,
    /// The same services the router runs on, for driving handlers directly
    pub services: DomainServices,
    pub engine: MockProvider,
    pub users: Arc<InMemoryUserRepository>,
    pub sessions: Arc<InMemorySessionRepository>,
    pub usage: Arc<InMemoryUsageRepository>,
    pub conversations: Arc<InMemoryConversationRepository>,
    /// Owner of `SESSION_TOKEN`
    pub user: User,
}

impl TestContext {
    /// Create another user with its own session token
    pub async fn add_user(&self, token: &str, is_admin: bool) -> User {
        let user = test_user(is_admin);
        self.users.insert(user.clone()).await;
        self.sessions
            .insert(
                hash_session_token(token),
                user.id,
                Utc::now() + chrono::Duration::hours(1),
            )
            .await;
        user
    }
}

pub fn test_user(is_admin: bool) -> User {
    User {
        id: UserId(uuid::Uuid::new_v4()),
        email: format!("{}@example.com", uuid::Uuid::new_v4().simple()),
        is_admin,
        created_at: Utc::now(),
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Setup a test server over in-memory storage and a scripted engine
pub async fn setup_test_server() -> TestContext {
    setup_test_server_with_search(Arc::new(StaticSearch)).await
}

pub async fn setup_test_server_with_search(search: Arc<dyn WebSearchProviderTrait>) -> TestContext {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::level_filters::LevelFilter::DEBUG)
        .try_init();

    let users = Arc::new(InMemoryUserRepository::default());
    let sessions = Arc::new(InMemorySessionRepository::default());
    let usage = Arc::new(InMemoryUsageRepository::default());
    let conversations = Arc::new(InMemoryConversationRepository::default());
    let engine = MockProvider::new();

    let user = test_user(false);
    users.insert(user.clone()).await;
    sessions
        .insert(
            hash_session_token(SESSION_TOKEN),
            user.id,
            Utc::now() + chrono::Duration::hours(1),
        )
        .await;

    let inference = config::InferenceConfig {
        base_url: "http://localhost:0/v1".to_string(),
        api_key: None,
        model: "test-model".to_string(),
        provider_name: "test-engine".to_string(),
        timeout_seconds: 5,
    };
    let chat = config::ChatConfig {
        step_budget: 5,
        request_timeout_seconds: 5,
    };
    let quota = config::QuotaConfig {
        daily_request_limit: DAILY_LIMIT,
    };

    let auth_state = init_auth_state(
        users.clone(),
        sessions.clone(),
        &config::AuthConfig { mock: false },
    );
    let domain_services = init_domain_services(
        conversations.clone(),
        usage.clone(),
        Arc::new(engine.clone()),
        Arc::new(WebSearchTool::new(search, 10)),
        &inference,
        &chat,
        &quota,
    );

    let app = build_app(auth_state, domain_services.clone());
    TestContext {
        server: axum_test::TestServer::new(app).unwrap(),
        services: domain_services,
        engine,
        users,
        sessions,
        usage,
        conversations,
        user,
    }
}

/// Parse SSE format: "event: <type>\ndata: <json>\n\n"
pub fn parse_sse(body: &str) -> Vec<(String, serde_json::Value)> {
    let mut events = Vec::new();
    for chunk in body.split("\n\n") {
        if chunk.trim().is_empty() {
            continue;
        }

        let mut event_type = "";
        let mut event_data = "";
        for line in chunk.lines() {
            if let Some(name) = line.strip_prefix("event: ") {
                event_type = name;
            } else if let Some(data) = line.strip_prefix("data: ") {
                event_data = data;
            }
        }

        if event_data.is_empty() {
            continue;
        }
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(event_data) {
            events.push((event_type.to_string(), json));
        }
    }
    events
}

pub fn event_types(events: &[(String, serde_json::Value)]) -> Vec<&str> {
    events.iter().map(|(name, _)| name.as_str()).collect()
}
