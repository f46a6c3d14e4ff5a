pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;

use crate::{
    middleware::{auth_middleware, AuthState},
    openapi::ApiDoc,
    routes::{
        chat::{chat, ChatAppState},
        conversations::{get_chat, list_chats},
        health::health_check,
    },
};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use database::Database;
use inference_providers::{InferenceProvider, OpenAiCompatibleConfig, OpenAiCompatibleProvider};
use services::{
    auth::{IdentityResolver, MockIdentityResolver, SessionIdentityResolver, SessionRepository, UserRepository},
    chat::{ChatServiceImpl, ChatServiceTrait, ChatSettings},
    conversations::{ConversationRepository, ConversationServiceImpl, ConversationServiceTrait},
    quota::{QuotaGate, QuotaServiceImpl, UsageRepository},
    tools::{SerperWebSearchProvider, WebSearchTool},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct DomainServices {
    pub chat_service: Arc<dyn ChatServiceTrait>,
    pub conversation_service: Arc<dyn ConversationServiceTrait>,
    pub quota: Arc<dyn QuotaGate>,
}

/// Connect to the database and run migrations. Start-up aborts on failure.
pub async fn init_database(db_config: &config::DatabaseConfig) -> Arc<Database> {
    let database = Arc::new(
        Database::from_config(db_config)
            .await
            .expect("Failed to connect to database"),
    );

    tracing::info!("Starting database migrations...");
    database
        .run_migrations()
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations completed");

    database
}

/// Pick the identity resolver: sessions table, or user-id-as-token when mocking
pub fn init_auth_state(
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    auth: &config::AuthConfig,
) -> AuthState {
    let resolver: Arc<dyn IdentityResolver> = if auth.mock {
        tracing::warn!("Mock authentication enabled: bearer tokens are treated as user ids");
        Arc::new(MockIdentityResolver::new(users))
    } else {
        Arc::new(SessionIdentityResolver::new(sessions, users))
    };
    AuthState::new(resolver)
}

pub fn init_inference_provider(
    config: &config::InferenceConfig,
) -> anyhow::Result<Arc<dyn InferenceProvider>> {
    let provider = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig::new(
        config.base_url.clone(),
        config.api_key.clone(),
        Some(config.timeout_seconds),
    ))?;
    tracing::info!(
        base_url = %config.base_url,
        model = %config.model,
        "Inference provider configured"
    );
    Ok(Arc::new(provider))
}

pub fn init_web_search(config: &config::SearchConfig) -> anyhow::Result<Arc<WebSearchTool>> {
    let provider = SerperWebSearchProvider::new(config)?;
    Ok(Arc::new(WebSearchTool::new(
        Arc::new(provider),
        config.result_count,
    )))
}

/// Wire the domain services over whichever storage implementations are given
pub fn init_domain_services(
    conversation_repository: Arc<dyn ConversationRepository>,
    usage_repository: Arc<dyn UsageRepository>,
    engine: Arc<dyn InferenceProvider>,
    web_search: Arc<WebSearchTool>,
    inference: &config::InferenceConfig,
    chat: &config::ChatConfig,
    quota: &config::QuotaConfig,
) -> DomainServices {
    let conversation_service: Arc<dyn ConversationServiceTrait> =
        Arc::new(ConversationServiceImpl::new(conversation_repository));

    let chat_service = Arc::new(ChatServiceImpl::new(
        conversation_service.clone(),
        engine,
        web_search,
        ChatSettings::from_config(inference, chat),
    ));

    let quota = Arc::new(QuotaServiceImpl::new(
        usage_repository,
        quota.daily_request_limit,
    ));

    DomainServices {
        chat_service,
        conversation_service,
        quota,
    }
}

/// Build the complete application router
pub fn build_app(auth_state: AuthState, services: DomainServices) -> Router {
    let chat_routes = Router::new()
        .route("/chat", post(chat))
        .with_state(ChatAppState {
            chat_service: services.chat_service,
            quota: services.quota,
        });

    let conversation_routes = Router::new()
        .route("/chats", get(list_chats))
        .route("/chats/{chat_id}", get(get_chat))
        .with_state(services.conversation_service);

    let protected = chat_routes
        .merge(conversation_routes)
        .layer(from_fn_with_state(auth_state, auth_middleware));

    Router::new()
        .merge(protected)
        .route("/health", get(health_check))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .layer(TraceLayer::new_for_http())
}
