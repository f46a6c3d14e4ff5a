use crate::models::*;
use crate::routes::health::HealthResponse;
use services::conversations::{Message, Part, Role, SourcePart, ToolInvocation, ToolInvocationState};
use services::tools::WebSearchResult;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Search Chat API",
        description = "Conversational API whose assistant answers from live web search results.\n\nAuthenticate with `Authorization: Bearer <session token>`.",
        version = "1.0.0"
    ),
    paths(
        crate::routes::chat::chat,
        crate::routes::conversations::list_chats,
        crate::routes::conversations::get_chat,
        crate::routes::health::health_check,
    ),
    components(
        schemas(
            ChatRequest, ChatRequestMessage, ConversationSummary, ConversationListResponse,
            ConversationDetail, ErrorResponse, ErrorDetail, HealthResponse,
            Message, Part, Role, ToolInvocation, ToolInvocationState, SourcePart, WebSearchResult,
        ),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_token",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}
