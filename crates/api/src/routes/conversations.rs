use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use services::conversations::{ConversationError, ConversationId, ConversationServiceTrait};
use std::sync::Arc;
use tracing::error;

use crate::{
    middleware::AuthenticatedUser,
    models::{ConversationDetail, ConversationListResponse, ErrorResponse},
};

fn map_conversation_error(error: ConversationError) -> Response {
    let (status, message, error_type) = match error {
        ConversationError::NotFoundOrForbidden
        | ConversationError::NotFound
        | ConversationError::Forbidden => (
            StatusCode::NOT_FOUND,
            "Chat not found".to_string(),
            "not_found",
        ),
        ConversationError::InvalidParams(message) => {
            (StatusCode::BAD_REQUEST, message, "invalid_request_error")
        }
        ConversationError::InternalError(message) => {
            error!("Conversation lookup failed: {}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal_error",
            )
        }
    };
    (
        status,
        ResponseJson(ErrorResponse::new(message, error_type.to_string())),
    )
        .into_response()
}

/// List the caller's chats, most recently updated first
#[utoipa::path(
    get,
    path = "/chats",
    tag = "Chats",
    responses(
        (status = 200, description = "Chats owned by the caller", body = ConversationListResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("session_token" = []))
)]
pub async fn list_chats(
    State(conversations): State<Arc<dyn ConversationServiceTrait>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Response {
    match conversations.fetch_all_for_user(user.0.id).await {
        Ok(list) => ResponseJson(ConversationListResponse {
            object: "list".to_string(),
            data: list.into_iter().map(Into::into).collect(),
        })
        .into_response(),
        Err(e) => map_conversation_error(e),
    }
}

/// Fetch one chat with its messages
#[utoipa::path(
    get,
    path = "/chats/{chat_id}",
    tag = "Chats",
    params(("chat_id" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Chat with messages in order", body = ConversationDetail),
        (status = 400, description = "Malformed chat id", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Chat not found", body = ErrorResponse)
    ),
    security(("session_token" = []))
)]
pub async fn get_chat(
    State(conversations): State<Arc<dyn ConversationServiceTrait>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(chat_id): Path<String>,
) -> Response {
    let chat_id = match chat_id.parse::<ConversationId>() {
        Ok(id) => id,
        Err(e) => return map_conversation_error(e),
    };

    match conversations.fetch_one(chat_id, user.0.id).await {
        Ok(conversation) => ResponseJson(ConversationDetail::from(conversation)).into_response(),
        Err(e) => map_conversation_error(e),
    }
}
