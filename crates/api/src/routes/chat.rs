use axum::{
    extract::{rejection::JsonRejection, Extension, Json, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::StreamExt;
use services::{
    chat::{ChatError, ChatServiceTrait, ChatStreamEvent, ChatTurnRequest, GENERIC_ERROR_MESSAGE},
    quota::{QuotaDecision, QuotaGate},
};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    middleware::AuthenticatedUser,
    models::{ChatRequest, ErrorResponse},
};

pub const CHAT_ID_HEADER: HeaderName = HeaderName::from_static("x-chat-id");

#[derive(Clone)]
pub struct ChatAppState {
    pub chat_service: Arc<dyn ChatServiceTrait>,
    pub quota: Arc<dyn QuotaGate>,
}

fn error_response(status: StatusCode, message: String, error_type: &str) -> Response {
    (
        status,
        Json(ErrorResponse::new(message, error_type.to_string())),
    )
        .into_response()
}

fn internal_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
        "internal_error",
    )
}

/// Run one conversational turn
///
/// Checks run in order: request validation, daily quota, usage recording,
/// conversation lookup. Once they pass the response is an SSE stream; any
/// later failure arrives as an in-band `error` event.
#[utoipa::path(
    post,
    path = "/chat",
    tag = "Chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Server-sent events: chat_created, text_delta, tool_invocation, source, then finish or error", content_type = "text/event-stream"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Missing or unknown bearer token", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse),
        (status = 429, description = "Daily request limit reached", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("session_token" = []))
)]
pub async fn chat(
    State(state): State<ChatAppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let user = user.0;

    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!(user_id = %user.id, "Rejected chat body: {}", rejection.body_text());
            return error_response(
                StatusCode::BAD_REQUEST,
                rejection.body_text(),
                "invalid_request_error",
            );
        }
    };
    let request = match request.validate() {
        Ok(request) => request,
        Err(message) => {
            return error_response(StatusCode::BAD_REQUEST, message, "invalid_request_error")
        }
    };

    match state.quota.authorize(&user).await {
        Ok(QuotaDecision::LimitExceeded { used, limit }) => {
            info!(user_id = %user.id, used, limit, "Daily request limit reached");
            return error_response(
                StatusCode::TOO_MANY_REQUESTS,
                format!("Daily limit of {limit} requests reached. Try again tomorrow."),
                "rate_limit_exceeded",
            );
        }
        Ok(decision) => debug!(user_id = %user.id, ?decision, "Quota check passed"),
        Err(e) => {
            error!(user_id = %user.id, error = %e, "Quota check failed");
            return internal_error();
        }
    }

    if let Err(e) = state.quota.record(user.id).await {
        error!(user_id = %user.id, error = %e, "Failed to record usage");
        return internal_error();
    }

    let cancel = CancellationToken::new();
    let turn = state
        .chat_service
        .start_turn(
            ChatTurnRequest {
                user_id: user.id,
                chat_id: request.chat_id,
                messages: request.messages,
            },
            cancel.clone(),
        )
        .await;

    let turn = match turn {
        Ok(turn) => turn,
        Err(ChatError::InvalidParams(message)) => {
            return error_response(StatusCode::BAD_REQUEST, message, "invalid_request_error")
        }
        Err(ChatError::NotFoundOrForbidden) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "Chat not found".to_string(),
                "not_found",
            )
        }
        Err(ChatError::InternalError(message)) => {
            error!(user_id = %user.id, "Failed to start chat turn: {}", message);
            return internal_error();
        }
    };

    // Dropping the body (client went away) cancels the turn
    let guard = cancel.drop_guard();
    let events = turn.events.map(move |event| {
        let _ = &guard;
        Ok::<_, Infallible>(to_sse_event(&event))
    });

    let chat_id = HeaderValue::from_str(&turn.chat_id.to_string())
        .unwrap_or_else(|_| HeaderValue::from_static(""));

    (
        [(CHAT_ID_HEADER, chat_id)],
        Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))),
    )
        .into_response()
}

fn to_sse_event(event: &ChatStreamEvent) -> Event {
    Event::default()
        .event(event.event_type())
        .json_data(event)
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to serialize chat event");
            Event::default()
                .event("error")
                .data(format!(r#"{{"type":"error","message":"{GENERIC_ERROR_MESSAGE}"}}"#))
        })
}

