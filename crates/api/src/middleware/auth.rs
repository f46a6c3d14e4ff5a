use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use services::auth::{IdentityResolver, SessionToken, User};
use std::sync::Arc;
use tracing::{debug, error};

use crate::models::ErrorResponse;

/// Authenticated user information passed to route handlers
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub User);

#[derive(Clone)]
pub struct AuthState {
    pub identity_resolver: Arc<dyn IdentityResolver>,
}

impl AuthState {
    pub fn new(identity_resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { identity_resolver }
    }
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new(
            message.to_string(),
            "unauthorized".to_string(),
        )),
    )
}

/// Resolves `Authorization: Bearer <token>` to a user, or rejects with 401
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let Some(auth_value) = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
    else {
        return Err(unauthorized("Missing authorization"));
    };

    let Some(token) = auth_value.strip_prefix("Bearer ") else {
        debug!("Authorization header does not start with 'Bearer '");
        return Err(unauthorized(
            "Authorization header does not start with 'Bearer '",
        ));
    };

    let user = state
        .identity_resolver
        .resolve(&SessionToken(token.trim().to_string()))
        .await
        .map_err(|e| {
            error!(error = %e, "Identity resolution failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(
                    "Failed to authenticate request".to_string(),
                    "internal_error".to_string(),
                )),
            )
        })?;

    let Some(user) = user else {
        debug!("Bearer token did not resolve to a user");
        return Err(unauthorized("Invalid or expired session"));
    };

    debug!(user_id = %user.id, "Authenticated request");
    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}
