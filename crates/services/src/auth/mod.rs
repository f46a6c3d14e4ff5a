pub mod ports;

pub use ports::*;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Session tokens are stored hashed; only the bearer ever sees the raw value.
pub fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolves bearer tokens through the sessions table.
pub struct SessionIdentityResolver {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
}

impl SessionIdentityResolver {
    pub fn new(sessions: Arc<dyn SessionRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { sessions, users }
    }
}

#[async_trait]
impl IdentityResolver for SessionIdentityResolver {
    async fn resolve(&self, token: &SessionToken) -> Result<Option<User>, AuthError> {
        let token_hash = hash_session_token(&token.0);
        let user_id = self
            .sessions
            .find_user_by_token_hash(&token_hash, Utc::now())
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to validate session: {e}")))?;

        let Some(user_id) = user_id else {
            debug!("No active session for presented token");
            return Ok(None);
        };

        self.users
            .get_by_id(user_id)
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to load user: {e}")))
    }
}

/// Development resolver: the bearer token is the user id itself.
/// The user must still exist.
pub struct MockIdentityResolver {
    users: Arc<dyn UserRepository>,
}

impl MockIdentityResolver {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl IdentityResolver for MockIdentityResolver {
    async fn resolve(&self, token: &SessionToken) -> Result<Option<User>, AuthError> {
        let Ok(uuid) = Uuid::parse_str(token.0.trim()) else {
            debug!("Mock auth token is not a user id");
            return Ok(None);
        };

        self.users
            .get_by_id(UserId(uuid))
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to load user: {e}")))
    }
}
