use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::RepositoryError;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

// Domain ID types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub Uuid);

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        UserId(uuid)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionToken(pub String);

/// Owned by the identity collaborator; the chat core only reads it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// Admins are exempt from the daily quota
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Internal error: {0}")]
    InternalError(String),
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
}

#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Owner of an unexpired session whose token hashes to `token_hash`
    async fn find_user_by_token_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, RepositoryError>;
}

/// Maps request credentials to a user, or to nobody.
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &SessionToken) -> Result<Option<User>, AuthError>;
}
