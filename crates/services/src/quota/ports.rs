use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::auth::{User, UserId};
use crate::common::RepositoryError;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

/// Outcome of a quota check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Admin users are never counted against the limit
    Exempt,
    Allowed { remaining: i64 },
    LimitExceeded { used: i64, limit: i64 },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, QuotaDecision::LimitExceeded { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Append-only log of chat requests
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Number of records for `user_id` with `start <= created_at < end`
    async fn count_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, RepositoryError>;

    async fn record(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), RepositoryError>;
}

/// Per-user daily request quota.
///
/// `authorize` and `record` are separate calls and are not guarded by a
/// transaction: concurrent requests from one user can each pass `authorize`
/// before any of them records, so the limit is soft under concurrency.
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait QuotaGate: Send + Sync {
    async fn authorize(&self, user: &User) -> Result<QuotaDecision, QuotaError>;

    async fn record(&self, user_id: UserId) -> Result<(), QuotaError>;
}
