use crate::retry_db;
use crate::{
    pool::DbPool,
    repositories::utils::{get_client, map_db_error},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use services::auth::{SessionRepository, UserId};
use services::common::RepositoryError;
use uuid::Uuid;

/// Session lookups by token hash; raw tokens never reach the database
pub struct PgSessionRepository {
    pool: DbPool,
}

impl PgSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn find_user_by_token_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, RepositoryError> {
        let row = retry_db!("find_session_by_token_hash", {
            let client = get_client(&self.pool).await?;
            client
                .query_opt(
                    "SELECT user_id FROM sessions WHERE token_hash = $1 AND expires_at > $2",
                    &[&token_hash, &now],
                )
                .await
                .map_err(map_db_error)
        })?;

        Ok(row.map(|row| UserId(row.get::<_, Uuid>(0))))
    }
}
