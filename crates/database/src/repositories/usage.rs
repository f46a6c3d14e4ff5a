use crate::retry_db;
use crate::{
    pool::DbPool,
    repositories::utils::{get_client, map_db_error},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use services::auth::UserId;
use services::common::RepositoryError;
use services::quota::UsageRepository;

pub struct PgUsageRepository {
    pool: DbPool,
}

impl PgUsageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PgUsageRepository {
    async fn count_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let row = retry_db!("count_usage_records", {
            let client = get_client(&self.pool).await?;
            client
                .query_one(
                    r#"
                    SELECT COUNT(*) FROM usage_records
                    WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
                    "#,
                    &[&user_id.0, &start, &end],
                )
                .await
                .map_err(map_db_error)
        })?;

        row.try_get(0)
            .map_err(|e| RepositoryError::DataConversionError(e.into()))
    }

    async fn record(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        // Not retried: a lost acknowledgement would count the request twice
        let client = get_client(&self.pool).await?;
        client
            .execute(
                "INSERT INTO usage_records (user_id, created_at) VALUES ($1, $2)",
                &[&user_id.0, &at],
            )
            .await
            .map_err(map_db_error)?;
        Ok(())
    }
}
