use crate::retry_db;
use crate::{
    pool::DbPool,
    repositories::utils::{get_client, map_db_error},
};
use async_trait::async_trait;
use services::auth::{User, UserId, UserRepository};
use services::common::RepositoryError;
use uuid::Uuid;

pub struct PgUserRepository {
    pool: DbPool,
}

impl PgUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = retry_db!("get_user_by_id", {
            let client = get_client(&self.pool).await?;
            client
                .query_opt(
                    "SELECT id, email, is_admin, created_at FROM users WHERE id = $1",
                    &[&id.0],
                )
                .await
                .map_err(map_db_error)
        })?;

        let Some(row) = row else {
            return Ok(None);
        };
        let user_id: Uuid = row.get("id");
        Ok(Some(User {
            id: UserId(user_id),
            email: row.get("email"),
            is_admin: row.get("is_admin"),
            created_at: row.get("created_at"),
        }))
    }
}
