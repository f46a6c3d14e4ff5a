pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, DbPool};
pub use repositories::{
    PgConversationRepository, PgSessionRepository, PgUsageRepository, PgUserRepository,
};

use anyhow::Result;
use std::sync::Arc;

/// Postgres-backed implementations of every storage port
pub struct Database {
    pub conversations: Arc<PgConversationRepository>,
    pub usage: Arc<PgUsageRepository>,
    pub users: Arc<PgUserRepository>,
    pub sessions: Arc<PgSessionRepository>,
    pool: DbPool,
}

impl Database {
    pub fn new(pool: DbPool) -> Self {
        Self {
            conversations: Arc::new(PgConversationRepository::new(pool.clone())),
            usage: Arc::new(PgUsageRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            pool,
        }
    }

    pub async fn from_config(config: &config::DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Stop handing out connections; used during shutdown
    pub fn close(&self) {
        self.pool.close();
    }
}
