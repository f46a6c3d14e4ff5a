use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::info;

/// Connection pool type alias
pub type DbPool = Pool;

/// Create a connection pool and check that the database answers
pub async fn create_pool(config: &config::DatabaseConfig) -> anyhow::Result<DbPool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.database.clone());
    cfg.user = Some(config.username.clone());
    cfg.password = Some(config.password.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(config.max_connections));

    let pool = cfg
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| anyhow::anyhow!("Failed to create pool: {}", e))?;

    info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        max_connections = config.max_connections,
        "Database connection pool created"
    );

    let client = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))?;
    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| anyhow::anyhow!("Failed to test database connection: {}", e))?;
    info!("Database connection test successful");

    Ok(pool)
}
