//! Applies migrations, then every `.sql` file in `crates/database/src/seed`
//! in file name order. The bundled seed creates a local development user.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use database::Database;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .compact()
        .with_target(false)
        .init();

    let db_config = config::DatabaseConfig::from_env()
        .map_err(|e| anyhow!("Failed to load database config: {e}"))?;
    let database = Database::from_config(&db_config)
        .await
        .context("Failed to connect to database")?;

    database
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let seed_files = seed_files(Path::new("crates/database/src/seed"))?;
    if seed_files.is_empty() {
        info!("No seed files found");
        return Ok(());
    }

    let client = database
        .pool()
        .get()
        .await
        .context("Failed to get database connection")?;

    for seed_file in seed_files {
        let sql = fs::read_to_string(&seed_file)
            .with_context(|| format!("Failed to read seed file: {}", seed_file.display()))?;
        client
            .batch_execute(&sql)
            .await
            .with_context(|| format!("Failed to execute seed script: {}", seed_file.display()))?;
        info!(file = %seed_file.display(), "Executed seed script");
    }

    database.close();
    info!("Database seeding completed");
    Ok(())
}

fn seed_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(anyhow!("Seed directory not found: {}", dir.display()));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .context("Failed to read seed directory")?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    files.sort();
    Ok(files)
}
