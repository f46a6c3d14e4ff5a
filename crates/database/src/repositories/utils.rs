use anyhow::Context;
use services::common::RepositoryError;
use tokio_postgres::error::SqlState;

use crate::pool::DbPool;

/// Convert tokio_postgres::Error to RepositoryError
pub fn map_db_error(err: tokio_postgres::Error) -> RepositoryError {
    if err.is_closed() {
        return RepositoryError::ConnectionFailed("Connection closed".to_string());
    }

    let Some(db_err) = err.as_db_error() else {
        return RepositoryError::DatabaseError(err.into());
    };
    let message = db_err.message();

    match db_err.code() {
        &SqlState::UNIQUE_VIOLATION => RepositoryError::AlreadyExists,
        &SqlState::FOREIGN_KEY_VIOLATION => {
            RepositoryError::ForeignKeyViolation(message.to_string())
        }
        &SqlState::NOT_NULL_VIOLATION => RepositoryError::RequiredFieldMissing(message.to_string()),
        &SqlState::CHECK_VIOLATION => RepositoryError::ValidationFailed(message.to_string()),

        &SqlState::T_R_SERIALIZATION_FAILURE | &SqlState::T_R_DEADLOCK_DETECTED => {
            RepositoryError::TransactionConflict
        }

        &SqlState::INVALID_PASSWORD | &SqlState::INVALID_AUTHORIZATION_SPECIFICATION => {
            RepositoryError::AuthenticationFailed
        }
        &SqlState::CONNECTION_EXCEPTION
        | &SqlState::CONNECTION_DOES_NOT_EXIST
        | &SqlState::CONNECTION_FAILURE => RepositoryError::ConnectionFailed(message.to_string()),

        _ => RepositoryError::DatabaseError(anyhow::anyhow!(
            "Database error ({}): {}",
            db_err.code().code(),
            message
        )),
    }
}

pub(crate) async fn get_client(
    pool: &DbPool,
) -> Result<deadpool_postgres::Object, RepositoryError> {
    pool.get()
        .await
        .context("Failed to get database connection")
        .map_err(RepositoryError::PoolError)
}
