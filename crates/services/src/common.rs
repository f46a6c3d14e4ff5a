/// Shared error types for repository operations across all domains.
/// These errors represent infrastructure concerns (database, connections, etc.)
/// rather than domain-specific business logic.
#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("'{0}' does not exist")]
    NotFound(String),
    #[error("Cannot add this resource as it already exists")]
    AlreadyExists,
    #[error("Required field is missing: {0}")]
    RequiredFieldMissing(String),
    #[error("Referenced entity does not exist: {0}")]
    ForeignKeyViolation(String),
    #[error("Data validation failed: {0}")]
    ValidationFailed(String),
    #[error("Transaction conflict, please retry")]
    TransactionConflict,
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Database authentication failed")]
    AuthenticationFailed,
    #[error("Database connection pool error: {0}")]
    PoolError(#[source] anyhow::Error),
    #[error("Database operation error: {0}")]
    DatabaseError(#[source] anyhow::Error),
    #[error("Data conversion error: {0}")]
    DataConversionError(#[source] anyhow::Error),
}

impl RepositoryError {
    /// Whether retrying the whole operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RepositoryError::TransactionConflict
                | RepositoryError::ConnectionFailed(_)
                | RepositoryError::PoolError(_)
        )
    }
}

/// Truncate to at most `max_chars` characters, appending `...` when text was cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", text[..byte_index].trim_end()),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_is_unchanged() {
        assert_eq!(truncate_with_ellipsis("hello", 50), "hello");
        assert_eq!(truncate_with_ellipsis("  padded  ", 50), "padded");
    }

    #[test]
    fn test_truncate_long_text_gets_ellipsis() {
        let text = "a".repeat(120);
        let title = truncate_with_ellipsis(&text, 100);
        assert_eq!(title.len(), 103);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_truncate_exact_length_has_no_ellipsis() {
        let text = "b".repeat(50);
        assert_eq!(truncate_with_ellipsis(&text, 50), text);
    }

    #[test]
    fn test_truncate_respects_multibyte_characters() {
        let text = "é".repeat(60);
        let title = truncate_with_ellipsis(&text, 50);
        assert_eq!(title.chars().count(), 53);
    }

    #[test]
    fn test_transient_errors() {
        assert!(RepositoryError::TransactionConflict.is_transient());
        assert!(!RepositoryError::NotFound("x".into()).is_transient());
    }
}
