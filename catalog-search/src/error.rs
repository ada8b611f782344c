//! Error types for search operations.

use thiserror::Error;

/// Search error type.
#[derive(Error, Debug)]
pub enum SearchError {
    /// A query references an unknown field, uses a field in a way its
    /// mapping does not allow, or asks for an empty page.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// An aggregation targets a non-aggregatable field or reuses a name.
    #[error("Invalid aggregation: {0}")]
    InvalidAggregation(String),

    /// An engine response could not be mapped onto the expected type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The response carries no aggregation with this name.
    #[error("Aggregation not found: {0}")]
    AggregationNotFound(String),

    /// Index already exists.
    #[error("Index already exists: {0}")]
    AlreadyExists(String),

    /// Index not found.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// `from + size` of a search exceeds the index's `max_result_window`.
    #[error("Result window too large: {0}")]
    ResultWindowTooLarge(String),

    /// The engine did not answer within the request timeout.
    #[error("Operation timed out")]
    Timeout,

    /// The engine could not be reached.
    #[error("Search engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A document failed validation before being sent.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bulk operation error.
    #[error("Bulk operation failed: {succeeded} succeeded, {failed} failed")]
    Bulk {
        /// Number of successful operations.
        succeeded: usize,
        /// Number of failed operations.
        failed: usize,
        /// Error details.
        errors: Vec<String>,
    },

    /// Error reported by the engine.
    #[error("Search engine error: {0}")]
    Internal(String),

    /// Client error from the opensearch crate.
    #[error("Client error: {0}")]
    Client(opensearch::Error),
}

impl SearchError {
    /// Whether the failed call may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SearchError::Timeout | SearchError::EngineUnavailable(_))
    }
}

impl From<opensearch::Error> for SearchError {
    fn from(err: opensearch::Error) -> Self {
        if err.is_timeout() {
            SearchError::Timeout
        } else if err.status_code().is_none() {
            SearchError::EngineUnavailable(err.to_string())
        } else {
            SearchError::Client(err)
        }
    }
}

/// Result type alias for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(SearchError::Timeout.is_retryable());
        assert!(SearchError::EngineUnavailable("refused".into()).is_retryable());
        assert!(!SearchError::InvalidQuery("x".into()).is_retryable());
        assert!(!SearchError::AlreadyExists("item".into()).is_retryable());
        assert!(!SearchError::ResultWindowTooLarge("10001".into()).is_retryable());
    }

    #[test]
    fn test_bulk_display() {
        let err = SearchError::Bulk {
            succeeded: 2,
            failed: 1,
            errors: vec!["mapper_parsing_exception".into()],
        };
        assert_eq!(err.to_string(), "Bulk operation failed: 2 succeeded, 1 failed");
    }
}
