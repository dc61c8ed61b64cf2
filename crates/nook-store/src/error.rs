use std::time::Duration;

/// Errors from document store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested document does not exist (or was deleted).
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// The backend could not be reached or refused the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend did not answer in time.
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),

    /// The continuation cursor was not issued by this backend or is damaged.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The document exists but cannot be decoded into the expected shape.
    #[error("corrupt document {id}: {reason}")]
    CorruptDocument { id: String, reason: String },
}

impl StoreError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Returns `true` for failures that may succeed if the request is repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
