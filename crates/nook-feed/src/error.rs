use nook_ledger::PendingMutation;
use nook_store::StoreError;
use nook_types::{MutationId, PostId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The store could not be reached or timed out. Any mutation tied to the
    /// request has been rolled back.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The pagination session has no further results.
    #[error("no more posts")]
    ExhaustedCursor,

    #[error("mutation {mutation} on post {post} was not confirmed in time")]
    StaleMutationTimeout { mutation: MutationId, post: PostId },

    /// The post was deleted on the backend and has been dropped locally.
    #[error("post not found: {0}")]
    NotFound(PostId),

    /// A newer list request started before this response arrived; the
    /// response was discarded.
    #[error("response superseded by a newer request")]
    Superseded,

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FeedError {
    /// Returns `true` if repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }
}

impl From<StoreError> for FeedError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { id, .. } => Self::NotFound(PostId::new(id)),
            e if e.is_transient() => Self::NetworkFailure(e.to_string()),
            e => Self::Corrupt(e.to_string()),
        }
    }
}

impl From<nook_ledger::LedgerError> for FeedError {
    fn from(e: nook_ledger::LedgerError) -> Self {
        Self::Config(e.to_string())
    }
}

/// A mutation that was dropped without confirmation, for surfacing as a toast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationFailure {
    pub mutation: PendingMutation,
    pub error: FeedError,
}

impl MutationFailure {
    pub fn expired(mutation: PendingMutation) -> Self {
        let error = FeedError::StaleMutationTimeout {
            mutation: mutation.id,
            post: mutation.post_id.clone(),
        };
        Self { mutation, error }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
