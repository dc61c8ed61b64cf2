use nook_types::MutationId;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The mutation was already reconciled, rolled back, or expired.
    #[error("mutation {0} is not pending")]
    UnknownMutation(MutationId),

    #[error("configuration error: {0}")]
    Config(String),
}
