use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier {0:?}: must be non-empty and contain no '/'")]
    InvalidId(String),

    #[error("unknown visibility: {0}")]
    UnknownVisibility(String),
}
