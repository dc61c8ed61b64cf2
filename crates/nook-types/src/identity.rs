use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Prefix carried by comment identities minted on the device before the
/// backend has seen them.
const LOCAL_PREFIX: &str = "local-";

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a backend-issued identifier without validation.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Parse a user-supplied identifier.
            ///
            /// Document identifiers are path segments on the backend, so
            /// they must be non-empty and free of `/`.
            pub fn parse(s: &str) -> Result<Self, TypeError> {
                let trimmed = s.trim();
                if trimmed.is_empty() || trimmed.contains('/') {
                    return Err(TypeError::InvalidId(s.to_string()));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// The raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

document_id!(
    /// Identity of a post document.
    PostId,
    "PostId"
);

document_id!(
    /// Identity of a user account.
    UserId,
    "UserId"
);

document_id!(
    /// Identity of a comment embedded in a post.
    CommentId,
    "CommentId"
);

impl CommentId {
    /// Mint a temporary identity for a comment drafted on this device.
    ///
    /// Uses UUID v7 so local drafts sort by creation time.
    pub fn local() -> Self {
        Self(format!("{LOCAL_PREFIX}{}", uuid::Uuid::now_v7()))
    }

    /// Mint an identity for a comment as the backend would store it.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Returns `true` if this identity was minted locally and has not been
    /// replaced by a backend identity.
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_PREFIX)
    }
}

/// Local sequence number of an optimistic mutation.
///
/// Issued by the mutation ledger in strictly increasing order; never sent to
/// the backend.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MutationId(u64);

impl MutationId {
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub fn seq(&self) -> u64 {
        self.0
    }

    /// The identity issued after this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MutationId({})", self.0)
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m#{}", self.0)
    }
}
