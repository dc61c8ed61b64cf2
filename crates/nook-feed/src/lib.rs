//! Feed assembler for Nook.
//!
//! Produces the ordered, de-duplicated list of posts shown to the user,
//! spanning every page fetched so far and reflecting pending likes and
//! comments. This is the main entry point for a presentation layer: it
//! accepts [`FeedIntent`]s and hands back render-ready [`PostView`]s.

pub mod assembler;
pub mod config;
pub mod error;
pub mod intent;
pub mod page;
pub mod view;

pub use assembler::FeedAssembler;
pub use config::FeedConfig;
pub use error::{FeedError, FeedResult, MutationFailure};
pub use intent::FeedIntent;
pub use page::{FeedCursor, FeedFilter, FeedPage};
pub use view::PostView;

// Re-export key types
pub use nook_ledger::{CommentDraft, LedgerConfig, PendingMutation};
pub use nook_types::{AuthorSnapshot, CommentId, Post, PostId, UserId, Visibility};
