use nook_types::PostId;
use serde::{Deserialize, Serialize};

/// A user action issued by the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedIntent {
    /// Pull-to-refresh: re-query from the top with the current filter.
    Refresh,
    /// Scrolled to the end: continue from the held cursor.
    LoadMore,
    Like(PostId),
    Unlike(PostId),
    Comment(PostId, String),
}
