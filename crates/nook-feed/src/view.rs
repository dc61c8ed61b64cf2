use nook_ledger::{MutationKind, PendingMutation};
use nook_types::{Post, UserId};
use serde::Serialize;

/// A post as the presentation layer renders it.
///
/// `post` already carries pending mutations. The `*_pending` flags mark
/// controls whose action is still in flight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PostView {
    pub post: Post,
    pub like_count: usize,
    pub comment_count: usize,
    pub liked_by_viewer: bool,
    pub like_pending: bool,
    pub comment_pending: bool,
    /// Body shortened to the configured preview length.
    pub preview: String,
    pub is_truncated: bool,
}

impl PostView {
    pub(crate) fn build<'a>(
        post: Post,
        viewer: &UserId,
        pending: impl IntoIterator<Item = &'a PendingMutation>,
        preview_chars: usize,
    ) -> Self {
        let mut like_pending = false;
        let mut comment_pending = false;
        for mutation in pending {
            match &mutation.kind {
                MutationKind::Like(user) | MutationKind::Unlike(user) => {
                    like_pending |= user == viewer;
                }
                MutationKind::AddComment(_) => comment_pending = true,
            }
        }

        let (preview, is_truncated) = preview(&post.body, preview_chars);
        Self {
            like_count: post.likes.len(),
            comment_count: post.comments.len(),
            liked_by_viewer: post.likes.contains(viewer),
            like_pending,
            comment_pending,
            preview,
            is_truncated,
            post,
        }
    }
}

/// Cut `body` after `limit` characters and mark the cut with an ellipsis.
fn preview(body: &str, limit: usize) -> (String, bool) {
    match body.char_indices().nth(limit) {
        Some((cut, _)) => (format!("{}...", &body[..cut]), true),
        None => (body.to_string(), false),
    }
}
