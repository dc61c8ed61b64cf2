use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nook_types::{AuthorSnapshot, Comment, CommentId, MutationId, Post, PostId, UserId};
use serde::{Deserialize, Serialize};

/// Text and author of a comment the user is about to post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentDraft {
    pub author: AuthorSnapshot,
    pub body: String,
}

impl CommentDraft {
    pub fn new(author: AuthorSnapshot, body: impl Into<String>) -> Self {
        Self {
            author,
            body: body.into(),
        }
    }
}

/// The effect a pending mutation has on its post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    Like(UserId),
    Unlike(UserId),
    /// Carries the draft with its temporary local identity.
    AddComment(Comment),
}

impl MutationKind {
    /// The user whose like state this mutation sets, if it is a reaction.
    pub fn reactor(&self) -> Option<&UserId> {
        match self {
            Self::Like(user) | Self::Unlike(user) => Some(user),
            Self::AddComment(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Like(_) => "like",
            Self::Unlike(_) => "unlike",
            Self::AddComment(_) => "comment",
        }
    }
}

/// A locally applied change that the backend has not yet been seen to
/// reflect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMutation {
    pub id: MutationId,
    pub post_id: PostId,
    pub kind: MutationKind,
    pub recorded_at: DateTime<Utc>,
    /// Set once the backend accepted the write.
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl PendingMutation {
    /// Time elapsed since the mutation was recorded. Zero if `now` is earlier.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.recorded_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Overlay this mutation onto a post.
    pub(crate) fn apply_to(&self, post: &mut Post) {
        match &self.kind {
            MutationKind::Like(user) => {
                post.likes.insert(user.clone());
            }
            MutationKind::Unlike(user) => {
                post.likes.remove(user);
            }
            MutationKind::AddComment(draft) => {
                if !post.has_comment(&draft.id) {
                    post.comments.push(draft.clone());
                }
            }
        }
    }

    /// Whether a fetched snapshot already shows this mutation's effect.
    ///
    /// A draft comment is matched by author, body, and a timestamp within
    /// `window`; a confirmed comment listed in `claimed` was already matched
    /// by an earlier draft and is skipped. On a comment match the confirmed
    /// comment's id is returned in `Some(Some(id))`.
    pub(crate) fn reflected_in(
        &self,
        post: &Post,
        window: Duration,
        claimed: &mut HashSet<CommentId>,
    ) -> Option<Option<CommentId>> {
        match &self.kind {
            MutationKind::Like(user) => post.likes.contains(user).then_some(None),
            MutationKind::Unlike(user) => (!post.likes.contains(user)).then_some(None),
            MutationKind::AddComment(draft) => {
                if post.has_comment(&draft.id) {
                    claimed.insert(draft.id.clone());
                    return Some(Some(draft.id.clone()));
                }
                let found = post.comments.iter().find(|c| {
                    !claimed.contains(&c.id)
                        && c.author.id == draft.author.id
                        && c.body == draft.body
                        && abs_distance(c.created_at, draft.created_at) <= window
                })?;
                claimed.insert(found.id.clone());
                Some(Some(found.id.clone()))
            }
        }
    }
}

fn abs_distance(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    (a - b).abs().to_std().unwrap_or(Duration::MAX)
}
