use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::{CommentId, PostId, UserId};

/// Point-in-time copy of an author's public profile, embedded in posts and
/// comments.
///
/// Snapshots are written once when the content is created and are never
/// refreshed afterwards. A user who renames themselves keeps their old name on
/// existing content until it is rewritten.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub id: UserId,
    pub display_name: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl AuthorSnapshot {
    pub fn new(
        id: impl Into<UserId>,
        display_name: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            username: username.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

/// Kind of a media attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub url: String,
    pub kind: MediaKind,
}

/// Audience of a post.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Friends,
    OnlyMe,
}

impl Visibility {
    /// The wire name used by the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Friends => "friends",
            Self::OnlyMe => "only_me",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "friends" => Ok(Self::Friends),
            "only_me" => Ok(Self::OnlyMe),
            other => Err(TypeError::UnknownVisibility(other.to_string())),
        }
    }
}

/// Set of users who liked a post.
///
/// Keeps insertion order (the backend stores likers as an array) and never
/// holds the same user twice, including when decoded from a document that
/// does.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<UserId>", into = "Vec<UserId>")]
pub struct LikerSet(Vec<UserId>);

impl LikerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a liker. Returns `false` if they were already present.
    pub fn insert(&mut self, user: UserId) -> bool {
        if self.contains(&user) {
            return false;
        }
        self.0.push(user);
        true
    }

    /// Remove a liker. Returns `false` if they were not present.
    pub fn remove(&mut self, user: &UserId) -> bool {
        let before = self.0.len();
        self.0.retain(|u| u != user);
        self.0.len() != before
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.0.contains(user)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserId> {
        self.0.iter()
    }
}

impl From<Vec<UserId>> for LikerSet {
    fn from(users: Vec<UserId>) -> Self {
        let mut set = Self::new();
        for user in users {
            set.insert(user);
        }
        set
    }
}

impl From<LikerSet> for Vec<UserId> {
    fn from(set: LikerSet) -> Self {
        set.0
    }
}

impl FromIterator<UserId> for LikerSet {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

/// A comment embedded in a post. Comments are append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: AuthorSnapshot,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A feed post as last seen from the backend (or as overlaid with pending
/// local mutations).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: AuthorSnapshot,
    pub body: String,
    pub media: Vec<MediaAttachment>,
    pub likes: LikerSet,
    /// Ordered by `created_at` ascending.
    pub comments: Vec<Comment>,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// A text-only public post with no engagement yet.
    pub fn new(
        id: impl Into<PostId>,
        author: AuthorSnapshot,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author,
            body: body.into(),
            media: Vec::new(),
            likes: LikerSet::new(),
            comments: Vec::new(),
            visibility: Visibility::Public,
            created_at,
            updated_at: created_at,
        }
    }

    /// Restore the comment ordering invariant after decoding untrusted data.
    ///
    /// The sort is stable, so comments sharing a timestamp keep their stored
    /// order.
    pub fn normalize(&mut self) {
        self.comments.sort_by_key(|c| c.created_at);
    }

    pub fn has_comment(&self, id: &CommentId) -> bool {
        self.comments.iter().any(|c| &c.id == id)
    }
}
