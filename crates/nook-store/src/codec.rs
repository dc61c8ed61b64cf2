//! Mapping between [`Post`] and the backend's document layout.
//!
//! Documents use the camelCase field names of the mobile backend. The post id
//! is the document id and is not repeated inside the fields.

use chrono::{DateTime, Utc};
use nook_types::{
    AuthorSnapshot, Comment, CommentId, LikerSet, MediaAttachment, MediaKind, Post, UserId,
    Visibility,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::query::{Document, Fields};

/// Collection holding post documents.
pub const POSTS_COLLECTION: &str = "posts";

/// Field holding the creation timestamp; the feed orders on it.
pub const FIELD_CREATED_AT: &str = "createdAt";
/// Field holding the post visibility.
pub const FIELD_PRIVACY: &str = "privacy";
/// Field holding the author's user id.
pub const FIELD_USER_ID: &str = "userId";
/// Field holding the liker ids; ordering on it ranks by like count.
pub const FIELD_LIKES: &str = "likes";

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorDocument {
    id: UserId,
    display_name: String,
    username: String,
    #[serde(rename = "photoURL", default, skip_serializing_if = "Option::is_none")]
    photo_url: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct MediaDocument {
    url: String,
    #[serde(rename = "type")]
    kind: MediaKind,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentDocument {
    id: CommentId,
    user_id: UserId,
    user: AuthorDocument,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostDocument {
    user_id: UserId,
    user: AuthorDocument,
    content: String,
    #[serde(default)]
    media: Vec<MediaDocument>,
    #[serde(default)]
    likes: LikerSet,
    #[serde(default)]
    comments: Vec<CommentDocument>,
    privacy: Visibility,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl From<&AuthorSnapshot> for AuthorDocument {
    fn from(a: &AuthorSnapshot) -> Self {
        Self {
            id: a.id.clone(),
            display_name: a.display_name.clone(),
            username: a.username.clone(),
            photo_url: a.avatar_url.clone(),
        }
    }
}

impl From<AuthorDocument> for AuthorSnapshot {
    fn from(a: AuthorDocument) -> Self {
        Self {
            id: a.id,
            display_name: a.display_name,
            username: a.username,
            avatar_url: a.photo_url,
        }
    }
}

/// Decode a post document. Comment order is normalized and duplicate likers
/// are dropped.
pub fn decode_post(doc: &Document) -> StoreResult<Post> {
    let wire: PostDocument = serde_json::from_value(Value::Object(doc.fields.clone())).map_err(
        |e| StoreError::CorruptDocument {
            id: doc.id.clone(),
            reason: e.to_string(),
        },
    )?;

    let mut post = Post {
        id: doc.id.as_str().into(),
        author: wire.user.into(),
        body: wire.content,
        media: wire
            .media
            .into_iter()
            .map(|m| MediaAttachment {
                url: m.url,
                kind: m.kind,
            })
            .collect(),
        likes: wire.likes,
        comments: wire
            .comments
            .into_iter()
            .map(|c| Comment {
                id: c.id,
                author: c.user.into(),
                body: c.content,
                created_at: c.created_at,
            })
            .collect(),
        visibility: wire.privacy,
        created_at: wire.created_at,
        updated_at: wire.updated_at.unwrap_or(wire.created_at),
    };
    post.normalize();
    Ok(post)
}

/// Encode a post into document fields.
pub fn encode_post(post: &Post) -> StoreResult<Fields> {
    let wire = PostDocument {
        user_id: post.author.id.clone(),
        user: (&post.author).into(),
        content: post.body.clone(),
        media: post
            .media
            .iter()
            .map(|m| MediaDocument {
                url: m.url.clone(),
                kind: m.kind,
            })
            .collect(),
        likes: post.likes.clone(),
        comments: post
            .comments
            .iter()
            .map(|c| CommentDocument {
                id: c.id.clone(),
                user_id: c.author.id.clone(),
                user: (&c.author).into(),
                content: c.body.clone(),
                created_at: c.created_at,
            })
            .collect(),
        privacy: post.visibility,
        created_at: post.created_at,
        updated_at: Some(post.updated_at),
    };

    match serde_json::to_value(wire).map_err(|e| StoreError::Serialization(e.to_string()))? {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::Serialization(format!(
            "post {} encoded to non-object {other}",
            post.id
        ))),
    }
}
