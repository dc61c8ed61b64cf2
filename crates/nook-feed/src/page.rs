use std::collections::{HashMap, HashSet};

use nook_store::codec::{FIELD_PRIVACY, FIELD_USER_ID};
use nook_store::{Predicate, StoreCursor};
use nook_types::{Post, PostId, UserId, Visibility};
use serde_json::Value;

/// Opaque continuation token for resuming a feed query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FeedCursor(StoreCursor);

impl FeedCursor {
    pub(crate) fn new(cursor: StoreCursor) -> Self {
        Self(cursor)
    }

    pub(crate) fn store_cursor(&self) -> &StoreCursor {
        &self.0
    }
}

/// Which posts a feed query selects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedFilter {
    /// Allowed visibilities; empty means any.
    pub visibility: Vec<Visibility>,
    /// Restrict to one author (profile feeds).
    pub author: Option<UserId>,
}

impl FeedFilter {
    /// The home feed: public posts from everyone.
    pub fn home() -> Self {
        Self {
            visibility: vec![Visibility::Public],
            author: None,
        }
    }

    /// One author's posts with the given visibilities.
    pub fn by_author(author: UserId, visibility: Vec<Visibility>) -> Self {
        Self {
            visibility,
            author: Some(author),
        }
    }

    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::with_capacity(2);
        match self.visibility.as_slice() {
            [] => {}
            [only] => predicates.push(Predicate::eq(FIELD_PRIVACY, only.as_str())),
            many => predicates.push(Predicate::one_of(
                FIELD_PRIVACY,
                many.iter().map(|v| Value::from(v.as_str())).collect(),
            )),
        }
        if let Some(author) = &self.author {
            predicates.push(Predicate::eq(FIELD_USER_ID, author.as_str()));
        }
        predicates
    }
}

impl Default for FeedFilter {
    fn default() -> Self {
        Self::home()
    }
}

/// One query's worth of posts plus the token to continue after them.
///
/// A `None` cursor means the store returned a short page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub cursor: Option<FeedCursor>,
}

impl FeedPage {
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Sort newest first; posts created at the same instant go by descending id
/// so repeated fetches render in the same order.
pub fn sort_page(posts: &mut [Post]) {
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Append `incoming` after `held`, skipping posts already held. Returns the
/// posts that were actually appended.
pub fn append_unique(held: &mut Vec<Post>, incoming: Vec<Post>) -> Vec<Post> {
    let mut seen: HashSet<PostId> = held.iter().map(|p| p.id.clone()).collect();
    let appended: Vec<Post> = incoming
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect();
    held.extend(appended.iter().cloned());
    appended
}

/// Merge a refreshed first page into the held list.
///
/// The result is the fetched posts followed by held posts that are absent
/// from the fetched page and sat at or beyond its depth, in their held order.
/// Held posts inside the refreshed window that did not come back are dropped.
///
/// A fetched post whose held copy carries a later `updated_at` is replaced by
/// the held copy (see [`keep_fresher`]).
pub fn merge_refresh(held: &[Post], fetched: Vec<Post>) -> Vec<Post> {
    let mut fetched = keep_fresher(held, fetched);
    sort_page(&mut fetched);
    let depth = fetched.len();
    let fetched_ids: HashSet<&PostId> = fetched.iter().map(|p| &p.id).collect();
    let tail: Vec<Post> = held
        .iter()
        .enumerate()
        .filter(|(index, post)| *index >= depth && !fetched_ids.contains(&post.id))
        .map(|(_, post)| post.clone())
        .collect();

    let mut merged = fetched;
    merged.extend(tail);
    merged
}

/// Replace each fetched post by its held copy when the held copy is newer.
///
/// A response read before a local write landed must not undo that write.
pub fn keep_fresher(held: &[Post], fetched: Vec<Post>) -> Vec<Post> {
    let by_id: HashMap<&PostId, &Post> = held.iter().map(|p| (&p.id, p)).collect();
    fetched
        .into_iter()
        .map(|post| match by_id.get(&post.id) {
            Some(known) if known.updated_at > post.updated_at => (*known).clone(),
            _ => post,
        })
        .collect()
}
