use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use nook_types::{Clock, Comment, CommentId, MutationId, Post, PostId, UserId};
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::mutation::{CommentDraft, MutationKind, PendingMutation};

/// What a reconciliation pass retired.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// The snapshot already reflects these.
    pub confirmed: Vec<PendingMutation>,
    /// Acknowledged writes that a newer snapshot overrode.
    pub superseded: Vec<PendingMutation>,
    /// Older than the staleness threshold; treated as failed.
    pub expired: Vec<PendingMutation>,
    /// `(local id, confirmed id)` for every draft comment that was matched.
    pub comment_ids: Vec<(CommentId, CommentId)>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty() && self.superseded.is_empty() && self.expired.is_empty()
    }

    pub fn retired(&self) -> usize {
        self.confirmed.len() + self.superseded.len() + self.expired.len()
    }
}

/// Single-writer set of pending optimistic mutations.
///
/// Entries are kept in the order they were recorded, which is also the order
/// [`Self::apply`] overlays them. At most one like/unlike entry exists per
/// `(post, user)`: recording either sense replaces the previous one.
pub struct MutationLedger {
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    next_id: MutationId,
    pending: BTreeMap<MutationId, PendingMutation>,
    reactions: HashMap<(PostId, UserId), MutationId>,
}

impl MutationLedger {
    pub fn new(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            next_id: MutationId::new(1),
            pending: BTreeMap::new(),
            reactions: HashMap::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, id: MutationId) -> Option<&PendingMutation> {
        self.pending.get(&id)
    }

    /// Pending mutations for one post, oldest first.
    pub fn pending_for<'a>(
        &'a self,
        post_id: &'a PostId,
    ) -> impl Iterator<Item = &'a PendingMutation> + 'a {
        self.pending.values().filter(move |m| &m.post_id == post_id)
    }

    pub fn is_pending(&self, post_id: &PostId) -> bool {
        self.pending_for(post_id).next().is_some()
    }

    // ---- Recording ----

    pub fn record_like(&mut self, post_id: PostId, user: UserId) -> MutationId {
        self.record_reaction(post_id, user, true)
    }

    pub fn record_unlike(&mut self, post_id: PostId, user: UserId) -> MutationId {
        self.record_reaction(post_id, user, false)
    }

    fn record_reaction(&mut self, post_id: PostId, user: UserId, like: bool) -> MutationId {
        let key = (post_id.clone(), user.clone());
        if let Some(previous) = self.reactions.remove(&key) {
            if let Some(replaced) = self.pending.remove(&previous) {
                debug!(
                    post = %post_id,
                    replaced = %replaced.id,
                    "reaction replaced by newer intent"
                );
            }
        }

        let kind = if like {
            MutationKind::Like(user)
        } else {
            MutationKind::Unlike(user)
        };
        let id = self.insert(post_id, kind);
        self.reactions.insert(key, id);
        id
    }

    /// Record a draft comment.
    ///
    /// Returns the mutation id (for acknowledgement or rollback) and the
    /// temporary comment identity the UI shows until the confirmed comment
    /// arrives.
    pub fn record_comment(
        &mut self,
        post_id: PostId,
        draft: CommentDraft,
    ) -> (MutationId, CommentId) {
        let comment = Comment {
            id: CommentId::local(),
            author: draft.author,
            body: draft.body,
            created_at: self.clock.now(),
        };
        let local_id = comment.id.clone();
        let id = self.insert(post_id, MutationKind::AddComment(comment));
        (id, local_id)
    }

    fn insert(&mut self, post_id: PostId, kind: MutationKind) -> MutationId {
        let id = self.next_id;
        self.next_id = id.next();
        debug!(mutation = %id, post = %post_id, kind = kind.label(), "mutation recorded");
        self.pending.insert(
            id,
            PendingMutation {
                id,
                post_id,
                kind,
                recorded_at: self.clock.now(),
                acknowledged_at: None,
            },
        );
        id
    }

    // ---- Overlay ----

    /// Overlay every pending mutation for `post` onto a copy of it.
    ///
    /// Likes are added, unlikes removed, and draft comments appended after the
    /// confirmed ones. Idempotent: applying the result again changes nothing.
    pub fn apply(&self, post: &Post) -> Post {
        let mut overlaid = post.clone();
        for mutation in self.pending_for(&post.id) {
            mutation.apply_to(&mut overlaid);
        }
        overlaid
    }

    // ---- Settlement ----

    /// Retire pending mutations for `post` against a freshly fetched snapshot.
    ///
    /// A mutation is dropped when the snapshot reflects it, when its write was
    /// acknowledged and the snapshot was updated after it was recorded, or
    /// when it is older than [`LedgerConfig::stale_after`] (reported as
    /// expired).
    pub fn reconcile(&mut self, post: &Post) -> ReconcileReport {
        let now = self.clock.now();
        let mut report = ReconcileReport::default();
        let mut claimed = HashSet::new();

        let candidates: Vec<MutationId> = self.pending_for(&post.id).map(|m| m.id).collect();
        for id in candidates {
            let Some(mutation) = self.pending.get(&id) else {
                continue;
            };

            if let Some(matched) =
                mutation.reflected_in(post, self.config.comment_match_window, &mut claimed)
            {
                if let (MutationKind::AddComment(draft), Some(confirmed)) =
                    (&mutation.kind, matched)
                {
                    report.comment_ids.push((draft.id.clone(), confirmed));
                }
                if let Some(m) = self.remove(id) {
                    debug!(mutation = %id, post = %post.id, "mutation confirmed by snapshot");
                    report.confirmed.push(m);
                }
            } else if mutation
                .acknowledged_at
                .is_some_and(|_| post.updated_at > mutation.recorded_at)
            {
                if let Some(m) = self.remove(id) {
                    debug!(mutation = %id, post = %post.id, "acknowledged mutation superseded");
                    report.superseded.push(m);
                }
            } else if mutation.age(now) > self.config.stale_after {
                if let Some(m) = self.remove(id) {
                    warn!(mutation = %id, post = %post.id, kind = m.kind.label(), "pending mutation expired");
                    report.expired.push(m);
                }
            }
        }

        report
    }

    /// Drop every mutation older than the staleness threshold, on any post.
    pub fn expire_stale(&mut self) -> Vec<PendingMutation> {
        let now = self.clock.now();
        let stale: Vec<MutationId> = self
            .pending
            .values()
            .filter(|m| m.age(now) > self.config.stale_after)
            .map(|m| m.id)
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.remove(id))
            .inspect(|m| {
                warn!(mutation = %m.id, post = %m.post_id, kind = m.kind.label(), "pending mutation expired");
            })
            .collect()
    }

    /// Mark that the backend accepted the write for `id`.
    pub fn acknowledge(&mut self, id: MutationId) -> Result<(), LedgerError> {
        let now = self.clock.now();
        let mutation = self
            .pending
            .get_mut(&id)
            .ok_or(LedgerError::UnknownMutation(id))?;
        mutation.acknowledged_at = Some(now);
        Ok(())
    }

    /// Remove exactly the mutation `id` after its write failed.
    ///
    /// A newer intent that already replaced it is left untouched.
    pub fn rollback(&mut self, id: MutationId) -> Option<PendingMutation> {
        let removed = self.remove(id);
        if let Some(m) = &removed {
            warn!(mutation = %id, post = %m.post_id, kind = m.kind.label(), "mutation rolled back");
        }
        removed
    }

    /// Forget every pending mutation for a post deleted on the backend.
    pub fn discard_post(&mut self, post_id: &PostId) -> Vec<PendingMutation> {
        let ids: Vec<MutationId> = self.pending_for(post_id).map(|m| m.id).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    fn remove(&mut self, id: MutationId) -> Option<PendingMutation> {
        let removed = self.pending.remove(&id)?;
        if let Some(user) = removed.kind.reactor() {
            let key = (removed.post_id.clone(), user.clone());
            if self.reactions.get(&key) == Some(&id) {
                self.reactions.remove(&key);
            }
        }
        Some(removed)
    }
}

impl std::fmt::Debug for MutationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationLedger")
            .field("pending", &self.pending.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
