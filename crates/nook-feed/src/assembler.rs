use std::sync::{Arc, Mutex};

use nook_ledger::{CommentDraft, MutationLedger, ReconcileReport};
use nook_store::codec::{FIELD_CREATED_AT, FIELD_LIKES};
use nook_store::{decode_post, encode_post, DocumentStore, OrderBy, POSTS_COLLECTION};
use nook_types::{
    AuthorSnapshot, Clock, Comment, CommentId, MutationId, Post, PostId, SystemClock,
};
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult, MutationFailure};
use crate::intent::FeedIntent;
use crate::page::{
    append_unique, keep_fresher, merge_refresh, sort_page, FeedCursor, FeedFilter, FeedPage,
};
use crate::view::PostView;

/// One decoded store page.
struct Fetched {
    posts: Vec<Post>,
    cursor: Option<FeedCursor>,
    /// Documents the store returned, including undecodable ones.
    returned: usize,
}

/// The held list and pagination session.
///
/// Posts are kept as confirmed snapshots; pending mutations are overlaid
/// when they are read out.
#[derive(Debug, Default)]
struct FeedState {
    posts: Vec<Post>,
    cursor: Option<FeedCursor>,
    filter: FeedFilter,
    epoch: u64,
    failures: Vec<MutationFailure>,
}

/// Assembles the feed shown to one viewer.
///
/// All operations take `&self`. The held list and the ledger sit behind
/// mutexes that are locked briefly and never across an `.await`; when both
/// are needed the state lock is taken first.
pub struct FeedAssembler {
    store: Arc<dyn DocumentStore>,
    config: FeedConfig,
    viewer: AuthorSnapshot,
    clock: Arc<dyn Clock>,
    ledger: Mutex<MutationLedger>,
    state: Mutex<FeedState>,
}

impl FeedAssembler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        viewer: AuthorSnapshot,
        config: FeedConfig,
    ) -> FeedResult<Self> {
        Self::with_clock(store, viewer, config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        store: Arc<dyn DocumentStore>,
        viewer: AuthorSnapshot,
        config: FeedConfig,
        clock: Arc<dyn Clock>,
    ) -> FeedResult<Self> {
        config.validate()?;
        let ledger = MutationLedger::new(config.ledger.clone(), clock.clone());
        Ok(Self {
            store,
            config,
            viewer,
            clock,
            ledger: Mutex::new(ledger),
            state: Mutex::new(FeedState::default()),
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn viewer(&self) -> &AuthorSnapshot {
        &self.viewer
    }

    // ---- List operations ----

    /// Load the first page for `filter`, replacing whatever was held.
    ///
    /// The filter becomes current only once its page arrives; a failed load
    /// leaves the previous list, cursor and filter together.
    pub async fn load_initial(&self, filter: &FeedFilter) -> FeedResult<FeedPage> {
        let epoch = self.begin().0;
        let fetched = self.fetch(filter, None).await;

        let mut state = self.state.lock().expect("lock poisoned");
        Self::check_epoch(&state, epoch, "initial load")?;
        let Fetched { posts, cursor, .. } = fetched?;

        let posts = if state.filter == *filter {
            keep_fresher(&state.posts, posts)
        } else {
            posts
        };
        let applied = self.settle(&mut state, &posts);
        state.filter = filter.clone();
        state.posts = posts;
        state.cursor = cursor.clone();
        info!(posts = applied.len(), has_more = cursor.is_some(), "feed loaded");
        Ok(FeedPage {
            posts: applied,
            cursor,
        })
    }

    /// Fetch the page after `cursor` and append its posts that are not
    /// already held. The returned page holds only the appended posts.
    pub async fn load_more(&self, cursor: &FeedCursor) -> FeedResult<FeedPage> {
        let (epoch, filter) = self.begin();
        let fetched = self.fetch(&filter, Some(cursor)).await;

        let mut state = self.state.lock().expect("lock poisoned");
        Self::check_epoch(&state, epoch, "load more")?;
        let Fetched {
            posts,
            cursor: next,
            returned,
        } = fetched?;
        if returned == 0 {
            state.cursor = None;
            return Err(FeedError::ExhaustedCursor);
        }

        let fetched_len = posts.len();
        let appended = append_unique(&mut state.posts, posts);
        if appended.len() < fetched_len {
            debug!(
                skipped = fetched_len - appended.len(),
                "posts already held were not re-inserted"
            );
        }

        let applied = self.settle(&mut state, &appended);
        state.cursor = next.clone();
        info!(
            appended = applied.len(),
            held = state.posts.len(),
            has_more = next.is_some(),
            "feed page appended"
        );
        Ok(FeedPage {
            posts: applied,
            cursor: next,
        })
    }

    /// Re-query the first page and merge it over the held list.
    ///
    /// Already paginated posts beyond the refreshed depth stay in place, and
    /// while any of them remain the previous continuation cursor is kept. The
    /// returned cursor is the one the feed will continue from. A held post
    /// that is newer than its fetched copy (a write landed while the query
    /// was in flight) keeps the held copy. Refreshing with a different filter
    /// than the one held replaces the list like [`Self::load_initial`].
    pub async fn refresh(&self, filter: &FeedFilter) -> FeedResult<FeedPage> {
        let epoch = self.begin().0;
        let fetched = self.fetch(filter, None).await;

        let mut state = self.state.lock().expect("lock poisoned");
        Self::check_epoch(&state, epoch, "refresh")?;
        let Fetched {
            posts,
            cursor: fresh_cursor,
            ..
        } = fetched?;

        if state.filter != *filter {
            state.posts.clear();
            state.filter = filter.clone();
        }
        let depth = posts.len();
        let merged = merge_refresh(&state.posts, posts);
        let applied = self.settle(&mut state, &merged[..depth]);
        let kept_tail = merged.len() - depth;
        if kept_tail == 0 {
            state.cursor = fresh_cursor;
        }
        state.posts = merged;

        let expired = self.ledger.lock().expect("lock poisoned").expire_stale();
        state
            .failures
            .extend(expired.into_iter().map(MutationFailure::expired));

        info!(
            refreshed = depth,
            kept_tail,
            held = state.posts.len(),
            "feed refreshed"
        );
        Ok(FeedPage {
            posts: applied,
            cursor: state.cursor.clone(),
        })
    }

    /// The most liked public posts, most likes first, with pending
    /// mutations applied. The held list and cursor are not touched.
    pub async fn trending(&self, limit: usize) -> FeedResult<Vec<PostView>> {
        if limit == 0 {
            return Err(FeedError::Invalid("trending limit must be at least 1".into()));
        }
        let fetched = self
            .fetch_ordered(
                &FeedFilter::home(),
                &OrderBy::desc(FIELD_LIKES),
                limit,
                None,
            )
            .await?;

        let ledger = self.ledger.lock().expect("lock poisoned");
        let views: Vec<PostView> = fetched
            .posts
            .iter()
            .map(|post| {
                PostView::build(
                    ledger.apply(post),
                    &self.viewer.id,
                    ledger.pending_for(&post.id),
                    self.config.preview_chars,
                )
            })
            .collect();
        info!(posts = views.len(), "trending posts loaded");
        Ok(views)
    }

    // ---- Engagement ----

    /// Like a post as the viewer.
    pub async fn like(&self, post_id: &PostId) -> FeedResult<()> {
        let mutation = self
            .ledger
            .lock()
            .expect("lock poisoned")
            .record_like(post_id.clone(), self.viewer.id.clone());

        let viewer = self.viewer.id.clone();
        let written = self
            .write_through(post_id, move |post| {
                post.likes.insert(viewer);
            })
            .await;
        self.settle_write(mutation, post_id, written).map(|_| ())
    }

    /// Withdraw the viewer's like.
    pub async fn unlike(&self, post_id: &PostId) -> FeedResult<()> {
        let mutation = self
            .ledger
            .lock()
            .expect("lock poisoned")
            .record_unlike(post_id.clone(), self.viewer.id.clone());

        let viewer = self.viewer.id.clone();
        let written = self
            .write_through(post_id, move |post| {
                post.likes.remove(&viewer);
            })
            .await;
        self.settle_write(mutation, post_id, written).map(|_| ())
    }

    /// Comment on a post as the viewer.
    ///
    /// Returns the confirmed comment id once the write lands.
    pub async fn comment(&self, post_id: &PostId, text: &str) -> FeedResult<CommentId> {
        let body = text.trim();
        if body.is_empty() {
            return Err(FeedError::Invalid("comment text is empty".into()));
        }

        let (mutation, local_id, created_at) = {
            let mut ledger = self.ledger.lock().expect("lock poisoned");
            let (mutation, local_id) = ledger.record_comment(
                post_id.clone(),
                CommentDraft::new(self.viewer.clone(), body),
            );
            let created_at = ledger
                .get(mutation)
                .map(|m| m.recorded_at)
                .unwrap_or_else(|| self.clock.now());
            (mutation, local_id, created_at)
        };

        let comment = Comment {
            id: CommentId::generate(),
            author: self.viewer.clone(),
            body: body.to_string(),
            created_at,
        };
        let written = self
            .write_through(post_id, move |post| {
                post.comments.push(comment);
                post.normalize();
            })
            .await;

        let report = self.settle_write(mutation, post_id, written)?;
        Ok(report
            .comment_ids
            .into_iter()
            .find(|(local, _)| *local == local_id)
            .map(|(_, confirmed)| confirmed)
            .unwrap_or(local_id))
    }

    // ---- Intents ----

    /// Run a presentation intent and return the resulting views.
    pub async fn dispatch(&self, intent: FeedIntent) -> FeedResult<Vec<PostView>> {
        debug!(?intent, "dispatching intent");
        match intent {
            FeedIntent::Refresh => {
                let filter = self.filter();
                self.refresh(&filter).await?;
            }
            FeedIntent::LoadMore => {
                let cursor = self.cursor().ok_or(FeedError::ExhaustedCursor)?;
                self.load_more(&cursor).await?;
            }
            FeedIntent::Like(post_id) => self.like(&post_id).await?,
            FeedIntent::Unlike(post_id) => self.unlike(&post_id).await?,
            FeedIntent::Comment(post_id, text) => {
                self.comment(&post_id, &text).await?;
            }
        }
        Ok(self.view())
    }

    // ---- Reads ----

    /// Render-ready views of the held list, in display order.
    pub fn view(&self) -> Vec<PostView> {
        let state = self.state.lock().expect("lock poisoned");
        let ledger = self.ledger.lock().expect("lock poisoned");
        state
            .posts
            .iter()
            .map(|post| {
                PostView::build(
                    ledger.apply(post),
                    &self.viewer.id,
                    ledger.pending_for(&post.id),
                    self.config.preview_chars,
                )
            })
            .collect()
    }

    /// Held posts with pending mutations applied.
    pub fn posts(&self) -> Vec<Post> {
        let state = self.state.lock().expect("lock poisoned");
        let ledger = self.ledger.lock().expect("lock poisoned");
        state.posts.iter().map(|p| ledger.apply(p)).collect()
    }

    pub fn cursor(&self) -> Option<FeedCursor> {
        self.state.lock().expect("lock poisoned").cursor.clone()
    }

    pub fn filter(&self) -> FeedFilter {
        self.state.lock().expect("lock poisoned").filter.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.ledger.lock().expect("lock poisoned").len()
    }

    /// Mutations that expired unconfirmed since the last call.
    ///
    /// Write failures are returned by the operation itself and are not
    /// repeated here.
    pub fn take_failures(&self) -> Vec<MutationFailure> {
        std::mem::take(&mut self.state.lock().expect("lock poisoned").failures)
    }

    // ---- Internals ----

    /// Start a list request. Returns the new epoch and the filter held so
    /// far; a new filter is committed only with the page it produced.
    fn begin(&self) -> (u64, FeedFilter) {
        let mut state = self.state.lock().expect("lock poisoned");
        state.epoch += 1;
        (state.epoch, state.filter.clone())
    }

    fn check_epoch(state: &FeedState, epoch: u64, what: &str) -> FeedResult<()> {
        if state.epoch != epoch {
            debug!(
                epoch,
                current = state.epoch,
                request = what,
                "stale response discarded"
            );
            return Err(FeedError::Superseded);
        }
        Ok(())
    }

    /// Fetch one feed page, newest first.
    async fn fetch(
        &self,
        filter: &FeedFilter,
        cursor: Option<&FeedCursor>,
    ) -> FeedResult<Fetched> {
        let mut fetched = self
            .fetch_ordered(
                filter,
                &OrderBy::desc(FIELD_CREATED_AT),
                self.config.page_size,
                cursor,
            )
            .await?;
        sort_page(&mut fetched.posts);
        Ok(fetched)
    }

    async fn fetch_ordered(
        &self,
        filter: &FeedFilter,
        order: &OrderBy,
        limit: usize,
        cursor: Option<&FeedCursor>,
    ) -> FeedResult<Fetched> {
        let page = self
            .store
            .query(
                POSTS_COLLECTION,
                &filter.predicates(),
                order,
                limit,
                cursor.map(FeedCursor::store_cursor),
            )
            .await?;

        let posts: Vec<Post> = page
            .documents
            .iter()
            .filter_map(|doc| match decode_post(doc) {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!(document = %doc.id, error = %e, "skipping undecodable post");
                    None
                }
            })
            .collect();
        Ok(Fetched {
            posts,
            cursor: page.cursor.map(FeedCursor::new),
            returned: page.documents.len(),
        })
    }

    /// Reconcile fetched snapshots against the ledger, record expirations,
    /// and return the snapshots with remaining mutations applied.
    fn settle(&self, state: &mut FeedState, posts: &[Post]) -> Vec<Post> {
        let mut ledger = self.ledger.lock().expect("lock poisoned");
        posts
            .iter()
            .map(|post| {
                let report = ledger.reconcile(post);
                if !report.is_empty() {
                    debug!(
                        post = %post.id,
                        retired = report.retired(),
                        "pending mutations reconciled"
                    );
                }
                state
                    .failures
                    .extend(report.expired.into_iter().map(MutationFailure::expired));
                ledger.apply(post)
            })
            .collect()
    }

    /// Read the post, edit it, and write it back. The store offers no
    /// transaction, so a concurrent writer between the two calls is lost.
    async fn write_through(
        &self,
        post_id: &PostId,
        edit: impl FnOnce(&mut Post) + Send,
    ) -> FeedResult<Post> {
        let doc = self
            .store
            .get_document(POSTS_COLLECTION, post_id.as_str())
            .await?;
        let mut post = decode_post(&doc)?;
        edit(&mut post);
        post.updated_at = self.clock.now().max(post.updated_at);

        let fields = encode_post(&post)?;
        self.store
            .set_document(POSTS_COLLECTION, post_id.as_str(), fields)
            .await?;
        Ok(post)
    }

    /// Fold the outcome of a backend write into the ledger and the list.
    fn settle_write(
        &self,
        mutation: MutationId,
        post_id: &PostId,
        written: FeedResult<Post>,
    ) -> FeedResult<ReconcileReport> {
        let mut state = self.state.lock().expect("lock poisoned");
        let mut ledger = self.ledger.lock().expect("lock poisoned");

        match written {
            Ok(post) => {
                if ledger.acknowledge(mutation).is_err() {
                    debug!(%mutation, post = %post_id, "mutation replaced before its write landed");
                }
                let report = ledger.reconcile(&post);
                state
                    .failures
                    .extend(report.expired.iter().cloned().map(MutationFailure::expired));
                if let Some(held) = state.posts.iter_mut().find(|p| p.id == post.id) {
                    *held = post;
                }
                Ok(report)
            }
            Err(FeedError::NotFound(_)) => {
                let discarded = ledger.discard_post(post_id);
                state.posts.retain(|p| &p.id != post_id);
                warn!(
                    post = %post_id,
                    discarded = discarded.len(),
                    "post deleted upstream, removed from feed"
                );
                Err(FeedError::NotFound(post_id.clone()))
            }
            Err(e) => {
                ledger.rollback(mutation);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for FeedAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let held = self.state.lock().map(|s| s.posts.len()).unwrap_or(0);
        f.debug_struct("FeedAssembler")
            .field("viewer", &self.viewer.id)
            .field("held", &held)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use nook_store::{
        Document, Fields, InMemoryDocumentStore, Predicate, QueryPage, StoreCursor, StoreResult,
    };
    use nook_types::{ManualClock, UserId, Visibility};
    use tokio::sync::oneshot;

    use super::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
    }

    fn me() -> AuthorSnapshot {
        AuthorSnapshot::new("me", "Me", "me")
    }

    fn post_id(i: usize) -> PostId {
        PostId::new(format!("post-{i:02}"))
    }

    /// Public posts `post-00` .. `post-{n-1}`, one minute apart, newest last.
    fn seed(store: &InMemoryDocumentStore, n: usize) {
        for i in 0..n {
            let created = base() + chrono::Duration::minutes(i as i64);
            let post = Post::new(
                post_id(i),
                AuthorSnapshot::new(format!("u{}", i % 3), "Someone", "someone"),
                format!("post number {i}"),
                created,
            );
            store.insert(
                POSTS_COLLECTION,
                post.id.as_str(),
                encode_post(&post).unwrap(),
            );
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(base() + chrono::Duration::hours(2)))
    }

    fn assembler(store: Arc<dyn DocumentStore>, clock: Arc<ManualClock>) -> FeedAssembler {
        FeedAssembler::with_clock(store, me(), FeedConfig::default(), clock).unwrap()
    }

    fn ids(posts: &[Post]) -> Vec<String> {
        posts.iter().map(|p| p.id.to_string()).collect()
    }

    /// Store wrapper whose queries and reads wait for a release signal, so
    /// tests can interleave in-flight requests deterministically.
    struct GatedStore {
        inner: Arc<InMemoryDocumentStore>,
        query_gates: std::sync::Mutex<VecDeque<oneshot::Receiver<()>>>,
        read_gates: std::sync::Mutex<VecDeque<oneshot::Receiver<()>>>,
    }

    impl GatedStore {
        fn new(inner: Arc<InMemoryDocumentStore>) -> Self {
            Self {
                inner,
                query_gates: Default::default(),
                read_gates: Default::default(),
            }
        }

        fn gate_query(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.query_gates.lock().unwrap().push_back(rx);
            tx
        }

        fn gate_read(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.read_gates.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl DocumentStore for GatedStore {
        async fn query(
            &self,
            collection: &str,
            predicates: &[Predicate],
            order: &OrderBy,
            limit: usize,
            cursor: Option<&StoreCursor>,
        ) -> StoreResult<QueryPage> {
            let gate = self.query_gates.lock().unwrap().pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.inner
                .query(collection, predicates, order, limit, cursor)
                .await
        }

        async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Document> {
            let gate = self.read_gates.lock().unwrap().pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            self.inner.get_document(collection, id).await
        }

        async fn set_document(
            &self,
            collection: &str,
            id: &str,
            fields: Fields,
        ) -> StoreResult<()> {
            self.inner.set_document(collection, id, fields).await
        }
    }

    /// Store wrapper whose queries read their snapshot first and only then
    /// wait for a release signal, like a response still on the wire.
    struct SnapshotFirstStore {
        inner: Arc<InMemoryDocumentStore>,
        query_gates: std::sync::Mutex<VecDeque<oneshot::Receiver<()>>>,
    }

    impl SnapshotFirstStore {
        fn new(inner: Arc<InMemoryDocumentStore>) -> Self {
            Self {
                inner,
                query_gates: Default::default(),
            }
        }

        fn gate_query(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.query_gates.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl DocumentStore for SnapshotFirstStore {
        async fn query(
            &self,
            collection: &str,
            predicates: &[Predicate],
            order: &OrderBy,
            limit: usize,
            cursor: Option<&StoreCursor>,
        ) -> StoreResult<QueryPage> {
            let page = self
                .inner
                .query(collection, predicates, order, limit, cursor)
                .await;
            let gate = self.query_gates.lock().unwrap().pop_front();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            page
        }

        async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Document> {
            self.inner.get_document(collection, id).await
        }

        async fn set_document(
            &self,
            collection: &str,
            id: &str,
            fields: Fields,
        ) -> StoreResult<()> {
            self.inner.set_document(collection, id, fields).await
        }
    }

    #[tokio::test]
    async fn pages_through_the_whole_feed() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 45);
        let feed = assembler(store, clock());

        let first = feed.load_initial(&FeedFilter::home()).await.unwrap();
        assert_eq!(first.len(), 20);
        assert_eq!(first.posts[0].id, post_id(44));
        for pair in first.posts.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }

        let second = feed.load_more(&first.cursor.unwrap()).await.unwrap();
        assert_eq!(second.len(), 20);
        assert!(second.posts.iter().all(|p| !first.posts.contains(p)));
        assert_eq!(second.posts[0].id, post_id(24));

        let third = feed.load_more(&second.cursor.unwrap()).await.unwrap();
        assert_eq!(third.len(), 5);
        assert!(third.cursor.is_none());
        assert_eq!(feed.view().len(), 45);

        let err = feed.dispatch(FeedIntent::LoadMore).await.unwrap_err();
        assert_eq!(err, FeedError::ExhaustedCursor);
    }

    #[tokio::test]
    async fn empty_continuation_exhausts_the_cursor() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 40);
        let feed = assembler(store, clock());

        let first = feed.load_initial(&FeedFilter::home()).await.unwrap();
        let second = feed.load_more(&first.cursor.unwrap()).await.unwrap();
        let cursor = second.cursor.expect("a full page carries a cursor");

        assert_eq!(feed.load_more(&cursor).await, Err(FeedError::ExhaustedCursor));
        assert!(feed.cursor().is_none());
        assert_eq!(feed.posts().len(), 40);
    }

    #[tokio::test]
    async fn undecodable_page_does_not_exhaust_cursor() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 45);
        // Posts 5..=24 keep their place in the order but no longer decode.
        for i in 5..=24 {
            let created = base() + chrono::Duration::minutes(i as i64);
            let mut junk = Fields::new();
            junk.insert("privacy".into(), "public".into());
            junk.insert("createdAt".into(), created.to_rfc3339().into());
            store.insert(POSTS_COLLECTION, post_id(i).as_str(), junk);
        }
        let feed = assembler(store, clock());

        let first = feed.load_initial(&FeedFilter::home()).await.unwrap();
        assert_eq!(first.len(), 20);

        let skipped = feed.load_more(&first.cursor.unwrap()).await.unwrap();
        assert!(skipped.is_empty());
        assert!(skipped.cursor.is_some());
        assert_eq!(feed.cursor(), skipped.cursor);

        let last = feed.load_more(&skipped.cursor.unwrap()).await.unwrap();
        assert_eq!(
            ids(&last.posts),
            vec!["post-04", "post-03", "post-02", "post-01", "post-00"]
        );
        assert!(last.cursor.is_none());
        assert_eq!(feed.posts().len(), 25);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_filter() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 45);
        let feed = assembler(store.clone(), clock());
        feed.load_initial(&FeedFilter::home()).await.unwrap();
        let cursor = feed.cursor();

        store.set_unavailable(true);
        let profile = FeedFilter::by_author(UserId::new("u0"), vec![Visibility::Public]);
        assert!(feed.load_initial(&profile).await.unwrap_err().is_retryable());
        store.set_unavailable(false);

        assert_eq!(feed.filter(), FeedFilter::home());
        assert_eq!(feed.cursor(), cursor);

        feed.dispatch(FeedIntent::LoadMore).await.unwrap();
        let held = feed.posts();
        assert_eq!(held.len(), 40);
        assert_eq!(held[20].id, post_id(24));
        assert!(held.iter().any(|p| p.author.id.as_str() == "u1"));
        assert!(held.iter().any(|p| p.author.id.as_str() == "u2"));
    }

    #[tokio::test]
    async fn refresh_with_new_filter_replaces_list() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 45);
        let feed = assembler(store, clock());
        let first = feed.load_initial(&FeedFilter::home()).await.unwrap();
        feed.load_more(&first.cursor.unwrap()).await.unwrap();

        let profile = FeedFilter::by_author(UserId::new("u0"), vec![Visibility::Public]);
        let page = feed.refresh(&profile).await.unwrap();
        assert_eq!(page.len(), 15);
        assert!(page.cursor.is_none());
        assert_eq!(feed.filter(), profile);
        assert!(feed.posts().iter().all(|p| p.author.id.as_str() == "u0"));
    }

    #[tokio::test]
    async fn trending_ranks_public_posts_by_likes() {
        let store = Arc::new(InMemoryDocumentStore::new());
        for (i, likes) in [2usize, 7, 0, 4, 1].into_iter().enumerate() {
            let mut post = Post::new(
                post_id(i),
                AuthorSnapshot::new("u0", "Someone", "someone"),
                "hello",
                base() + chrono::Duration::minutes(i as i64),
            );
            post.likes = (0..likes).map(|n| UserId::new(format!("fan-{n}"))).collect();
            store.insert(POSTS_COLLECTION, post.id.as_str(), encode_post(&post).unwrap());
        }
        let mut hidden = Post::new("hidden", me(), "friends only", base());
        hidden.visibility = Visibility::Friends;
        hidden.likes = (0..20).map(|n| UserId::new(format!("fan-{n}"))).collect();
        store.insert(POSTS_COLLECTION, "hidden", encode_post(&hidden).unwrap());

        let feed = assembler(store, clock());
        feed.load_initial(&FeedFilter::home()).await.unwrap();
        let held = feed.posts();

        let top = feed.trending(3).await.unwrap();
        let ranked: Vec<&str> = top.iter().map(|v| v.post.id.as_str()).collect();
        assert_eq!(ranked, vec!["post-01", "post-03", "post-00"]);
        assert_eq!(top[0].like_count, 7);
        assert_eq!(feed.posts(), held);

        assert!(matches!(feed.trending(0).await, Err(FeedError::Invalid(_))));
    }

    #[tokio::test]
    async fn home_feed_skips_non_public_posts() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 3);
        let mut private = Post::new("secret", me(), "for friends", base());
        private.visibility = Visibility::Friends;
        store.insert(POSTS_COLLECTION, "secret", encode_post(&private).unwrap());

        let feed = assembler(store, clock());
        let page = feed.load_initial(&FeedFilter::home()).await.unwrap();
        assert_eq!(page.len(), 3);

        let mine = FeedFilter::by_author(me().id, vec![Visibility::Public, Visibility::Friends]);
        let page = feed.load_initial(&mine).await.unwrap();
        assert_eq!(ids(&page.posts), vec!["secret"]);
    }

    #[tokio::test]
    async fn load_more_keeps_first_position_of_repeated_post() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 45);
        let feed = assembler(store.clone(), clock());
        let first = feed.load_initial(&FeedFilter::home()).await.unwrap();

        // A skewed clock rewrote post-30's timestamp so it now sorts into the
        // next page as well.
        let mut moved = first.posts.iter().find(|p| p.id == post_id(30)).unwrap().clone();
        moved.created_at = base() + chrono::Duration::seconds(20 * 60 + 30);
        store.insert(POSTS_COLLECTION, moved.id.as_str(), encode_post(&moved).unwrap());

        let second = feed.load_more(&first.cursor.unwrap()).await.unwrap();
        assert!(!second.posts.iter().any(|p| p.id == post_id(30)));
        assert_eq!(second.len(), 19);

        let held = feed.posts();
        assert_eq!(held.len(), 39);
        assert_eq!(held[14].id, post_id(30));
        assert_eq!(held.iter().filter(|p| p.id == post_id(30)).count(), 1);
    }

    #[tokio::test]
    async fn corrupt_documents_are_skipped() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 3);
        let mut junk = Fields::new();
        junk.insert("privacy".into(), "public".into());
        junk.insert("createdAt".into(), "2024-06-01T09:00:00Z".into());
        store.insert(POSTS_COLLECTION, "junk", junk);

        let feed = assembler(store, clock());
        let page = feed.load_initial(&FeedFilter::home()).await.unwrap();
        assert_eq!(page.len(), 3);
    }

    #[tokio::test]
    async fn refresh_keeps_paginated_tail_and_cursor() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 45);
        let feed = assembler(store.clone(), clock());
        let first = feed.load_initial(&FeedFilter::home()).await.unwrap();
        let second = feed.load_more(&first.cursor.unwrap()).await.unwrap();
        let tail_cursor = second.cursor.clone();

        store.remove(POSTS_COLLECTION, post_id(40).as_str());
        let page = feed.refresh(&FeedFilter::home()).await.unwrap();
        assert_eq!(page.len(), 20);
        assert_eq!(page.cursor, tail_cursor);

        let held = feed.posts();
        assert_eq!(held.len(), 39);
        assert!(!held.iter().any(|p| p.id == post_id(40)));
        assert_eq!(held.last().unwrap().id, post_id(5));

        let rest = feed.dispatch(FeedIntent::LoadMore).await.unwrap();
        assert_eq!(rest.len(), 44);
    }

    #[tokio::test]
    async fn refresh_preserves_pending_like_until_confirmed() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        seed(&inner, 5);
        let store = Arc::new(GatedStore::new(inner.clone()));
        let feed = assembler(store.clone(), clock());
        feed.load_initial(&FeedFilter::home()).await.unwrap();

        let release = store.gate_read();
        let target = post_id(2);
        let (liked, ()) = tokio::join!(feed.like(&target), async {
            // The like is recorded and its read is parked on the gate.
            let page = feed.refresh(&FeedFilter::home()).await.unwrap();
            let fetched = page.posts.iter().find(|p| p.id == target).unwrap();
            assert!(fetched.likes.contains(&me().id));

            let view = feed.view();
            let card = view.iter().find(|v| v.post.id == target).unwrap();
            assert!(card.liked_by_viewer);
            assert!(card.like_pending);
            assert_eq!(card.like_count, 1);
            release.send(()).unwrap();
        });
        liked.unwrap();

        let view = feed.view();
        let card = view.iter().find(|v| v.post.id == target).unwrap();
        assert!(card.liked_by_viewer);
        assert!(!card.like_pending);
        assert_eq!(feed.pending_count(), 0);

        let doc = inner
            .get_document(POSTS_COLLECTION, target.as_str())
            .await
            .unwrap();
        assert!(decode_post(&doc).unwrap().likes.contains(&me().id));
    }

    #[tokio::test]
    async fn superseded_list_response_is_discarded() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        seed(&inner, 5);
        let store = Arc::new(GatedStore::new(inner.clone()));
        let feed = assembler(store.clone(), clock());

        let older = store.gate_query();
        let newer = store.gate_query();
        let home = FeedFilter::home();
        let (first, second, ()) = tokio::join!(
            feed.load_initial(&home),
            feed.refresh(&home),
            async {
                tokio::task::yield_now().await;
                newer.send(()).unwrap();
                older.send(()).unwrap();
            }
        );

        assert_eq!(first, Err(FeedError::Superseded));
        assert_eq!(second.unwrap().len(), 5);
        assert_eq!(feed.posts().len(), 5);
    }

    #[tokio::test]
    async fn refresh_keeps_like_written_during_flight() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        seed(&inner, 5);
        let store = Arc::new(SnapshotFirstStore::new(inner.clone()));
        let feed = assembler(store.clone(), clock());
        feed.load_initial(&FeedFilter::home()).await.unwrap();

        let release = store.gate_query();
        let home = FeedFilter::home();
        let target = post_id(2);
        let (refreshed, ()) = tokio::join!(feed.refresh(&home), async {
            // The refresh has read its snapshot and is parked on the gate.
            feed.like(&target).await.unwrap();
            release.send(()).unwrap();
        });

        let page = refreshed.unwrap();
        let fetched = page.posts.iter().find(|p| p.id == target).unwrap();
        assert!(fetched.likes.contains(&me().id));

        let view = feed.view();
        let card = view.iter().find(|v| v.post.id == target).unwrap();
        assert!(card.liked_by_viewer);
        assert!(!card.like_pending);
        assert_eq!(card.like_count, 1);
        assert_eq!(feed.pending_count(), 0);
    }

    #[tokio::test]
    async fn like_is_written_and_confirmed() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 3);
        let feed = assembler(store.clone(), clock());
        feed.load_initial(&FeedFilter::home()).await.unwrap();

        let views = feed.dispatch(FeedIntent::Like(post_id(1))).await.unwrap();
        let card = views.iter().find(|v| v.post.id == post_id(1)).unwrap();
        assert!(card.liked_by_viewer);
        assert!(!card.like_pending);
        assert_eq!(feed.pending_count(), 0);

        feed.unlike(&post_id(1)).await.unwrap();
        let stored = decode_post(&store.get_document(POSTS_COLLECTION, "post-01").await.unwrap())
            .unwrap();
        assert!(stored.likes.is_empty());
        assert!(!feed.view()[1].liked_by_viewer);
    }

    #[tokio::test]
    async fn failed_write_rolls_back() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 3);
        let feed = assembler(store.clone(), clock());
        feed.load_initial(&FeedFilter::home()).await.unwrap();

        store.fail_next_writes(1);
        let err = feed.like(&post_id(0)).await.unwrap_err();
        assert!(err.is_retryable());

        store.time_out_next_writes(1);
        let err = feed.comment(&post_id(0), "hello?").await.unwrap_err();
        assert!(matches!(err, FeedError::NetworkFailure(_)));

        assert_eq!(feed.pending_count(), 0);
        let card = feed.view().into_iter().find(|v| v.post.id == post_id(0)).unwrap();
        assert!(!card.liked_by_viewer);
        assert_eq!(card.comment_count, 0);
        assert!(feed.take_failures().is_empty());
    }

    #[tokio::test]
    async fn comment_returns_confirmed_id() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 2);
        let feed = assembler(store.clone(), clock());
        feed.load_initial(&FeedFilter::home()).await.unwrap();

        let id = feed.comment(&post_id(1), "  first!  ").await.unwrap();
        assert!(!id.is_local());

        let card = feed.view().into_iter().find(|v| v.post.id == post_id(1)).unwrap();
        assert_eq!(card.comment_count, 1);
        assert!(!card.comment_pending);
        assert_eq!(card.post.comments[0].id, id);
        assert_eq!(card.post.comments[0].body, "first!");

        assert_eq!(
            feed.comment(&post_id(1), "   ").await,
            Err(FeedError::Invalid("comment text is empty".into()))
        );
    }

    #[tokio::test]
    async fn deleted_post_is_removed_from_feed() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 4);
        let feed = assembler(store.clone(), clock());
        feed.load_initial(&FeedFilter::home()).await.unwrap();

        store.remove(POSTS_COLLECTION, "post-03");
        let err = feed.like(&post_id(3)).await.unwrap_err();
        assert_eq!(err, FeedError::NotFound(post_id(3)));
        assert_eq!(feed.posts().len(), 3);
        assert_eq!(feed.pending_count(), 0);
    }

    #[tokio::test]
    async fn stale_pending_like_is_reported_as_failure() {
        let inner = Arc::new(InMemoryDocumentStore::new());
        seed(&inner, 3);
        let store = Arc::new(GatedStore::new(inner));
        let clock = clock();
        let feed = assembler(store.clone(), clock.clone());
        feed.load_initial(&FeedFilter::home()).await.unwrap();

        let release = store.gate_read();
        let target = post_id(0);
        let (liked, ()) = tokio::join!(feed.like(&target), async {
            clock.advance(Duration::from_secs(31));
            feed.refresh(&FeedFilter::home()).await.unwrap();

            let failures = feed.take_failures();
            assert_eq!(failures.len(), 1);
            assert_eq!(
                failures[0].error,
                FeedError::StaleMutationTimeout {
                    mutation: failures[0].mutation.id,
                    post: post_id(0),
                }
            );
            assert_eq!(feed.pending_count(), 0);
            assert!(!feed.view()[2].liked_by_viewer);
            release.send(()).unwrap();
        });

        // The write itself still lands; server truth then shows the like.
        liked.unwrap();
        assert!(feed.view()[2].liked_by_viewer);
        assert!(feed.take_failures().is_empty());
    }

    #[tokio::test]
    async fn load_more_without_cursor_is_exhausted() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let feed = assembler(store, clock());
        assert_eq!(
            feed.dispatch(FeedIntent::LoadMore).await,
            Err(FeedError::ExhaustedCursor)
        );
        let page = feed.load_initial(&FeedFilter::home()).await.unwrap();
        assert!(page.is_empty());
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn unavailable_store_fails_list_requests() {
        let store = Arc::new(InMemoryDocumentStore::new());
        seed(&store, 3);
        store.set_unavailable(true);
        let feed = assembler(store.clone(), clock());

        let err = feed.load_initial(&FeedFilter::home()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(feed.posts().is_empty());

        store.set_unavailable(false);
        assert_eq!(feed.load_initial(&FeedFilter::home()).await.unwrap().len(), 3);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let config = FeedConfig {
            page_size: 0,
            ..FeedConfig::default()
        };
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
        let err = FeedAssembler::new(store, me(), config).unwrap_err();
        assert!(matches!(err, FeedError::Config(_)));
    }
}
