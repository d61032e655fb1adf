use crate::error::FeedClientError;
use crate::gateway::Gateway;
use crate::http_client::ApiRequest;
use crate::models::{
    Comment, FeedQuery, LikeState, PaginationCursor, Post, PostDetail, PostWithComments,
    PostsPage,
};
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

pub(crate) const POSTS_PATH: &str = "/posts/";

pub(crate) fn post_path(id: i64) -> String {
    format!("/posts/{}/", id)
}

/// Result of a fetch that may have been overtaken by a newer query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// Number of posts actually added after de-duplication.
    Appended(usize),
    EndOfFeed,
    Stale,
}

/// Read-only copy of the feed for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub query: FeedQuery,
    pub posts: Vec<Post>,
    pub cursor: PaginationCursor,
    pub generation: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct FeedState {
    query: FeedQuery,
    posts: Vec<Post>,
    cursor: PaginationCursor,
    // bumped on every query change
    generation: u64,
    // bumped whenever the collection is replaced wholesale
    epoch: u64,
    last_error: Option<String>,
    detail: Option<PostDetail>,
    detail_generation: u64,
}

impl FeedState {
    fn position(&self, id: i64) -> Option<usize> {
        self.posts.iter().position(|p| p.id == id)
    }

    fn replace_posts(&mut self, page: PostsPage) {
        let mut seen = HashSet::new();
        let cursor = page.cursor();
        self.posts = page
            .results
            .into_iter()
            .filter(|p| seen.insert(p.id))
            .collect();
        self.cursor = cursor;
        self.epoch += 1;
    }

    fn detail_post_mut(&mut self, id: i64) -> Option<&mut PostDetail> {
        self.detail.as_mut().filter(|d| d.post.id == id)
    }
}

/// A post taken out of the collection, with what is needed to put it back.
#[derive(Debug, Clone)]
pub(crate) struct Removal {
    pub index: usize,
    pub post: Post,
    epoch: u64,
}

/// Like fields as they were before an optimistic flip.
#[derive(Debug, Clone)]
pub(crate) struct LikeSnapshot {
    feed: Option<LikeState>,
    detail: Option<LikeState>,
    epoch: u64,
    detail_generation: u64,
}

impl LikeSnapshot {
    pub(crate) fn previous(&self) -> Option<LikeState> {
        self.feed.or(self.detail)
    }
}

/// Owns the ordered post collection, the cursor and the active query.
#[derive(Clone)]
pub struct FeedController {
    gateway: Gateway,
    state: Arc<Mutex<FeedState>>,
    // generation whose first-page fetch settled last
    settled: Arc<watch::Sender<u64>>,
}

impl FeedController {
    pub fn new(gateway: Gateway) -> Self {
        Self::with_query(gateway, FeedQuery::default())
    }

    pub fn with_query(gateway: Gateway, query: FeedQuery) -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            gateway,
            state: Arc::new(Mutex::new(FeedState {
                query,
                ..Default::default()
            })),
            settled: Arc::new(settled),
        }
    }

    /// Notified with the generation each time a current first-page fetch
    /// settles, successfully or not. Stale responses are not announced.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.settled.subscribe()
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.lock().await;
        FeedSnapshot {
            query: state.query.clone(),
            posts: state.posts.clone(),
            cursor: state.cursor.clone(),
            generation: state.generation,
            last_error: state.last_error.clone(),
        }
    }

    pub async fn posts(&self) -> Vec<Post> {
        self.state.lock().await.posts.clone()
    }

    pub async fn query(&self) -> FeedQuery {
        self.state.lock().await.query.clone()
    }

    pub async fn post(&self, id: i64) -> Option<Post> {
        let state = self.state.lock().await;
        state
            .posts
            .iter()
            .find(|p| p.id == id)
            .or_else(|| state.detail.as_ref().map(|d| &d.post).filter(|p| p.id == id))
            .cloned()
    }

    pub async fn detail(&self) -> Option<PostDetail> {
        self.state.lock().await.detail.clone()
    }

    /// Replaces the query and fetches its first page.
    ///
    /// Returns `Stale` if another query was set before the response arrived;
    /// the response is then dropped.
    pub async fn set_query(&self, query: FeedQuery) -> Result<FetchOutcome, FeedClientError> {
        let generation = self.begin_query(query).await;
        self.fetch_for(generation).await
    }

    /// Installs `query`, discarding the collection. Returns the new generation.
    pub(crate) async fn begin_query(&self, query: FeedQuery) -> u64 {
        let mut state = self.state.lock().await;
        state.query = query;
        state.generation += 1;
        state.epoch += 1;
        state.posts.clear();
        state.cursor = PaginationCursor::default();
        state.last_error = None;
        tracing::debug!("Feed query changed, generation {}", state.generation);
        state.generation
    }

    /// Re-fetches the first page of the current query.
    pub async fn fetch_first_page(&self) -> Result<FetchOutcome, FeedClientError> {
        let generation = self.state.lock().await.generation;
        self.fetch_for(generation).await
    }

    async fn fetch_for(&self, generation: u64) -> Result<FetchOutcome, FeedClientError> {
        let query = {
            let state = self.state.lock().await;
            if state.generation != generation {
                return Ok(FetchOutcome::Stale);
            }
            state.query.clone()
        };

        let request = ApiRequest::get(POSTS_PATH).query(query.to_params());
        let result = self.gateway.call::<PostsPage>(request).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            tracing::debug!(
                "Discarding feed response for generation {} (now {})",
                generation,
                state.generation
            );
            return Ok(FetchOutcome::Stale);
        }

        let outcome = match result {
            Ok(page) => {
                state.replace_posts(page);
                state.last_error = None;
                tracing::debug!("Feed loaded: {} posts", state.posts.len());
                Ok(FetchOutcome::Applied)
            }
            Err(e) => {
                state.last_error = Some(e.to_string());
                Err(e)
            }
        };
        self.settled.send_replace(generation);
        outcome
    }

    /// Follows the cursor and appends the next page, skipping known ids.
    pub async fn load_next_page(&self) -> Result<PageOutcome, FeedClientError> {
        let (next_ref, epoch) = {
            let state = self.state.lock().await;
            match &state.cursor.next_ref {
                Some(next) => (next.clone(), state.epoch),
                None => return Ok(PageOutcome::EndOfFeed),
            }
        };

        let result = self
            .gateway
            .call::<PostsPage>(ApiRequest::follow(next_ref.clone()))
            .await;

        let mut state = self.state.lock().await;
        // Another load or a query change already moved the cursor on.
        if state.epoch != epoch || state.cursor.next_ref.as_deref() != Some(next_ref.as_str()) {
            tracing::debug!("Discarding stale page for {}", next_ref);
            return Ok(PageOutcome::Stale);
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                state.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let mut seen: HashSet<i64> = state.posts.iter().map(|p| p.id).collect();
        let cursor = page.cursor();
        let mut added = 0;
        for post in page.results {
            if seen.insert(post.id) {
                state.posts.push(post);
                added += 1;
            } else {
                tracing::debug!("Skipping duplicate post {} in next page", post.id);
            }
        }
        state.cursor = cursor;
        state.last_error = None;

        Ok(PageOutcome::Appended(added))
    }

    /// Removes the post with `id`; no-op if it is not present.
    pub async fn remove_post(&self, id: i64) -> Option<Post> {
        self.take_post(id).await.map(|removal| removal.post)
    }

    pub(crate) async fn take_post(&self, id: i64) -> Option<Removal> {
        let mut state = self.state.lock().await;
        let index = state.position(id)?;
        let post = state.posts.remove(index);
        Some(Removal {
            index,
            post,
            epoch: state.epoch,
        })
    }

    /// Puts a removed post back at its original index.
    ///
    /// Skipped if the collection has been replaced since the removal.
    pub(crate) async fn restore_post(&self, removal: Removal) -> bool {
        let mut state = self.state.lock().await;
        if state.epoch != removal.epoch || state.position(removal.post.id).is_some() {
            return false;
        }
        let index = removal.index.min(state.posts.len());
        state.posts.insert(index, removal.post);
        true
    }

    pub(crate) async fn flip_like(&self, id: i64) -> LikeSnapshot {
        let mut state = self.state.lock().await;
        let epoch = state.epoch;
        let detail_generation = state.detail_generation;

        let feed = state.posts.iter_mut().find(|p| p.id == id).map(|post| {
            let previous = post.like_state();
            post.set_like_state(previous.toggled());
            previous
        });
        let detail = state.detail_post_mut(id).map(|d| {
            let previous = d.post.like_state();
            d.post.set_like_state(previous.toggled());
            previous
        });

        LikeSnapshot {
            feed,
            detail,
            epoch,
            detail_generation,
        }
    }

    pub(crate) async fn set_like(&self, id: i64, like: LikeState) {
        let mut state = self.state.lock().await;
        if let Some(post) = state.posts.iter_mut().find(|p| p.id == id) {
            post.set_like_state(like);
        }
        if let Some(d) = state.detail_post_mut(id) {
            d.post.set_like_state(like);
        }
    }

    pub(crate) async fn revert_like(&self, id: i64, snapshot: LikeSnapshot) {
        let mut state = self.state.lock().await;
        if let Some(previous) = snapshot.feed {
            if state.epoch == snapshot.epoch {
                if let Some(post) = state.posts.iter_mut().find(|p| p.id == id) {
                    post.set_like_state(previous);
                }
            }
        }
        if let Some(previous) = snapshot.detail {
            if state.detail_generation == snapshot.detail_generation {
                if let Some(d) = state.detail_post_mut(id) {
                    d.post.set_like_state(previous);
                }
            }
        }
    }

    /// Prepends a confirmed comment and bumps the post's comment count.
    pub(crate) async fn record_comment(&self, comment: Comment) {
        let mut state = self.state.lock().await;
        let post_id = comment.post_id;
        if let Some(post) = state.posts.iter_mut().find(|p| p.id == post_id) {
            post.comments_count += 1;
        }
        if let Some(d) = state.detail_post_mut(post_id) {
            d.post.comments_count += 1;
            d.comments.insert(0, comment);
        }
    }

    pub(crate) async fn forget_detail(&self, post_id: i64) {
        let mut state = self.state.lock().await;
        if state.detail_post_mut(post_id).is_some() {
            state.detail = None;
            state.detail_generation += 1;
        }
    }

    /// Fetches a post with its comments into the detail slot.
    ///
    /// Comments keep the server's order. The matching feed entry is refreshed
    /// in place. If another post was opened meanwhile the result is returned
    /// but not installed.
    pub async fn open_post(&self, id: i64) -> Result<PostDetail, FeedClientError> {
        let ticket = {
            let mut state = self.state.lock().await;
            state.detail_generation += 1;
            state.detail_generation
        };

        let payload = self
            .gateway
            .call::<PostWithComments>(ApiRequest::get(post_path(id)))
            .await?;
        let detail = PostDetail::from(payload);

        let mut state = self.state.lock().await;
        if state.detail_generation == ticket {
            if let Some(index) = state.position(id) {
                state.posts[index] = detail.post.clone();
            }
            state.detail = Some(detail.clone());
        }

        Ok(detail)
    }

    pub async fn close_post(&self) {
        let mut state = self.state.lock().await;
        state.detail = None;
        state.detail_generation += 1;
    }

    /// Applies every query from `queries`, in order, as it arrives.
    ///
    /// Fetches run concurrently; a fetch overtaken by a later query is
    /// discarded.
    pub fn follow<S>(&self, queries: S) -> JoinHandle<()>
    where
        S: Stream<Item = FeedQuery> + Send + 'static,
    {
        let feed = self.clone();
        tokio::spawn(async move {
            futures::pin_mut!(queries);
            while let Some(query) = queries.next().await {
                let generation = feed.begin_query(query).await;
                let fetcher = feed.clone();
                tokio::spawn(async move {
                    if let Err(e) = fetcher.fetch_for(generation).await {
                        tracing::warn!("Failed to fetch feed: {}", e);
                    }
                });
            }
            tracing::debug!("Query stream ended");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeedFilter;
    use crate::testing::{authenticated_session, page, post, FakeTransport, Reply};

    const FIRST: &str = "GET /posts/?ordering=-created_at";

    async fn feed_with(fake: &Arc<FakeTransport>) -> FeedController {
        let (session, _) = authenticated_session("tok").await;
        FeedController::new(Gateway::new(fake.clone(), session))
    }

    fn ids(posts: &[Post]) -> Vec<i64> {
        posts.iter().map(|p| p.id).collect()
    }

    fn search(text: &str) -> FeedQuery {
        FeedQuery::new(text, FeedFilter::default())
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn first_page_replaces_collection_and_cursor() {
        let fake = FakeTransport::new();
        fake.on(FIRST, Reply::json(200, page(&[1, 2, 3], Some("posts/?cursor=c2"))));
        let feed = feed_with(&fake).await;

        assert_eq!(feed.fetch_first_page().await.unwrap(), FetchOutcome::Applied);

        let snapshot = feed.snapshot().await;
        assert_eq!(ids(&snapshot.posts), vec![1, 2, 3]);
        assert_eq!(snapshot.cursor.next_ref.as_deref(), Some("posts/?cursor=c2"));
        assert_eq!(snapshot.cursor.total_count, 3);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_state_untouched() {
        let fake = FakeTransport::new();
        fake.on(FIRST, Reply::json(200, page(&[1, 2], Some("next"))));
        fake.on(FIRST, Reply::status(500, "boom"));
        let feed = feed_with(&fake).await;
        feed.fetch_first_page().await.unwrap();
        let before = feed.snapshot().await;

        let err = feed.fetch_first_page().await.unwrap_err();

        assert!(matches!(err, FeedClientError::ServerUnavailable { status: 500 }));
        let after = feed.snapshot().await;
        assert_eq!(after.posts, before.posts);
        assert_eq!(after.cursor, before.cursor);
        assert!(after.last_error.is_some());
    }

    #[tokio::test]
    async fn slow_response_for_old_query_never_clobbers_newer_one() {
        let fake = FakeTransport::new();
        let (slow, release_old) = Reply::json(200, page(&[1, 2], None)).gated();
        fake.on("GET /posts/?search=old&ordering=-created_at", slow);
        fake.on(
            "GET /posts/?search=new&ordering=-created_at",
            Reply::json(200, page(&[7], None)),
        );
        let feed = feed_with(&fake).await;

        let old = tokio::spawn({
            let feed = feed.clone();
            async move { feed.set_query(search("old")).await }
        });
        settle().await;

        assert_eq!(feed.set_query(search("new")).await.unwrap(), FetchOutcome::Applied);
        release_old.send(()).unwrap();

        assert_eq!(old.await.unwrap().unwrap(), FetchOutcome::Stale);
        let snapshot = feed.snapshot().await;
        assert_eq!(ids(&snapshot.posts), vec![7]);
        assert_eq!(snapshot.query.search_text, "new");
        assert_eq!(snapshot.generation, 2);
    }

    #[tokio::test]
    async fn error_from_stale_query_is_dropped() {
        let fake = FakeTransport::new();
        let (failing, release_old) = Reply::status(503, "down").gated();
        fake.on("GET /posts/?search=old&ordering=-created_at", failing);
        fake.on(
            "GET /posts/?search=new&ordering=-created_at",
            Reply::json(200, page(&[7], None)),
        );
        let feed = feed_with(&fake).await;

        let old = tokio::spawn({
            let feed = feed.clone();
            async move { feed.set_query(search("old")).await }
        });
        settle().await;
        feed.set_query(search("new")).await.unwrap();
        release_old.send(()).unwrap();

        assert_eq!(old.await.unwrap().unwrap(), FetchOutcome::Stale);
        assert!(feed.snapshot().await.last_error.is_none());
    }

    #[tokio::test]
    async fn next_page_skips_ids_already_present() {
        let fake = FakeTransport::new();
        let next = "http://svc/api/posts/?cursor=p2";
        fake.on(FIRST, Reply::json(200, page(&[1, 2, 3], Some(next))));
        fake.on(&format!("GET {}", next), Reply::json(200, page(&[3, 4, 2, 5], None)));
        let feed = feed_with(&fake).await;
        feed.fetch_first_page().await.unwrap();

        assert_eq!(feed.load_next_page().await.unwrap(), PageOutcome::Appended(2));

        let snapshot = feed.snapshot().await;
        assert_eq!(ids(&snapshot.posts), vec![1, 2, 3, 4, 5]);
        assert!(!snapshot.cursor.has_next());

        assert_eq!(feed.load_next_page().await.unwrap(), PageOutcome::EndOfFeed);
        assert_eq!(fake.requests().len(), 2);
    }

    #[tokio::test]
    async fn next_page_is_requested_by_opaque_reference() {
        let fake = FakeTransport::new();
        let next = "posts/?cursor=cD0yMDI0LTAz&ordering=-created_at";
        fake.on(FIRST, Reply::json(200, page(&[1], Some(next))));
        fake.on(&format!("GET {}", next), Reply::json(200, page(&[2], None)));
        let feed = feed_with(&fake).await;
        feed.fetch_first_page().await.unwrap();
        feed.load_next_page().await.unwrap();

        let request = &fake.requests()[1];
        assert_eq!(request.target, crate::http_client::Target::Link(next.to_string()));
        assert!(request.query.is_empty());
    }

    #[tokio::test]
    async fn next_page_for_previous_query_is_discarded() {
        let fake = FakeTransport::new();
        fake.on(FIRST, Reply::json(200, page(&[1, 2], Some("p2"))));
        let (slow, release) = Reply::json(200, page(&[3], None)).gated();
        fake.on("GET p2", slow);
        fake.on(
            "GET /posts/?search=rust&ordering=-created_at",
            Reply::json(200, page(&[9], None)),
        );
        let feed = feed_with(&fake).await;
        feed.fetch_first_page().await.unwrap();

        let pending = tokio::spawn({
            let feed = feed.clone();
            async move { feed.load_next_page().await }
        });
        settle().await;
        feed.set_query(search("rust")).await.unwrap();
        release.send(()).unwrap();

        assert_eq!(pending.await.unwrap().unwrap(), PageOutcome::Stale);
        assert_eq!(ids(&feed.posts().await), vec![9]);
    }

    #[tokio::test]
    async fn failed_next_page_keeps_collection_and_cursor() {
        let fake = FakeTransport::new();
        fake.on(FIRST, Reply::json(200, page(&[1, 2], Some("p2"))));
        fake.on("GET p2", Reply::network("reset"));
        let feed = feed_with(&fake).await;
        feed.fetch_first_page().await.unwrap();

        assert!(feed.load_next_page().await.is_err());
        let snapshot = feed.snapshot().await;
        assert_eq!(ids(&snapshot.posts), vec![1, 2]);
        assert_eq!(snapshot.cursor.next_ref.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn duplicate_ids_in_first_page_are_collapsed() {
        let fake = FakeTransport::new();
        fake.on(FIRST, Reply::json(200, page(&[1, 2, 1], None)));
        let feed = feed_with(&fake).await;
        feed.fetch_first_page().await.unwrap();
        assert_eq!(ids(&feed.posts().await), vec![1, 2]);
    }

    #[tokio::test]
    async fn remove_post_is_idempotent() {
        let fake = FakeTransport::new();
        fake.on(FIRST, Reply::json(200, page(&[1, 2, 3], None)));
        let feed = feed_with(&fake).await;
        feed.fetch_first_page().await.unwrap();

        assert_eq!(feed.remove_post(2).await.map(|p| p.id), Some(2));
        assert!(feed.remove_post(2).await.is_none());
        assert!(feed.remove_post(42).await.is_none());
        assert_eq!(ids(&feed.posts().await), vec![1, 3]);
    }

    #[tokio::test]
    async fn restore_post_returns_to_original_index() {
        let fake = FakeTransport::new();
        fake.on(FIRST, Reply::json(200, page(&[1, 2, 3, 4], None)));
        let feed = feed_with(&fake).await;
        feed.fetch_first_page().await.unwrap();

        let removal = feed.take_post(3).await.unwrap();
        assert_eq!(removal.index, 2);
        assert!(feed.restore_post(removal).await);
        assert_eq!(ids(&feed.posts().await), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn open_post_installs_detail_in_server_order() {
        let fake = FakeTransport::new();
        fake.on(FIRST, Reply::json(200, page(&[1, 2], None)));
        let mut fresh = serde_json::to_value(post(2, 1)).unwrap();
        fresh["likes_count"] = serde_json::json!(10);
        fresh["comments"] = serde_json::json!([
            {"id": 5, "user": {"id": 3}, "content": "older", "created_at": "2024-03-01T10:00:00Z"},
            {"id": 6, "user": {"id": 4}, "content": "newer", "created_at": "2024-03-02T10:00:00Z"}
        ]);
        fake.on("GET /posts/2/", Reply::json(200, fresh));
        let feed = feed_with(&fake).await;
        feed.fetch_first_page().await.unwrap();

        let detail = feed.open_post(2).await.unwrap();

        let comment_ids: Vec<i64> = detail.comments.iter().map(|c| c.id).collect();
        assert_eq!(comment_ids, vec![5, 6]);
        assert_eq!(feed.detail().await, Some(detail));
        // feed entry refreshed in place
        let posts = feed.posts().await;
        assert_eq!(ids(&posts), vec![1, 2]);
        assert_eq!(posts[1].likes_count, 10);

        feed.close_post().await;
        assert!(feed.detail().await.is_none());
    }

    #[tokio::test]
    async fn only_latest_opened_post_is_installed() {
        let fake = FakeTransport::new();
        let (slow, release) = Reply::json(200, post(1, 1)).gated();
        fake.on("GET /posts/1/", slow);
        fake.on("GET /posts/2/", Reply::json(200, post(2, 1)));
        let feed = feed_with(&fake).await;

        let first = tokio::spawn({
            let feed = feed.clone();
            async move { feed.open_post(1).await }
        });
        settle().await;
        feed.open_post(2).await.unwrap();
        release.send(()).unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(feed.detail().await.map(|d| d.post.id), Some(2));
    }

    #[tokio::test]
    async fn follow_applies_only_the_latest_query() {
        let fake = FakeTransport::new();
        let (slow, release) = Reply::json(200, page(&[1], None)).gated();
        fake.on("GET /posts/?search=a&ordering=-created_at", slow);
        fake.on(
            "GET /posts/?search=ab&ordering=-created_at",
            Reply::json(200, page(&[2, 3], None)),
        );
        let feed = feed_with(&fake).await;

        let handle = feed.follow(futures::stream::iter(vec![search("a"), search("ab")]));
        handle.await.unwrap();
        settle().await;
        release.send(()).unwrap();
        settle().await;

        let snapshot = feed.snapshot().await;
        assert_eq!(snapshot.query.search_text, "ab");
        assert_eq!(ids(&snapshot.posts), vec![2, 3]);
    }

    #[tokio::test]
    async fn subscribers_hear_only_current_fetches() {
        let fake = FakeTransport::new();
        let (slow, release) = Reply::json(200, page(&[1], None)).gated();
        fake.on("GET /posts/?search=a&ordering=-created_at", slow);
        fake.on(
            "GET /posts/?search=ab&ordering=-created_at",
            Reply::status(503, "busy"),
        );
        let feed = feed_with(&fake).await;
        let mut settled = feed.subscribe();

        let first = tokio::spawn({
            let feed = feed.clone();
            async move { feed.set_query(search("a")).await }
        });
        settle().await;
        assert!(feed.set_query(search("ab")).await.is_err());
        assert!(settled.has_changed().unwrap());
        assert_eq!(*settled.borrow_and_update(), 2);

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), FetchOutcome::Stale);
        assert!(!settled.has_changed().unwrap());
        assert!(feed.snapshot().await.last_error.is_some());
    }
}
