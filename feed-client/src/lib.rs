pub mod config;
pub mod debounce;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod http_client;
pub mod models;
pub mod mutations;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

pub use config::ClientConfig;
pub use debounce::{Debouncer, QueryInput};
pub use error::FeedClientError;
pub use feed::{FeedController, FeedSnapshot, FetchOutcome, PageOutcome};
pub use gateway::{Gateway, Outcome};
pub use http_client::{HttpTransport, Transport};
pub use models::{
    AuthResponse, Comment, Credentials, FeedFilter, FeedQuery, ImageUpload, LikeState, NewPost,
    Ordering, PaginationCursor, Post, PostDetail, PostsPage, ProfilePatch, Registration, User,
    UserSummary,
};
pub use mutations::MutationCoordinator;
pub use session::{Session, SessionState, SessionStatus, SessionStore};
pub use storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

use std::sync::Arc;
use tokio::task::JoinHandle;

/// Session, feed and mutations wired over one transport and one session.
#[derive(Clone)]
pub struct FeedClient {
    config: ClientConfig,
    session: SessionStore,
    feed: FeedController,
    mutations: MutationCoordinator,
}

impl FeedClient {
    /// HTTP transport to `config.base_url`, tokens kept in `config.token_dir`.
    pub fn new(config: ClientConfig) -> Result<Self, FeedClientError> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::with_timeouts(
            config.base_url.clone(),
            config.connect_timeout,
            config.request_timeout,
        )?);
        let storage = Arc::new(FileCredentialStore::new(config.token_dir.clone()));
        Ok(Self::with_parts(transport, storage, config))
    }

    pub fn with_parts(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn CredentialStore>,
        config: ClientConfig,
    ) -> Self {
        let state = SessionState::new(storage);
        let gateway = Gateway::new(transport, state);
        let feed = FeedController::new(gateway.clone());

        Self {
            config,
            session: SessionStore::new(gateway.clone()),
            mutations: MutationCoordinator::new(gateway, feed.clone()),
            feed,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn feed(&self) -> &FeedController {
        &self.feed
    }

    pub fn mutations(&self) -> &MutationCoordinator {
        &self.mutations
    }

    /// Starts a debouncer whose effective queries drive the feed.
    ///
    /// The task ends once every `Debouncer` handle has been dropped.
    pub async fn spawn_debouncer(&self) -> (Debouncer, JoinHandle<()>) {
        let initial = self.feed.query().await;
        let (debouncer, queries) = Debouncer::new(self.config.search_debounce, initial);
        let handle = self.feed.follow(queries);
        (debouncer, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{page, user, FakeTransport, Reply};
    use std::time::Duration;

    fn client_with(fake: &Arc<FakeTransport>, storage: MemoryCredentialStore) -> FeedClient {
        FeedClient::with_parts(fake.clone(), Arc::new(storage), ClientConfig::default())
    }

    #[test]
    fn new_rejects_bad_base_url() {
        let config = ClientConfig::default().with_base_url("ftp://nope");
        assert!(FeedClient::new(config).is_err());
    }

    #[tokio::test]
    async fn restored_session_can_browse_and_like() {
        let fake = FakeTransport::new();
        fake.on("GET /profile/", Reply::json(200, user(1, "user1")));
        fake.on(
            "GET /posts/?ordering=-created_at",
            Reply::json(200, page(&[1, 2], None)),
        );
        fake.on(
            "POST /posts/2/like/",
            Reply::json(200, serde_json::json!({"is_liked": true, "likes_count": 4})),
        );
        let client = client_with(&fake, MemoryCredentialStore::with_tokens("acc", "ref"));

        assert_eq!(client.session().restore().await, SessionStatus::Authenticated);
        client.feed().fetch_first_page().await.unwrap();
        client.mutations().toggle_like(2).await.unwrap();

        let liked = client.feed().post(2).await.unwrap();
        assert!(liked.is_liked_by_current_user);
        assert!(fake
            .requests()
            .iter()
            .all(|r| r.bearer.as_deref() == Some("acc")));
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_search_drives_the_feed() {
        let fake = FakeTransport::new();
        fake.on(
            "GET /posts/?search=ab&ordering=-created_at",
            Reply::json(200, page(&[4], None)),
        );
        let client = client_with(&fake, MemoryCredentialStore::new());

        let (debouncer, handle) = client.spawn_debouncer().await;
        debouncer.search("a");
        debouncer.search("ab");
        tokio::time::sleep(Duration::from_millis(700)).await;
        drop(debouncer);
        handle.await.unwrap();
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let snapshot = client.feed().snapshot().await;
        assert_eq!(snapshot.query.search_text, "ab");
        assert_eq!(snapshot.posts.len(), 1);
        assert_eq!(fake.completed(), vec!["GET /posts/?search=ab&ordering=-created_at"]);
    }
}
