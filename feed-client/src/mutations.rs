use crate::error::FeedClientError;
use crate::feed::{post_path, FeedController, POSTS_PATH};
use crate::gateway::Gateway;
use crate::http_client::{ApiRequest, FormPart, PartValue};
use crate::models::{Comment, LikeState, NewPost, Post};
use crate::session::SessionState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

fn like_path(id: i64) -> String {
    format!("/posts/{}/like/", id)
}

fn comment_path(id: i64) -> String {
    format!("/posts/{}/comment/", id)
}

/// Social actions on posts: like, comment, delete and create.
///
/// Like and delete are applied to the feed before the service confirms them
/// and rolled back to their exact previous values if it does not.
#[derive(Clone)]
pub struct MutationCoordinator {
    gateway: Gateway,
    session: SessionState,
    feed: FeedController,
    like_locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl MutationCoordinator {
    pub fn new(gateway: Gateway, feed: FeedController) -> Self {
        Self {
            session: gateway.session().clone(),
            gateway,
            feed,
            like_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn require_session(&self) -> Result<(), FeedClientError> {
        if self.session.is_authenticated().await {
            Ok(())
        } else {
            Err(FeedClientError::AuthRequired)
        }
    }

    async fn like_lock(&self, post_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.like_locks.lock().await;
        locks.entry(post_id).or_default().clone()
    }

    /// Drops the entry for `post_id` once no toggle holds or awaits it.
    async fn release_like_lock(&self, post_id: i64, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.like_locks.lock().await;
        if locks
            .get(&post_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&post_id);
        }
    }

    /// Flips the like on `post_id` and reconciles with the service's answer.
    ///
    /// Toggles on the same post run one at a time.
    pub async fn toggle_like(&self, post_id: i64) -> Result<LikeState, FeedClientError> {
        self.require_session().await?;

        let lock = self.like_lock(post_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.flip_and_confirm(post_id).await
        };
        self.release_like_lock(post_id, lock).await;
        result
    }

    async fn flip_and_confirm(&self, post_id: i64) -> Result<LikeState, FeedClientError> {
        let snapshot = self.feed.flip_like(post_id).await;
        tracing::debug!(
            "Optimistic like toggle on post {} from {:?}",
            post_id,
            snapshot.previous()
        );

        match self
            .gateway
            .call::<LikeState>(ApiRequest::post(like_path(post_id)))
            .await
        {
            Ok(confirmed) => {
                self.feed.set_like(post_id, confirmed).await;
                Ok(confirmed)
            }
            Err(e) => {
                tracing::warn!("Like on post {} failed, rolling back: {}", post_id, e);
                self.feed.revert_like(post_id, snapshot).await;
                Err(e)
            }
        }
    }

    /// Posts a comment. Nothing is shown until the service returns it.
    pub async fn add_comment(&self, post_id: i64, body: &str) -> Result<Comment, FeedClientError> {
        self.require_session().await?;
        let body = body.trim();
        if body.is_empty() {
            return Err(FeedClientError::Validation(
                "Comment cannot be empty".to_string(),
            ));
        }

        let request =
            ApiRequest::post(comment_path(post_id)).json(&serde_json::json!({ "content": body }))?;
        let mut comment = self.gateway.call::<Comment>(request).await?;
        comment.post_id = post_id;

        self.feed.record_comment(comment.clone()).await;
        tracing::info!("Comment {} added to post {}", comment.id, post_id);

        Ok(comment)
    }

    /// Deletes a post, removing it from the feed first.
    ///
    /// Only the author may try; for posts not held locally the service decides.
    pub async fn delete_post(&self, post_id: i64) -> Result<(), FeedClientError> {
        self.require_session().await?;
        let user = self
            .session
            .current_user()
            .await
            .ok_or(FeedClientError::AuthRequired)?;

        if let Some(post) = self.feed.post(post_id).await {
            if post.author.id != user.id {
                return Err(FeedClientError::Validation(
                    "Only the author can delete this post".to_string(),
                ));
            }
        }

        let removal = self.feed.take_post(post_id).await;

        match self
            .gateway
            .call_empty(ApiRequest::delete(post_path(post_id)))
            .await
        {
            Ok(()) => {
                self.feed.forget_detail(post_id).await;
                tracing::info!("Post {} deleted", post_id);
                Ok(())
            }
            Err(e) => {
                if let Some(removal) = removal {
                    let index = removal.index;
                    if self.feed.restore_post(removal).await {
                        tracing::warn!(
                            "Delete of post {} failed, restored at index {}: {}",
                            post_id,
                            index,
                            e
                        );
                    } else {
                        tracing::warn!(
                            "Delete of post {} failed after the feed was replaced: {}",
                            post_id,
                            e
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Uploads a new post. The feed is left alone; refresh it to see the post.
    pub async fn create_post(&self, new_post: NewPost) -> Result<Post, FeedClientError> {
        self.require_session().await?;
        let title = new_post.title.trim();
        if title.is_empty() {
            return Err(FeedClientError::Validation(
                "Title is required".to_string(),
            ));
        }

        let mut parts = vec![
            FormPart {
                name: "title".to_string(),
                value: PartValue::Text(title.to_string()),
            },
            FormPart {
                name: "caption".to_string(),
                value: PartValue::Text(new_post.body),
            },
        ];
        if let Some(image) = new_post.image {
            parts.push(FormPart {
                name: "image".to_string(),
                value: PartValue::File {
                    file_name: image.file_name,
                    bytes: image.bytes,
                },
            });
        }

        let post = self
            .gateway
            .call::<Post>(ApiRequest::post(POSTS_PATH).multipart(parts))
            .await?;
        tracing::info!("Post {} created", post.id);

        Ok(post)
    }
}
