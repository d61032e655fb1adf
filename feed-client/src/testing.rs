//! Scripted transport and fixtures shared by the unit tests.

use crate::error::FeedClientError;
use crate::http_client::{ApiRequest, RawResponse, Transport};
use crate::models::{AuthResponse, Post, PostsPage, User, UserSummary};
use crate::session::SessionState;
use crate::storage::MemoryCredentialStore;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

pub(crate) struct Reply {
    result: Result<RawResponse, FeedClientError>,
    gate: Option<oneshot::Receiver<()>>,
}

impl Reply {
    pub(crate) fn status(status: u16, body: &str) -> Self {
        Self {
            result: Ok(RawResponse {
                status,
                body: body.to_string(),
            }),
            gate: None,
        }
    }

    pub(crate) fn json<T: serde::Serialize>(status: u16, body: T) -> Self {
        let body = serde_json::to_string(&body).expect("fixture serializes");
        Self::status(status, &body)
    }

    pub(crate) fn network(message: &str) -> Self {
        Self {
            result: Err(FeedClientError::Network(message.to_string())),
            gate: None,
        }
    }

    /// Holds the reply back until the returned sender fires.
    pub(crate) fn gated(mut self) -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        self.gate = Some(rx);
        (self, tx)
    }
}

/// Replays scripted replies per `METHOD target?query` route, in order.
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    log: Mutex<Vec<ApiRequest>>,
    completed: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn on(&self, route: &str, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    /// Routes whose replies have been delivered, in delivery order.
    pub(crate) fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, FeedClientError> {
        let route = request.describe();
        self.log.lock().unwrap().push(request);

        let reply = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&route)
            .and_then(VecDeque::pop_front);
        let Some(reply) = reply else {
            return Ok(RawResponse {
                status: 404,
                body: format!(r#"{{"detail": "no script for {}"}}"#, route),
            });
        };

        if let Some(gate) = reply.gate {
            let _ = gate.await;
        }
        self.completed.lock().unwrap().push(route);
        reply.result
    }
}

pub(crate) fn user(id: i64, username: &str) -> User {
    User {
        id,
        username: Some(username.to_string()),
        email: format!("u{}@example.com", id),
        bio: None,
        profile_picture_ref: None,
        joined_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        posts_count: 0,
    }
}

pub(crate) fn auth_json(user_id: i64, access: &str, refresh: &str) -> AuthResponse {
    AuthResponse {
        user: user(user_id, &format!("user{}", user_id)),
        access: access.to_string(),
        refresh: refresh.to_string(),
    }
}

pub(crate) fn post(id: i64, author_id: i64) -> Post {
    Post {
        id,
        title: format!("Post {}", id),
        body: format!("Body of post {}", id),
        image_ref: None,
        author: UserSummary {
            id: author_id,
            username: Some(format!("user{}", author_id)),
            profile_picture_ref: None,
        },
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        likes_count: 3,
        is_liked_by_current_user: false,
        comments_count: 0,
    }
}

pub(crate) fn page(ids: &[i64], next: Option<&str>) -> PostsPage {
    PostsPage {
        count: ids.len() as i64,
        next: next.map(str::to_string),
        previous: None,
        results: ids.iter().map(|id| post(*id, 1)).collect(),
    }
}

/// An authenticated session for user 1 with `access` persisted.
pub(crate) async fn authenticated_session(
    access: &str,
) -> (SessionState, Arc<MemoryCredentialStore>) {
    let storage = Arc::new(MemoryCredentialStore::new());
    let session = SessionState::new(storage.clone());
    session
        .establish(AuthResponse {
            user: user(1, "user1"),
            access: access.to_string(),
            refresh: format!("{}-refresh", access),
        })
        .await;
    (session, storage)
}
