use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Treats an explicit JSON `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ==================== Модели пользователей ====================

/// Full profile of a user. Replaced wholesale, never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    pub email: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(rename = "profile_picture", default)]
    pub profile_picture_ref: Option<String>,
    #[serde(rename = "date_joined")]
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub posts_count: i64,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.email)
    }
}

/// The part of a user embedded in posts and comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "profile_picture", default)]
    pub profile_picture_ref: Option<String>,
}

impl UserSummary {
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .unwrap_or_else(|| format!("user #{}", self.id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.bio.is_none()
    }
}

// ==================== Модели постов ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    #[serde(rename = "caption", default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(rename = "image", default)]
    pub image_ref: Option<String>,
    pub author: UserSummary,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(rename = "is_liked", default)]
    pub is_liked_by_current_user: bool,
    #[serde(default)]
    pub comments_count: i64,
}

impl Post {
    pub fn like_state(&self) -> LikeState {
        LikeState {
            is_liked: self.is_liked_by_current_user,
            likes_count: self.likes_count,
        }
    }

    pub(crate) fn set_like_state(&mut self, state: LikeState) {
        self.is_liked_by_current_user = state.is_liked;
        self.likes_count = state.likes_count;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    #[serde(default)]
    pub post_id: i64,
    #[serde(rename = "user")]
    pub author: UserSummary,
    #[serde(rename = "content")]
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// `GET /posts/{id}/` payload: the post with its comments embedded.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PostWithComments {
    #[serde(flatten)]
    pub post: Post,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<Comment>,
}

/// The post currently opened in the detail view.
#[derive(Debug, Clone, PartialEq)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
}

impl From<PostWithComments> for PostDetail {
    fn from(payload: PostWithComments) -> Self {
        let post_id = payload.post.id;
        let comments = payload
            .comments
            .into_iter()
            .map(|mut c| {
                c.post_id = post_id;
                c
            })
            .collect();
        Self {
            post: payload.post,
            comments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeState {
    #[serde(alias = "is_like")]
    pub is_liked: bool,
    #[serde(alias = "like_count")]
    pub likes_count: i64,
}

impl LikeState {
    pub fn toggled(self) -> Self {
        if self.is_liked {
            Self {
                is_liked: false,
                likes_count: self.likes_count.saturating_sub(1).max(0),
            }
        } else {
            Self {
                is_liked: true,
                likes_count: self.likes_count + 1,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub image: Option<ImageUpload>,
}

// ==================== Лента ====================

/// Server-side ordering of the feed. Never applied client-side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Ordering {
    #[default]
    NewestFirst,
    OldestFirst,
    TitleAsc,
    TitleDesc,
}

impl Ordering {
    pub fn as_param(&self) -> &'static str {
        match self {
            Ordering::NewestFirst => "-created_at",
            Ordering::OldestFirst => "created_at",
            Ordering::TitleAsc => "title",
            Ordering::TitleDesc => "-title",
        }
    }
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

impl FromStr for Ordering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "-created_at" | "newest" => Ok(Ordering::NewestFirst),
            "created_at" | "oldest" => Ok(Ordering::OldestFirst),
            "title" => Ok(Ordering::TitleAsc),
            "-title" => Ok(Ordering::TitleDesc),
            other => Err(format!(
                "unknown ordering '{}', expected one of: -created_at, created_at, title, -title",
                other
            )),
        }
    }
}

/// Discrete filter selections; emitted without debouncing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FeedFilter {
    pub author: String,
    pub ordering: Ordering,
}

/// Everything that determines which set of posts is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FeedQuery {
    pub search_text: String,
    pub author_filter: String,
    pub ordering: Ordering,
}

impl FeedQuery {
    pub fn new(search_text: impl Into<String>, filter: FeedFilter) -> Self {
        Self {
            search_text: search_text.into(),
            author_filter: filter.author,
            ordering: filter.ordering,
        }
    }

    pub fn filter(&self) -> FeedFilter {
        FeedFilter {
            author: self.author_filter.clone(),
            ordering: self.ordering,
        }
    }

    /// Query-string parameters; blank text filters are left out.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![];

        let search = self.search_text.trim();
        if !search.is_empty() {
            params.push(("search".to_string(), search.to_string()));
        }
        let author = self.author_filter.trim();
        if !author.is_empty() {
            params.push(("author".to_string(), author.to_string()));
        }
        params.push(("ordering".to_string(), self.ordering.as_param().to_string()));

        params
    }
}

/// Opaque continuation tokens issued by the server. Never parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationCursor {
    pub next_ref: Option<String>,
    pub previous_ref: Option<String>,
    pub total_count: i64,
}

impl PaginationCursor {
    pub fn has_next(&self) -> bool {
        self.next_ref.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostsPage {
    pub count: i64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<Post>,
}

impl PostsPage {
    pub fn cursor(&self) -> PaginationCursor {
        PaginationCursor {
            next_ref: self.next.clone(),
            previous_ref: self.previous.clone(),
            total_count: self.count,
        }
    }
}
