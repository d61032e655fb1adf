use crate::error::FeedClientError;
use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Url};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Path relative to the service base URL, e.g. `/posts/`.
    Path(String),
    /// A server-issued continuation reference, forwarded as-is.
    Link(String),
}

#[derive(Debug, Clone)]
pub enum PartValue {
    Text(String),
    File { file_name: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub value: PartValue,
}

#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<FormPart>),
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub target: Target,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            target: Target::Path(path.into()),
            query: vec![],
            body: RequestBody::Empty,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn follow(link: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            target: Target::Link(link.into()),
            query: vec![],
            body: RequestBody::Empty,
            bearer: None,
        }
    }

    pub fn query(mut self, params: Vec<(String, String)>) -> Self {
        self.query = params;
        self
    }

    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self, FeedClientError> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    /// `METHOD target?query`, used in logs.
    pub fn describe(&self) -> String {
        let target = match &self.target {
            Target::Path(p) | Target::Link(p) => p.as_str(),
        };
        if self.query.is_empty() {
            format!("{} {}", self.method, target)
        } else {
            let qs: Vec<String> = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{} {}?{}", self.method, target, qs.join("&"))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// The remote service as seen by the client core.
///
/// Returns `Err` only when no HTTP response was obtained at all; any status
/// code, including 4xx and 5xx, is an `Ok(RawResponse)`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, FeedClientError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FeedClientError> {
        Self::with_timeouts(base_url, Duration::from_secs(5), None)
    }

    pub fn with_timeouts(
        base_url: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Option<Duration>,
    ) -> Result<Self, FeedClientError> {
        let mut builder = Client::builder().connect_timeout(connect_timeout);
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            FeedClientError::Validation(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn resolve(&self, target: &Target) -> Result<Url, FeedClientError> {
        match target {
            Target::Path(path) => Url::parse(&self.url(path))
                .map_err(|e| FeedClientError::Validation(format!("Invalid URL: {}", e))),
            Target::Link(link) => {
                let base = Url::parse(&format!("{}/", self.base_url.trim_end_matches('/')))
                    .map_err(|e| FeedClientError::Validation(format!("Invalid base URL: {}", e)))?;
                base.join(link)
                    .map_err(|e| FeedClientError::Validation(format!("Invalid link: {}", e)))
            }
        }
    }

    fn build(&self, request: ApiRequest) -> Result<RequestBuilder, FeedClientError> {
        let url = self.resolve(&request.target)?;

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
            Method::Delete => self.client.delete(url),
        };

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(parts) => {
                let mut form = multipart::Form::new();
                for part in parts {
                    form = match part.value {
                        PartValue::Text(text) => form.text(part.name, text),
                        PartValue::File { file_name, bytes } => form.part(
                            part.name,
                            multipart::Part::bytes(bytes).file_name(file_name),
                        ),
                    };
                }
                builder.multipart(form)
            }
        };

        Ok(builder)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse, FeedClientError> {
        let description = request.describe();
        let builder = self.build(request)?;

        tracing::debug!("Sending {}", description);
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!("{} -> HTTP {}", description, status);

        Ok(RawResponse { status, body })
    }
}
