use crate::error::FeedClientError;
use crate::http_client::{ApiRequest, RawResponse, Transport};
use crate::session::SessionState;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Status the service uses to say the presented credentials are not valid.
const AUTH_FAILURE_STATUS: u16 = 401;

/// Classification of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    ClientError { status: u16, body: String },
    ServerError { status: u16 },
    NetworkError(String),
}

impl Outcome {
    pub fn classify(response: RawResponse) -> Self {
        match response.status {
            200..=299 => Outcome::Success(response.body),
            500..=599 => Outcome::ServerError {
                status: response.status,
            },
            // 4xx, and anything the service should never answer with
            status => Outcome::ClientError {
                status,
                body: response.body,
            },
        }
    }
}

/// Single choke point for every outbound call.
///
/// Attaches the session's access token, classifies the response and turns an
/// authentication failure on a credentialed request into a forced session
/// reset. Never retries.
#[derive(Clone)]
pub struct Gateway {
    transport: Arc<dyn Transport>,
    session: SessionState,
}

impl Gateway {
    pub fn new(transport: Arc<dyn Transport>, session: SessionState) -> Self {
        Self { transport, session }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Sends `request` with the current credentials and classifies the result.
    pub async fn execute(&self, request: ApiRequest) -> Outcome {
        self.send(request, true).await.0
    }

    /// Returns the outcome and whether it expired the session.
    async fn send(&self, mut request: ApiRequest, with_credentials: bool) -> (Outcome, bool) {
        request.bearer = if with_credentials {
            self.session.credential_for_request().await
        } else {
            None
        };
        let token_used = request.bearer.clone();
        let description = request.describe();

        let outcome = match self.transport.send(request).await {
            Ok(response) => Outcome::classify(response),
            Err(e) => Outcome::NetworkError(e.to_string()),
        };

        match &outcome {
            Outcome::Success(_) => tracing::debug!("{} succeeded", description),
            Outcome::ClientError { status, .. } => {
                tracing::debug!("{} rejected with HTTP {}", description, status)
            }
            Outcome::ServerError { status } => {
                tracing::warn!("{} failed with HTTP {}", description, status)
            }
            Outcome::NetworkError(e) => tracing::warn!("{} failed: {}", description, e),
        }

        let expired = match (&outcome, token_used.as_deref()) {
            (Outcome::ClientError { status, .. }, Some(token)) if *status == AUTH_FAILURE_STATUS => {
                let expired = self.session.expire(token).await;
                if expired {
                    tracing::warn!("{} rejected the access token, session expired", description);
                }
                expired
            }
            _ => false,
        };

        (outcome, expired)
    }

    async fn dispatch(
        &self,
        request: ApiRequest,
        with_credentials: bool,
    ) -> Result<String, FeedClientError> {
        match self.send(request, with_credentials).await {
            (Outcome::Success(body), _) => Ok(body),
            (Outcome::ClientError { .. }, true) => Err(FeedClientError::AuthExpired),
            (Outcome::ClientError { status, body }, false) => {
                Err(FeedClientError::ClientRejected { status, body })
            }
            (Outcome::ServerError { status }, _) => {
                Err(FeedClientError::ServerUnavailable { status })
            }
            (Outcome::NetworkError(e), _) => Err(FeedClientError::Network(e)),
        }
    }

    /// Credentialed call decoding a JSON payload.
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, FeedClientError> {
        let body = self.dispatch(request, true).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Credentialed call whose payload is ignored (e.g. `204 No Content`).
    pub async fn call_empty(&self, request: ApiRequest) -> Result<(), FeedClientError> {
        self.dispatch(request, true).await.map(|_| ())
    }

    /// Call made without credentials, such as login and registration.
    pub async fn call_public<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, FeedClientError> {
        let body = self.dispatch(request, false).await?;
        Ok(serde_json::from_str(&body)?)
    }
}
