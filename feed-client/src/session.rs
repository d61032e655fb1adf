use crate::error::{rejection_message, FeedClientError};
use crate::gateway::Gateway;
use crate::http_client::ApiRequest;
use crate::models::{AuthResponse, Credentials, ProfilePatch, Registration, User};
use crate::storage::{CredentialStore, TokenSlot};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

const LOGIN_PATH: &str = "/login/";
const REGISTER_PATH: &str = "/register/";
const PROFILE_PATH: &str = "/profile/";
const STATUS_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Restoring,
    Authenticated,
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub identity: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub status: SessionStatus,
}

impl Session {
    fn unauthenticated() -> Self {
        Self {
            identity: None,
            access_token: None,
            refresh_token: None,
            status: SessionStatus::Unauthenticated,
        }
    }
}

struct SessionInner {
    session: RwLock<Session>,
    storage: Arc<dyn CredentialStore>,
    status_tx: broadcast::Sender<SessionStatus>,
}

/// The one session of the running client.
///
/// Cheap to clone; every clone refers to the same session. Only the session
/// store and the gateway change it.
#[derive(Clone)]
pub struct SessionState {
    inner: Arc<SessionInner>,
}

impl SessionState {
    /// Starts in `Restoring` when a persisted access token exists.
    pub fn new(storage: Arc<dyn CredentialStore>) -> Self {
        let load = |slot: TokenSlot| match storage.load(slot) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Failed to read persisted {}: {}", slot.name(), e);
                None
            }
        };
        let access_token = load(TokenSlot::Access);
        let refresh_token = load(TokenSlot::Refresh);

        let session = match access_token {
            Some(access) => Session {
                identity: None,
                access_token: Some(access),
                refresh_token,
                status: SessionStatus::Restoring,
            },
            None => Session::unauthenticated(),
        };
        let (status_tx, _) = broadcast::channel(STATUS_CAPACITY);

        Self {
            inner: Arc::new(SessionInner {
                session: RwLock::new(session),
                storage,
                status_tx,
            }),
        }
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.session.read().await.clone()
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.session.read().await.status
    }

    pub async fn is_authenticated(&self) -> bool {
        self.status().await == SessionStatus::Authenticated
    }

    pub async fn current_user(&self) -> Option<User> {
        self.inner.session.read().await.identity.clone()
    }

    /// Receives every status transition from now on, in order.
    ///
    /// A forced logout arrives as `Expired` followed by `Unauthenticated`.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    fn publish(&self, session: &mut Session, status: SessionStatus) {
        session.status = status;
        // no receivers is fine
        let _ = self.inner.status_tx.send(status);
    }

    /// Token to attach to outgoing requests, if the session has one in use.
    pub(crate) async fn credential_for_request(&self) -> Option<String> {
        let session = self.inner.session.read().await;
        match session.status {
            SessionStatus::Authenticated | SessionStatus::Restoring => session.access_token.clone(),
            SessionStatus::Unauthenticated | SessionStatus::Expired => None,
        }
    }

    pub(crate) async fn establish(&self, auth: AuthResponse) -> User {
        let mut session = self.inner.session.write().await;

        for (slot, value) in [
            (TokenSlot::Access, &auth.access),
            (TokenSlot::Refresh, &auth.refresh),
        ] {
            if let Err(e) = self.inner.storage.save(slot, value) {
                tracing::warn!("Failed to persist {}: {}", slot.name(), e);
            }
        }

        session.identity = Some(auth.user.clone());
        session.access_token = Some(auth.access);
        session.refresh_token = Some(auth.refresh);
        self.publish(&mut session, SessionStatus::Authenticated);
        tracing::info!("Session authenticated as user {}", auth.user.id);

        auth.user
    }

    /// Completes a restore; ignored if the session moved on meanwhile.
    pub(crate) async fn complete_restore(&self, user: User) -> bool {
        let mut session = self.inner.session.write().await;
        if session.status != SessionStatus::Restoring {
            return false;
        }
        session.identity = Some(user);
        self.publish(&mut session, SessionStatus::Authenticated);
        true
    }

    pub(crate) async fn replace_identity(&self, user: User) -> bool {
        let mut session = self.inner.session.write().await;
        if session.status != SessionStatus::Authenticated {
            return false;
        }
        session.identity = Some(user);
        true
    }

    /// Gives up a restore; ignored if the session moved on meanwhile.
    pub(crate) async fn abandon_restore(&self) -> bool {
        let mut session = self.inner.session.write().await;
        if session.status != SessionStatus::Restoring {
            return false;
        }
        self.purge(&mut session);
        true
    }

    /// Clears memory and durable storage. Never fails.
    pub(crate) async fn reset(&self) {
        let mut session = self.inner.session.write().await;
        self.purge(&mut session);
    }

    fn purge(&self, session: &mut Session) {
        if let Err(e) = self.inner.storage.clear_all() {
            tracing::warn!("Failed to clear persisted credentials: {}", e);
        }
        session.identity = None;
        session.access_token = None;
        session.refresh_token = None;
        self.publish(session, SessionStatus::Unauthenticated);
    }

    /// Forced logout after the service rejected `token_used`.
    ///
    /// A rejection of a token that is no longer the session's (the user has
    /// logged out and in again meanwhile) is ignored.
    pub(crate) async fn expire(&self, token_used: &str) -> bool {
        let mut session = self.inner.session.write().await;
        if session.access_token.as_deref() != Some(token_used) {
            tracing::debug!("Ignoring rejection of a superseded token");
            return false;
        }
        self.publish(&mut session, SessionStatus::Expired);
        tracing::info!("Session expired, purging credentials");
        self.purge(&mut session);
        true
    }
}

/// Owns the session lifecycle: restore, login, register, logout and profile.
#[derive(Clone)]
pub struct SessionStore {
    state: SessionState,
    gateway: Gateway,
    restored: Arc<Mutex<bool>>,
}

impl SessionStore {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            state: gateway.session().clone(),
            gateway,
            restored: Arc::new(Mutex::new(false)),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Validates persisted credentials by fetching the current identity.
    ///
    /// Runs the validation at most once per process; concurrent and later
    /// callers wait for the first run and get the resulting status. Any
    /// failure ends in `Unauthenticated` with storage cleared.
    pub async fn restore(&self) -> SessionStatus {
        let mut restored = self.restored.lock().await;
        if *restored {
            return self.state.status().await;
        }
        *restored = true;

        if self.state.status().await != SessionStatus::Restoring {
            tracing::debug!("No persisted credentials to restore");
            return self.state.status().await;
        }

        match self.gateway.call::<User>(ApiRequest::get(PROFILE_PATH)).await {
            Ok(user) => {
                let user_id = user.id;
                if self.state.complete_restore(user).await {
                    tracing::info!("Session restored for user {}", user_id);
                }
            }
            Err(e) => {
                if self.state.abandon_restore().await {
                    tracing::warn!("Persisted credentials rejected: {}", e);
                } else {
                    tracing::debug!("Restore failed after the session moved on: {}", e);
                }
            }
        }

        self.state.status().await
    }

    pub async fn login(&self, credentials: Credentials) -> Result<User, FeedClientError> {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err(FeedClientError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        tracing::debug!("Login called for {}", credentials.email);
        let request = ApiRequest::post(LOGIN_PATH).json(&credentials)?;
        let auth = self
            .gateway
            .call_public::<AuthResponse>(request)
            .await
            .map_err(|e| match e {
                FeedClientError::ClientRejected {
                    status: 400 | 401,
                    body,
                } => FeedClientError::InvalidCredentials(rejection_message(&body)),
                other => other,
            })?;

        Ok(self.state.establish(auth).await)
    }

    /// Creates the account and logs in with the returned tokens.
    pub async fn register(&self, registration: Registration) -> Result<User, FeedClientError> {
        if registration.email.trim().is_empty() || registration.password.is_empty() {
            return Err(FeedClientError::Validation(
                "Email and password are required".to_string(),
            ));
        }
        if registration.password != registration.password_confirm {
            return Err(FeedClientError::Validation(
                "Passwords don't match".to_string(),
            ));
        }

        tracing::debug!("Register called for {}", registration.email);
        let request = ApiRequest::post(REGISTER_PATH).json(&registration)?;
        let auth = self.gateway.call_public::<AuthResponse>(request).await?;

        Ok(self.state.establish(auth).await)
    }

    pub async fn logout(&self) {
        self.state.reset().await;
        tracing::info!("Logged out");
    }

    pub async fn update_identity(&self, patch: ProfilePatch) -> Result<User, FeedClientError> {
        if !self.state.is_authenticated().await {
            return Err(FeedClientError::AuthRequired);
        }
        if patch.is_empty() {
            return Err(FeedClientError::Validation(
                "Nothing to update".to_string(),
            ));
        }

        let request = ApiRequest::put(PROFILE_PATH).json(&patch)?;
        let user = self.gateway.call::<User>(request).await?;
        self.state.replace_identity(user.clone()).await;

        Ok(user)
    }

    /// Re-fetches the current identity and replaces the stored snapshot.
    pub async fn refresh_identity(&self) -> Result<User, FeedClientError> {
        if !self.state.is_authenticated().await {
            return Err(FeedClientError::AuthRequired);
        }

        let user = self.gateway.call::<User>(ApiRequest::get(PROFILE_PATH)).await?;
        self.state.replace_identity(user.clone()).await;

        Ok(user)
    }
}
