use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedClientError {
    // Ошибки, пойманные до обращения к серверу
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    // Сервер отверг токен: сессия сброшена
    #[error("Session expired, please login again")]
    AuthExpired,

    #[error("Request rejected (HTTP {status}): {body}")]
    ClientRejected { status: u16, body: String },

    #[error("Server unavailable (HTTP {status})")]
    ServerUnavailable { status: u16 },

    // Транспортные ошибки
    #[error("Network failure: {0}")]
    Network(String),

    // Ошибки сериализации/десериализации
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

impl FeedClientError {
    /// True for errors raised locally, before any remote call was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            FeedClientError::Validation(_) | FeedClientError::AuthRequired
        )
    }

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, FeedClientError::AuthExpired)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FeedClientError::ClientRejected { status: 404, .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            FeedClientError::AuthRequired
                | FeedClientError::AuthExpired
                | FeedClientError::InvalidCredentials(_)
                | FeedClientError::ClientRejected { status: 401 | 403, .. }
        )
    }

    /// Failures that may succeed if the caller tries again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeedClientError::Network(_) | FeedClientError::ServerUnavailable { .. }
        )
    }
}

impl From<reqwest::Error> for FeedClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for FeedClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for FeedClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Reduces a rejection body to the message a user should see.
///
/// The service reports errors as `{"detail": ..}`, `{"error": ..}`,
/// `{"non_field_errors": [..]}` or a map of field name to messages.
pub fn rejection_message(body: &str) -> String {
    let value = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value,
        Err(_) => return body.trim().to_string(),
    };

    let first_text = |v: &serde_json::Value| -> Option<String> {
        match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => {
                items.first().and_then(|i| i.as_str()).map(str::to_string)
            }
            _ => None,
        }
    };

    if let Some(obj) = value.as_object() {
        for key in ["detail", "error", "non_field_errors"] {
            if let Some(msg) = obj.get(key).and_then(first_text) {
                return msg;
            }
        }
        if let Some((field, msg)) = obj
            .iter()
            .find_map(|(k, v)| first_text(v).map(|m| (k, m)))
        {
            return format!("{}: {}", field, msg);
        }
    }

    if let Some(msg) = first_text(&value) {
        return msg;
    }

    body.trim().to_string()
}
