use axum::http::StatusCode;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("API key not found")]
    KeyNotFound,

    #[error("Global API key has not been initialized")]
    GlobalKeyUninitialized,

    #[error("{message}")]
    ValidationRejected { status: StatusCode, message: String },

    #[error("Unauthorized")]
    AuthorizationDenied,

    #[error("Invalid scope list: {0}")]
    InvalidScopes(#[source] serde_json::Error),

    #[error("Key store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Secret generation failed: {0}")]
    Secret(String),

    #[error("{0}")]
    Other(String),
}

impl Serialize for AuthError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<AuthError> for StatusCode {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::KeyNotFound => StatusCode::NOT_FOUND,
            AuthError::ValidationRejected { status, .. } => status,
            AuthError::AuthorizationDenied => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
