use thiserror::Error;

use crate::core::reply::Reply;
use crate::views;

/// Failures surfaced by the key-value backend and the gateway on top of it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("malformed identifier: {0:?}")]
    MalformedId(String),

    #[error("corrupt document at {key}: {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub const INVALID_CREDENTIALS: &str = "Invalid username or password";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("authentication lookup failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("Username already taken")]
    DuplicateUsername,

    #[error("failed to hash password: {0}")]
    Hash(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors a handler turns into a user-visible page instead of a redirect.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Forbidden")]
    Forbidden,
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Forbidden => 403,
            ApiError::NotFound(_) => 404,
            ApiError::InternalError(_) => 500,
        }
    }

    fn public_message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) | ApiError::NotFound(msg) => msg,
            ApiError::Forbidden => "You do not have permission to change this listing",
            // Internal details stay in the logs.
            ApiError::InternalError(_) => "Internal server error",
        }
    }
}

impl From<ApiError> for Reply {
    fn from(err: ApiError) -> Self {
        let status = err.status();
        Reply::Page {
            status,
            html: views::error_page(status, err.public_message()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}
