use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    /// A referenced row does not exist (includes foreign-key violations).
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File upload failed: {0}")]
    UploadFailed(String),

    #[error("Storage backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Response from {0} had an empty body")]
    EmptyBody(String),
    #[error("Fetching {0} is not possible: {1}")]
    Unavailable(String, String),
}

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Could not decode template image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Could not encode meme image: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Token is invalid or expired: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("Expected a {expected} token")]
    WrongType { expected: &'static str },
    #[error("Token subject is not a user id")]
    BadSubject,
    #[error("Could not sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Client errors
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // Infrastructure failures
    #[error("Repository operation failed")]
    RepositoryError(#[source] RepoError),
    #[error("File storage operation failed")]
    StorageError(#[source] StorageError),
    #[error("Image composition failed")]
    ComposeError(#[source] ComposeError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    /// Status code table for every error kind.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::RepositoryError(_)
            | AppError::StorageError(_)
            | AppError::ComposeError(_)
            | AppError::ConfigError(_)
            | AppError::InitError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => AppError::NotFound(what),
            // Integrity violations are the client's fault, never a raw storage failure.
            RepoError::Conflict(what) => AppError::BadRequest(what),
            e @ RepoError::BackendError(_) => AppError::RepositoryError(e),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::StorageError(err)
    }
}

impl From<ComposeError> for AppError {
    fn from(err: ComposeError) -> Self {
        AppError::ComposeError(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(e) => AppError::InternalServerError(format!("token signing failed: {}", e)),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InitError(err.to_string())
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            match &self {
                AppError::RepositoryError(e) => tracing::error!(error.source = ?e, "Repository error occurred"),
                AppError::StorageError(e) => tracing::error!(error.source = ?e, "Storage error occurred"),
                AppError::ComposeError(e) => tracing::error!(error.source = ?e, "Image composition error occurred"),
                other => tracing::error!(error.detail = %other, "Internal error occurred"),
            }
        } else {
            tracing::debug!(error.detail = %self, error.status = %status, "Rejecting request");
        }

        // Status only; error details stay in the logs.
        status.into_response()
    }
}
