use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A required collaborator or setting is missing at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key loading, encryption or decryption failed.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request carried a credential that did not resolve to a user,
    /// or a protected route was hit anonymously.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// A malformed request, e.g. a missing or invalid CSRF token.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A scoped cookie was requested outside the configured base domain.
    #[error("Domain {domain} is not within cookie domain {base}")]
    DomainScope { domain: String, base: String },

    /// A user store or OAuth exchange failure.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Shorthand for the 401 used by the authenticator chain.
    pub fn not_authorized() -> Self {
        AppError::NotAuthorized("not authorized".to_string())
    }

    /// The status code this error maps to at the HTTP edge.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotAuthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Crypto(_)
            | AppError::Io(_)
            | AppError::DomainScope { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<josekit::JoseError> for AppError {
    fn from(e: josekit::JoseError) -> Self {
        AppError::Crypto(e.to_string())
    }
}

impl From<garde::Report> for AppError {
    fn from(report: garde::Report) -> Self {
        AppError::Validation(report.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::NotAuthorized(ref msg) => {
                tracing::warn!("Not authorized: {}", msg);
                msg.clone()
            }

            AppError::BadRequest(ref msg) => {
                tracing::warn!("Bad request: {}", msg);
                msg.clone()
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                msg.clone()
            }

            AppError::Collaborator(ref msg) => {
                tracing::error!("Collaborator error: {}", msg);
                "Upstream service error".to_string()
            }

            AppError::Crypto(ref msg) => {
                tracing::error!("Crypto error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::DomainScope { ref domain, ref base } => {
                tracing::error!("Cookie domain {} outside of {}", domain, base);
                "Internal server error".to_string()
            }

            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                "Internal server error".to_string()
            }

            AppError::Config(ref msg) | AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, [(http::header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}
