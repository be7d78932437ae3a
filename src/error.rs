//! Error handling

use axum::response::IntoResponse;
use tracing::info;

use crate::images::ImageKind;

/// Everything that can go wrong while handling a turn or a request.
#[derive(Debug)]
pub enum BotError {
    /// Network failure, or a remote answered with a non-success status
    Transport(String),
    /// The picture wasn't something we can caption
    UnsupportedFormat(ImageKind),
    /// A caption arrived for a sender with no pending picture
    MissingSession(String),
    /// Reading, writing or deleting local files failed
    Filesystem(std::io::Error),
    /// Decoding, drawing or encoding a picture failed
    Image(String),
    /// Startup configuration is invalid
    Config(String),
    /// When you didn't do the right thing
    BadRequest,
    /// Webhook verification token mismatch
    Forbidden,
    /// When a requested resource is not found
    NotFound(String),
}

impl std::fmt::Display for BotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "Transport error: {message}"),
            Self::UnsupportedFormat(kind) => write!(f, "Unsupported image format: {kind}"),
            Self::MissingSession(sender) => write!(f, "No pending image for sender {sender}"),
            Self::Filesystem(err) => write!(f, "Filesystem error: {err}"),
            Self::Image(message) => write!(f, "Image error: {message}"),
            Self::Config(message) => write!(f, "Configuration error: {message}"),
            Self::BadRequest => write!(f, "Bad request"),
            Self::Forbidden => write!(f, "Forbidden"),
            Self::NotFound(what) => write!(f, "Not found: {what}"),
        }
    }
}

impl std::error::Error for BotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Filesystem(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Filesystem(err)
    }
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        BotError::Transport(err.to_string())
    }
}

impl From<image::ImageError> for BotError {
    fn from(err: image::ImageError) -> Self {
        BotError::Image(err.to_string())
    }
}

impl From<url::ParseError> for BotError {
    fn from(err: url::ParseError) -> Self {
        BotError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for BotError {
    fn from(err: tokio::task::JoinError) -> Self {
        BotError::Image(format!("image task failed: {err}"))
    }
}

impl IntoResponse for BotError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            BotError::BadRequest => {
                info!("Bad request received");
                (axum::http::StatusCode::BAD_REQUEST, "Bad Request")
            }
            BotError::Forbidden => {
                info!("Webhook verification failed");
                (axum::http::StatusCode::FORBIDDEN, "Forbidden")
            }
            BotError::NotFound(what) => {
                info!("404 {what}");
                (axum::http::StatusCode::NOT_FOUND, "Not Found")
            }
            other => {
                tracing::error!("Internal server error: {}", other);
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                )
            }
        };
        let mut response = axum::response::Response::new(axum::body::Body::from(body));
        *response.status_mut() = status;
        response
    }
}
