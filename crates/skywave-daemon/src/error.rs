//! Error types for catalog and playback.
//!
//! Neither kind crosses the async boundary as a hard failure: the catalog
//! browser and playback session turn them into a single user-facing message
//! on their state.

use thiserror::Error;

/// Failure of a remote catalog request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found")]
    NotFound,

    #[error("station directory unavailable")]
    ServerUnavailable,

    #[error("rate limited")]
    RateLimited,

    #[error("{0}")]
    Other(String),
}

impl CatalogError {
    /// Text shown to the user, or `None` when the failure should read as an
    /// empty result.
    pub fn user_message(&self) -> Option<String> {
        match self {
            CatalogError::NotFound => None,
            CatalogError::ServerUnavailable => Some(
                "The station directory is temporarily unavailable. Please try again.".to_string(),
            ),
            CatalogError::RateLimited => Some(
                "Too many requests to the station directory. Please wait a moment and try again."
                    .to_string(),
            ),
            CatalogError::InvalidRequest(reason) => Some(reason.clone()),
            CatalogError::Other(message) => Some(message.clone()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::ServerUnavailable | CatalogError::RateLimited
        )
    }

    /// Classify an HTTP status that is not a success.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            404 => CatalogError::NotFound,
            429 => CatalogError::RateLimited,
            400 | 422 => {
                let reason = body.trim();
                CatalogError::InvalidRequest(if reason.is_empty() {
                    format!("The station directory rejected the request (HTTP {})", status)
                } else {
                    reason.to_string()
                })
            }
            500..=599 => CatalogError::ServerUnavailable,
            _ => CatalogError::Other(format!("Unexpected response from station directory (HTTP {})", status)),
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            return CatalogError::ServerUnavailable;
        }
        if let Some(status) = e.status() {
            return CatalogError::from_status(status.as_u16(), "");
        }
        if e.is_decode() {
            return CatalogError::Other(format!("Could not read station directory response: {}", e));
        }
        CatalogError::Other(e.to_string())
    }
}

/// Failure of a `play()` request before any transport exists.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("Invalid station URL")]
    InvalidStreamUrl,

    #[error("{0}")]
    Transport(String),
}
