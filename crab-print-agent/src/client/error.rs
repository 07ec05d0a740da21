//! Order feed error types

use crate::core::ErrorClass;
use thiserror::Error;

/// Central server call failed
#[derive(Debug, Error)]
pub enum FeedError {
    /// 401/403/404: wrong location id or access refused
    #[error("Location rejected by server (HTTP {status}): {url}")]
    Fatal { status: u16, url: String },

    /// Server URL cannot be parsed
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// 5xx
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// 408/429: server asked us to slow down or try again
    #[error("Server busy (HTTP {status}): {message}")]
    Throttled { status: u16, message: String },

    /// Other 4xx
    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl FeedError {
    /// Class of this error for template fetches
    ///
    /// The watcher treats every non-fatal error as transient.
    pub fn class(&self) -> ErrorClass {
        match self {
            FeedError::Fatal { .. } | FeedError::InvalidUrl(_) => ErrorClass::Config,
            FeedError::Timeout(_)
            | FeedError::Network(_)
            | FeedError::Server { .. }
            | FeedError::Throttled { .. } => ErrorClass::Transient,
            FeedError::Rejected { .. } | FeedError::InvalidResponse(_) => ErrorClass::Data,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Config
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(|u| u.to_string()).unwrap_or_default();
        if e.is_timeout() {
            FeedError::Timeout(url)
        } else if e.is_decode() {
            FeedError::InvalidResponse(e.to_string())
        } else {
            FeedError::Network(e.to_string())
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
