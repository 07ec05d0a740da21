//! Agent error types
//!
//! Each layer has its own `thiserror` enum; [`AgentError`] rolls them up and
//! classifies them into the three handling classes:
//!
//! | Class | Examples | Handling |
//! |-------|----------|----------|
//! | [`ErrorClass::Config`] | missing `locationId`, HTTP 401/403/404 | stop, never retried |
//! | [`ErrorClass::Transient`] | timeouts, printer offline | retried with capped backoff |
//! | [`ErrorClass::Data`] | malformed template or order | dead-lettered immediately |

use crate::client::FeedError;
use crate::printing::{QueueError, RenderError};
use crate::supervisor::ServiceError;
use crate::watcher::CursorError;
use crab_printer::PrintError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// How an error must be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Config,
    Transient,
    Data,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Config => write!(f, "config"),
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Data => write!(f, "data"),
        }
    }
}

/// Location config could not be loaded or saved (ConfigInvalid)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Location config not found at {0} (run `crab-print-agent setup` first)")]
    Missing(PathBuf),

    #[error("Cannot read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed location config {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid location config: {0}")]
    Invalid(String),

    #[error("Cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level agent error
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Print(#[from] PrintError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Cursor(#[from] CursorError),
}

impl AgentError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AgentError::Config(_) => ErrorClass::Config,
            AgentError::Feed(e) => e.class(),
            AgentError::Render(_) => ErrorClass::Data,
            AgentError::Queue(_) | AgentError::Print(_) => ErrorClass::Transient,
            AgentError::Service(e) => e.class(),
            AgentError::Cursor(e) => e.class(),
        }
    }

    pub fn is_config(&self) -> bool {
        self.class() == ErrorClass::Config
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
