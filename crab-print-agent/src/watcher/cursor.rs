//! Persisted watcher cursor (`cursor.json`)

use crate::core::ErrorClass;
use crate::utils::fs::write_atomic;
use serde::{Deserialize, Serialize};
use shared::util::now_millis;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CursorError {
    #[error("Cursor file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Refuse to guess a position from a damaged file
    #[error("Malformed cursor file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CursorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CursorError::Io { .. } => ErrorClass::Transient,
            CursorError::Malformed { .. } => ErrorClass::Config,
        }
    }
}

/// On-disk form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    /// Highest order number already surfaced
    pub last_order_number: u64,
    /// Millis
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last surfaced order number, 0 on first run
    pub fn load(&self) -> Result<u64, CursorError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CursorError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let cursor: Cursor =
            serde_json::from_slice(&bytes).map_err(|source| CursorError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        Ok(cursor.last_order_number)
    }

    pub fn save(&self, last_order_number: u64) -> Result<(), CursorError> {
        let cursor = Cursor {
            last_order_number,
            updated_at: now_millis(),
        };
        let json = serde_json::to_vec_pretty(&cursor).map_err(|source| CursorError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &json).map_err(|source| CursorError::Io {
            path: self.path.clone(),
            source,
        })
    }
}
