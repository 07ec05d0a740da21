//! Core agent infrastructure: configuration, errors, backoff and task management

pub mod backoff;
pub mod config;
pub mod error;
pub mod tasks;

pub use backoff::Backoff;
pub use config::{AgentSettings, ConfigStore};
pub use error::{AgentError, AgentResult, ConfigError, ErrorClass};
pub use tasks::{BackgroundTasks, TaskExit, TaskKind};
