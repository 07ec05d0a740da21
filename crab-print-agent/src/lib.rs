//! # crab-print-agent
//!
//! On-premises print agent: one instance per restaurant location.
//!
//! ## Pipeline
//!
//! ```text
//! ConfigStore ─► OrderWatcher ─► JobQueue ─► PrintDispatcher ─► Printer
//!                 (poll loop)     (redb)      (drain loop)
//! ```
//!
//! - [`watcher`] polls the central order service and enqueues new orders
//! - [`printing`] renders receipts and delivers them one at a time
//! - [`supervisor`] restarts the pipeline on crashes and registers the OS service

pub mod cli;
pub mod client;
pub mod core;
pub mod printing;
pub mod supervisor;
pub mod utils;
pub mod watcher;

pub use crate::core::{AgentError, AgentSettings, ConfigError, ConfigStore, ErrorClass};
