//! Data models
//!
//! Shared between the print agent and the central order service (via API).
//! Wire format is camelCase JSON.

pub mod location;
pub mod order;
pub mod receipt_template;

// Re-exports
pub use location::*;
pub use order::*;
pub use receipt_template::*;
