//! Shared types for the Crab print agent
//!
//! Wire models exchanged with the central order service and persisted by the
//! agent: location identity, receipt templates and orders.

pub mod models;
pub mod util;

// Re-exports
pub use models::{
    ContactInfo, Customer, Discount, FontSizes, LocationConfig, Margins, Order, OrderItem,
    ReceiptTemplate,
};
pub use serde::{Deserialize, Serialize};
