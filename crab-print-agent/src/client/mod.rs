//! Central order service client
//!
//! - [`OrderFeed`] - the calls the agent makes (list orders, template, ack, logo)
//! - [`HttpOrderFeed`] - reqwest implementation with a bounded timeout
//! - [`TemplateCache`] - version-aware receipt template cache

pub mod error;
pub mod http;
pub mod template_cache;

pub use error::{FeedError, FeedResult};
pub use http::{HttpOrderFeed, OrderBatch, OrderFeed, TemplateFetch};
pub use template_cache::TemplateCache;
