//! Receipt printing
//!
//! - [`ReceiptRenderer`] - order + template → [`ReceiptDocument`] (pure)
//! - [`encoder`] - document → ESC/POS bytes
//! - [`JobQueue`] - durable FIFO queue (redb)
//! - [`PrintDispatcher`] - drains the queue with retries and dead letters

pub mod dead_letter;
pub mod dispatcher;
pub mod encoder;
pub mod layout;
pub mod money;
pub mod renderer;
pub mod storage;
pub mod types;

pub use dead_letter::{DeadLetterLog, ReprintSpool};
pub use dispatcher::{Attempt, DrainStep, PrintDispatcher, RetryPolicy};
pub use renderer::{ReceiptRenderer, RenderError};
pub use storage::{EnqueueOutcome, JobQueue, QueueError, QueueResult};
pub use types::*;
