//! Order feed watcher and its persisted cursor

pub mod cursor;
pub mod worker;

pub use cursor::{Cursor, CursorError, CursorStore};
pub use worker::{NewOrders, OrderWatcher};
