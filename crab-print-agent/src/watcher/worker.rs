//! Order Feed Watcher
//!
//! Polls the central server on a fixed interval and hands each new order to
//! the print queue. The cursor moves forward one order at a time, only after
//! the order is durably enqueued, and never past an order of the same batch
//! that is still waiting, so a crash mid-batch re-delivers instead of
//! skipping.

use super::cursor::CursorStore;
use crate::client::{FeedError, OrderFeed};
use crate::core::{AgentResult, Backoff};
use crate::printing::JobQueue;
use shared::Order;
use shared::util::now_millis;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Orders surfaced by one poll
///
/// Lazy: orders at or below the cursor are skipped as the sequence is
/// consumed. Server order is preserved.
#[derive(Debug)]
pub struct NewOrders {
    orders: std::vec::IntoIter<Order>,
    after: u64,
    server_cursor: Option<u64>,
}

impl NewOrders {
    fn empty(after: u64) -> Self {
        Self {
            orders: Vec::new().into_iter(),
            after,
            server_cursor: None,
        }
    }

    /// Cursor the server reported with this page
    pub fn server_cursor(&self) -> Option<u64> {
        self.server_cursor
    }
}

impl Iterator for NewOrders {
    type Item = Order;

    fn next(&mut self) -> Option<Order> {
        let after = self.after;
        self.orders.find(|o| o.order_number > after)
    }
}

pub struct OrderWatcher {
    feed: Arc<dyn OrderFeed>,
    queue: JobQueue,
    cursor: CursorStore,
    last_order_number: u64,
    location_id: String,
    backoff: Backoff,
}

/// Highest cursor value allowed after each order of a batch
///
/// The cursor must stay below every order that comes later in the batch, so
/// an out-of-order batch only advances as far as its lowest pending order.
fn cursor_limits(orders: &[Order]) -> Vec<u64> {
    let mut limits = vec![u64::MAX; orders.len()];
    for i in (0..orders.len().saturating_sub(1)).rev() {
        let next = orders[i + 1].order_number.saturating_sub(1);
        limits[i] = limits[i + 1].min(next);
    }
    limits
}

impl OrderWatcher {
    /// Create a watcher positioned at the persisted cursor
    pub fn new(
        feed: Arc<dyn OrderFeed>,
        queue: JobQueue,
        cursor: CursorStore,
        location_id: impl Into<String>,
        poll_interval: Duration,
        backoff_max: Duration,
    ) -> AgentResult<Self> {
        let last_order_number = cursor.load()?;
        Ok(Self {
            feed,
            queue,
            cursor,
            last_order_number,
            location_id: location_id.into(),
            backoff: Backoff::new(poll_interval, backoff_max),
        })
    }

    /// Highest order number surfaced so far
    pub fn last_order_number(&self) -> u64 {
        self.last_order_number
    }

    /// Delay before the next poll
    pub fn next_delay(&self) -> Duration {
        self.backoff.current()
    }

    /// Ask the server for orders after the cursor
    ///
    /// Network and server failures are logged and yield an empty sequence;
    /// only fatal configuration errors are returned.
    pub async fn poll(&mut self) -> Result<NewOrders, FeedError> {
        let after = self.last_order_number;
        match self.feed.list_new_orders(after).await {
            Ok(batch) => {
                if self.backoff.failures() > 0 {
                    tracing::info!(
                        location_id = %self.location_id,
                        failures = self.backoff.failures(),
                        "Order feed reachable again"
                    );
                }
                self.backoff.reset();
                Ok(NewOrders {
                    orders: batch.orders.into_iter(),
                    after,
                    server_cursor: batch.cursor,
                })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                let delay = self.backoff.fail();
                tracing::warn!(
                    location_id = %self.location_id,
                    failures = self.backoff.failures(),
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Order poll failed"
                );
                Ok(NewOrders::empty(after))
            }
        }
    }

    /// One poll, enqueueing everything it surfaces
    ///
    /// Returns how many orders were new to the queue.
    pub async fn poll_once(&mut self) -> AgentResult<usize> {
        let orders = self.poll().await?;
        let server_cursor = orders.server_cursor();
        let orders: Vec<Order> = orders.collect();
        let limits = cursor_limits(&orders);
        let highest = orders.iter().map(|o| o.order_number).max();

        let mut enqueued = 0;
        for (order, limit) in orders.into_iter().zip(limits) {
            if self.enqueue(order, limit)? {
                enqueued += 1;
            }
        }

        // Whole batch is queued
        if let Some(highest) = highest {
            self.advance(highest)?;
        }
        if let Some(cursor) = server_cursor {
            self.advance(cursor)?;
        }
        Ok(enqueued)
    }

    /// Enqueue one order, then move the cursor no further than `limit`
    fn enqueue(&mut self, order: Order, limit: u64) -> AgentResult<bool> {
        let order_number = order.order_number;
        let outcome = self.queue.enqueue(order, now_millis())?;
        if outcome.is_new() {
            tracing::info!(
                order_number,
                location_id = %self.location_id,
                "New order queued for printing"
            );
        } else {
            tracing::debug!(order_number, outcome = ?outcome, "Order already known");
        }
        self.advance(order_number.min(limit))?;
        Ok(outcome.is_new())
    }

    fn advance(&mut self, order_number: u64) -> AgentResult<()> {
        if order_number > self.last_order_number {
            self.cursor.save(order_number)?;
            self.last_order_number = order_number;
        }
        Ok(())
    }

    /// Poll until shutdown
    ///
    /// Cancellation is honoured at any point, including mid-request.
    pub async fn run(mut self, shutdown: CancellationToken) -> AgentResult<()> {
        tracing::info!(
            location_id = %self.location_id,
            cursor = self.last_order_number,
            interval_ms = self.next_delay().as_millis() as u64,
            "Order watcher started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.poll_once() => {
                    result?;
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.next_delay()) => {}
            }
        }

        tracing::info!(cursor = self.last_order_number, "Order watcher stopped");
        Ok(())
    }
}
