//! redb-based durable print queue
//!
//! One database per location (`agent.redb`). Every state transition is a
//! single write transaction, so a crash leaves each job either before or
//! after the transition, never in between.

use super::types::{JobState, PrintJob};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use shared::Order;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Notify;

/// Jobs table: key = seq (FIFO order), value = JSON
const PRINT_JOBS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("print_jobs");

/// Index: order_number -> seq (live jobs only)
const PRINT_JOBS_BY_ORDER_TABLE: TableDefinition<u64, u64> =
    TableDefinition::new("print_jobs_by_order");

/// Printed marks: order_number -> printed_at (millis)
const PRINTED_ORDERS_TABLE: TableDefinition<u64, i64> = TableDefinition::new("printed_orders");

/// Counters
const QUEUE_META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("queue_meta");

const NEXT_SEQ_KEY: &str = "next_seq";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Print job not found: {0}")]
    JobNotFound(u64),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Result of [`JobQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued { seq: u64 },
    /// A live job for this order already exists
    AlreadyQueued,
    /// The order has a printed mark
    AlreadyPrinted,
}

impl EnqueueOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, EnqueueOutcome::Enqueued { .. })
    }
}

/// Durable FIFO print queue
///
/// Cheap to clone; clones share the database and the wake-up signal.
#[derive(Clone)]
pub struct JobQueue {
    db: Arc<Database>,
    notify: Arc<Notify>,
}

impl JobQueue {
    /// Open or create database
    pub fn open(path: impl AsRef<Path>) -> QueueResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> QueueResult<Self> {
        let db =
            Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> QueueResult<Self> {
        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PRINT_JOBS_TABLE)?;
            let _ = write_txn.open_table(PRINT_JOBS_BY_ORDER_TABLE)?;
            let _ = write_txn.open_table(PRINTED_ORDERS_TABLE)?;
            let _ = write_txn.open_table(QUEUE_META_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            notify: Arc::new(Notify::new()),
        })
    }

    /// Wait until something is enqueued
    ///
    /// A wake-up sent while nobody waits is kept for the next call.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }

    // ========== Enqueue ==========

    /// Add an order to the tail of the queue
    ///
    /// Idempotent on order number.
    pub fn enqueue(&self, order: Order, now: i64) -> QueueResult<EnqueueOutcome> {
        let order_number = order.order_number;
        let txn = self.db.begin_write()?;

        let outcome = {
            let printed = txn.open_table(PRINTED_ORDERS_TABLE)?;
            let mut idx_table = txn.open_table(PRINT_JOBS_BY_ORDER_TABLE)?;

            if printed.get(order_number)?.is_some() {
                EnqueueOutcome::AlreadyPrinted
            } else if idx_table.get(order_number)?.is_some() {
                EnqueueOutcome::AlreadyQueued
            } else {
                let seq = Self::next_seq(&txn)?;
                let job = PrintJob::new(seq, order, now);
                let value = serde_json::to_vec(&job)?;

                let mut table = txn.open_table(PRINT_JOBS_TABLE)?;
                table.insert(seq, value.as_slice())?;
                idx_table.insert(order_number, seq)?;
                EnqueueOutcome::Enqueued { seq }
            }
        };

        txn.commit()?;

        if outcome.is_new() {
            self.notify.notify_one();
        }
        Ok(outcome)
    }

    fn next_seq(txn: &WriteTransaction) -> QueueResult<u64> {
        let mut meta = txn.open_table(QUEUE_META_TABLE)?;
        let seq = meta.get(NEXT_SEQ_KEY)?.map(|g| g.value()).unwrap_or(1);
        meta.insert(NEXT_SEQ_KEY, seq + 1)?;
        Ok(seq)
    }

    // ========== Reads ==========

    /// Oldest live job
    pub fn head(&self) -> QueueResult<Option<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINT_JOBS_TABLE)?;

        match table.first()? {
            Some((_, guard)) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn get(&self, seq: u64) -> QueueResult<Option<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINT_JOBS_TABLE)?;

        match table.get(seq)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Live job for an order, if any
    pub fn find_by_order(&self, order_number: u64) -> QueueResult<Option<PrintJob>> {
        let seq = {
            let read_txn = self.db.begin_read()?;
            let idx_table = read_txn.open_table(PRINT_JOBS_BY_ORDER_TABLE)?;
            idx_table.get(order_number)?.map(|g| g.value())
        };
        match seq {
            Some(seq) => self.get(seq),
            None => Ok(None),
        }
    }

    /// All live jobs in FIFO order
    pub fn jobs(&self) -> QueueResult<Vec<PrintJob>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINT_JOBS_TABLE)?;

        let mut jobs = Vec::new();
        for result in table.iter()? {
            let (_, guard) = result?;
            jobs.push(serde_json::from_slice(guard.value())?);
        }
        Ok(jobs)
    }

    pub fn is_printed(&self, order_number: u64) -> QueueResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRINTED_ORDERS_TABLE)?;
        Ok(table.get(order_number)?.is_some())
    }

    // ========== Transitions ==========

    /// Overwrite a live job
    pub fn save(&self, job: &PrintJob) -> QueueResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(PRINT_JOBS_TABLE)?;
            if table.get(job.seq)?.is_none() {
                return Err(QueueError::JobNotFound(job.seq));
            }
            let value = serde_json::to_vec(job)?;
            table.insert(job.seq, value.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Return jobs interrupted mid-print to `Queued`
    ///
    /// Attempts are left untouched.
    pub fn recover_printing(&self) -> QueueResult<usize> {
        let txn = self.db.begin_write()?;
        let recovered = {
            let mut table = txn.open_table(PRINT_JOBS_TABLE)?;

            let mut interrupted = Vec::new();
            for result in table.iter()? {
                let (_, guard) = result?;
                let job: PrintJob = serde_json::from_slice(guard.value())?;
                if job.state == JobState::Printing {
                    interrupted.push(job);
                }
            }

            for job in &mut interrupted {
                job.state = JobState::Queued;
                let value = serde_json::to_vec(&*job)?;
                table.insert(job.seq, value.as_slice())?;
                tracing::warn!(
                    order_number = job.order_number(),
                    attempt = job.attempts,
                    "Recovered print job interrupted mid-print"
                );
            }
            interrupted.len()
        };
        txn.commit()?;
        Ok(recovered)
    }

    /// Remove a printed job and record its printed mark
    pub fn complete(&self, seq: u64, printed_at: i64) -> QueueResult<()> {
        let txn = self.db.begin_write()?;
        {
            let job = Self::take(&txn, seq)?;
            let mut printed = txn.open_table(PRINTED_ORDERS_TABLE)?;
            printed.insert(job.order_number(), printed_at)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Remove a job without marking it printed (dead-lettered)
    pub fn remove(&self, seq: u64) -> QueueResult<PrintJob> {
        let txn = self.db.begin_write()?;
        let job = Self::take(&txn, seq)?;
        txn.commit()?;
        Ok(job)
    }

    fn take(txn: &WriteTransaction, seq: u64) -> QueueResult<PrintJob> {
        let mut table = txn.open_table(PRINT_JOBS_TABLE)?;
        let mut idx_table = txn.open_table(PRINT_JOBS_BY_ORDER_TABLE)?;

        let bytes = {
            let value = table.remove(seq)?.ok_or(QueueError::JobNotFound(seq))?;
            value.value().to_vec()
        };
        let job: PrintJob = serde_json::from_slice(&bytes)?;
        idx_table.remove(job.order_number())?;
        Ok(job)
    }

    // ========== Cleanup ==========

    /// Drop printed marks older than `cutoff` (millis)
    pub fn purge_printed(&self, cutoff: i64) -> QueueResult<usize> {
        let txn = self.db.begin_write()?;
        let purged = {
            let mut table = txn.open_table(PRINTED_ORDERS_TABLE)?;

            let mut to_delete = Vec::new();
            for result in table.iter()? {
                let (key, value) = result?;
                if value.value() < cutoff {
                    to_delete.push(key.value());
                }
            }
            for order_number in &to_delete {
                table.remove(*order_number)?;
            }
            to_delete.len()
        };
        txn.commit()?;
        Ok(purged)
    }
}
