//! Dead-letter log and manual reprint requests
//!
//! The log is append-only JSON lines, readable with any text tool. Reprint
//! requests are single files dropped by the operator CLI into a spool
//! directory; the dispatcher owns the queue database, so the CLI never opens
//! it while the service runs.

use super::storage::QueueResult;
use super::types::DeadLetter;
use crate::utils::fs::write_atomic;
use shared::Order;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// `dead_letters.jsonl`
#[derive(Debug, Clone)]
pub struct DeadLetterLog {
    path: PathBuf,
}

impl DeadLetterLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk
    pub fn append(&self, record: &DeadLetter) -> QueueResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.sync_data()?;
        Ok(())
    }

    /// All records, oldest first
    ///
    /// Lines that do not parse (e.g. a torn final write) are skipped.
    pub fn read_all(&self) -> QueueResult<Vec<DeadLetter>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    line = i + 1,
                    error = %e,
                    "Skipping unreadable dead-letter record"
                ),
            }
        }
        Ok(records)
    }

    /// Most recent record for an order
    pub fn find(&self, order_number: u64) -> QueueResult<Option<DeadLetter>> {
        Ok(self
            .read_all()?
            .into_iter()
            .rev()
            .find(|r| r.order.order_number == order_number))
    }
}

/// `reprint/<orderNumber>.json`
#[derive(Debug, Clone)]
pub struct ReprintSpool {
    dir: PathBuf,
}

impl ReprintSpool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Queue an order for reprint
    pub fn request(&self, order: &Order) -> QueueResult<PathBuf> {
        let path = self.dir.join(format!("{}.json", order.order_number));
        let bytes = serde_json::to_vec_pretty(order)?;
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Orders waiting to be reprinted, lowest order number first
    pub fn pending(&self) -> QueueResult<Vec<(PathBuf, Order)>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut pending = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            match serde_json::from_slice::<Order>(&bytes) {
                Ok(order) => pending.push((path, order)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Discarding malformed reprint request");
                    fs::remove_file(&path)?;
                }
            }
        }
        pending.sort_by_key(|(_, order)| order.order_number);
        Ok(pending)
    }

    /// Drop a handled request
    pub fn done(&self, path: &Path) -> QueueResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
