//! In-test order feed and printer

#![allow(dead_code)]

use async_trait::async_trait;
use crab_print_agent::AgentSettings;
use crab_print_agent::client::{FeedError, FeedResult, OrderBatch, OrderFeed, TemplateFetch};
use crab_printer::{Charset, PrintError, PrintResult, Printer};
use rust_decimal::Decimal;
use shared::{Customer, Discount, LocationConfig, Order, OrderItem, ReceiptTemplate};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

pub const LOCATION_ID: &str = "kadikoy-01";

pub fn settings(dir: &Path) -> AgentSettings {
    AgentSettings {
        work_dir: dir.to_path_buf(),
        log_level: "debug".into(),
        request_timeout_ms: 1_000,
        poll_backoff_max_ms: 100,
        print_max_retries: 3,
        print_retry_base_ms: 1,
        print_retry_max_ms: 4,
        restart_delay_ms: 1,
        max_restarts: 2,
        restart_window_secs: 300,
        printed_retention_days: 14,
        printer_charset: Charset::Wpc1254,
    }
}

pub fn location() -> LocationConfig {
    LocationConfig {
        location_id: LOCATION_ID.into(),
        location_name: "Kadıköy".into(),
        server_url: "http://orders.invalid".into(),
        poll_interval_ms: 10,
        printer_name: "tcp://127.0.0.1:9100".into(),
    }
}

fn money(v: i64) -> Decimal {
    Decimal::new(v, 0)
}

/// Burger x2 at 75.00, 20.00 off with YENI20
pub fn order(n: u64) -> Order {
    Order {
        order_number: n,
        timestamp: chrono::DateTime::parse_from_rfc3339("2026-03-01T12:30:00+03:00").unwrap(),
        customer: Customer {
            name: "Ayşe Yılmaz".into(),
            phone: Some("+90 555 000 0000".into()),
            address: None,
        },
        items: vec![OrderItem {
            name: "Burger".into(),
            variant_name: None,
            unit_price: money(75),
            quantity: 2,
            subtotal: money(150),
        }],
        subtotal: money(150),
        discount: Some(Discount {
            amount: money(20),
            coupon_code: Some("YENI20".into()),
        }),
        total: money(130),
        notes: None,
    }
}

pub fn template() -> ReceiptTemplate {
    ReceiptTemplate {
        version: 1,
        location_id: LOCATION_ID.into(),
        ..Default::default()
    }
}

// ========== Feed ==========

/// Order feed that replays every order it holds, whatever the cursor
#[derive(Default)]
pub struct MockFeed {
    pub orders: Mutex<Vec<Order>>,
    pub server_cursor: Mutex<Option<u64>>,
    /// Network failures to return before answering
    pub failures: AtomicU32,
    /// Answer every call with 404
    pub fatal: AtomicBool,
    /// Template fetches to answer with 429 before serving the template
    pub template_throttles: AtomicU32,
    pub polls: Mutex<Vec<u64>>,
    pub acks: Mutex<Vec<u64>>,
}

impl MockFeed {
    pub fn with_orders(orders: Vec<Order>) -> Self {
        Self {
            orders: Mutex::new(orders),
            ..Default::default()
        }
    }

    pub fn acks(&self) -> Vec<u64> {
        self.acks.lock().unwrap().clone()
    }

    pub fn polls(&self) -> Vec<u64> {
        self.polls.lock().unwrap().clone()
    }

    fn check(&self) -> FeedResult<()> {
        if self.fatal.load(Ordering::SeqCst) {
            return Err(FeedError::Fatal {
                status: 404,
                url: format!("http://orders.invalid/api/print-agent/locations/{LOCATION_ID}"),
            });
        }
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(FeedError::Network("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderFeed for MockFeed {
    async fn list_new_orders(&self, after: u64) -> FeedResult<OrderBatch> {
        self.polls.lock().unwrap().push(after);
        self.check()?;
        Ok(OrderBatch {
            orders: self.orders.lock().unwrap().clone(),
            cursor: *self.server_cursor.lock().unwrap(),
        })
    }

    async fn fetch_template(&self, cached_version: Option<u32>) -> FeedResult<TemplateFetch> {
        if self.fatal.load(Ordering::SeqCst) {
            return Err(FeedError::Fatal {
                status: 404,
                url: "http://orders.invalid/receipt-template".into(),
            });
        }
        let left = self.template_throttles.load(Ordering::SeqCst);
        if left > 0 {
            self.template_throttles.store(left - 1, Ordering::SeqCst);
            return Err(FeedError::Throttled {
                status: 429,
                message: "slow down".into(),
            });
        }
        let template = template();
        if cached_version == Some(template.version) {
            return Ok(TemplateFetch::NotModified);
        }
        Ok(TemplateFetch::Updated(template))
    }

    async fn acknowledge(&self, order_number: u64) -> FeedResult<()> {
        self.acks.lock().unwrap().push(order_number);
        Ok(())
    }

    async fn fetch_logo(&self, url: &str) -> FeedResult<Vec<u8>> {
        Err(FeedError::Rejected {
            status: 404,
            message: url.to_string(),
        })
    }
}

// ========== Printer ==========

#[derive(Default)]
pub struct MockPrinter {
    /// Fail every job as offline
    pub offline: AtomicBool,
    /// Offline failures before jobs go through
    pub failures: AtomicU32,
    /// Panic on every job
    pub explode: AtomicBool,
    pub attempts: AtomicU32,
    pub printed: Mutex<Vec<Vec<u8>>>,
}

impl MockPrinter {
    pub fn offline() -> Self {
        let printer = Self::default();
        printer.offline.store(true, Ordering::SeqCst);
        printer
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn printed(&self) -> Vec<Vec<u8>> {
        self.printed.lock().unwrap().clone()
    }

    /// Printed jobs containing `needle`
    pub fn count_containing(&self, needle: &[u8]) -> usize {
        self.printed
            .lock()
            .unwrap()
            .iter()
            .filter(|job| job.windows(needle.len()).any(|w| w == needle))
            .count()
    }
}

#[async_trait]
impl Printer for MockPrinter {
    fn describe(&self) -> String {
        "mock printer".into()
    }

    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.explode.load(Ordering::SeqCst) {
            panic!("printer driver crashed");
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(PrintError::Offline("mock printer".into()));
        }
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(PrintError::PaperOut("mock printer".into()));
        }
        self.printed.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn is_online(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }
}

/// Poll `check` until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
