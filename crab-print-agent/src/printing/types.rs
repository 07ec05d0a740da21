//! Print job and receipt document types

use serde::{Deserialize, Serialize};
use shared::{Order, ReceiptTemplate};
use std::fmt;

// ========== Print Jobs ==========

/// Job lifecycle
///
/// ```text
/// Queued ─► Printing ─► Done
///    ▲          │
///    └─ Failed ◄┘ ─► DeadLettered (attempts == max)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Queued,
    Printing,
    Done,
    Failed,
    DeadLettered,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Printing => "printing",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::DeadLettered => "deadLettered",
        };
        f.write_str(s)
    }
}

/// One order waiting to be printed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintJob {
    /// Queue position (FIFO key)
    pub seq: u64,
    pub order: Order,
    /// Template used for the last render, resolved at dispatch
    #[serde(default)]
    pub template: Option<ReceiptTemplate>,
    /// Failed attempts so far
    pub attempts: u32,
    pub state: JobState,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Millis
    pub enqueued_at: i64,
    /// Retry deadline (millis), 0 when ready
    #[serde(default)]
    pub not_before: i64,
}

impl PrintJob {
    pub fn new(seq: u64, order: Order, now: i64) -> Self {
        Self {
            seq,
            order,
            template: None,
            attempts: 0,
            state: JobState::Queued,
            last_error: None,
            enqueued_at: now,
            not_before: 0,
        }
    }

    pub fn order_number(&self) -> u64 {
        self.order.order_number
    }
}

/// Why a job was parked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeadLetterReason {
    RetriesExhausted,
    RenderFailed,
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadLetterReason::RetriesExhausted => write!(f, "retries exhausted"),
            DeadLetterReason::RenderFailed => write!(f, "render failed"),
        }
    }
}

/// Dead-letter log record (one JSON line each)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub order: Order,
    #[serde(default)]
    pub template: Option<ReceiptTemplate>,
    pub attempts: u32,
    pub reason: DeadLetterReason,
    pub last_error: String,
    pub location_id: String,
    /// Millis
    pub dead_lettered_at: i64,
}

// ========== Receipt Document ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Font-size class from the template's size table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontClass {
    Title,
    #[default]
    Normal,
    Bold,
    Small,
}

/// What a line is, beyond its text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LineKind {
    #[default]
    Text,
    Separator,
    /// Logo image placeholder (URL)
    Logo(String),
    /// QR code placeholder (payload)
    QrCode(String),
    /// CODE128 barcode placeholder (payload)
    Barcode(String),
}

/// One physical receipt line
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReceiptLine {
    pub text: String,
    pub align: Align,
    pub font: FontClass,
    /// Printed with double character width
    pub double_width: bool,
    pub kind: LineKind,
}

impl ReceiptLine {
    /// Width in printer columns
    pub fn printed_width(&self) -> usize {
        let chars = self.text.chars().count();
        if self.double_width { chars * 2 } else { chars }
    }

    pub fn is_bold(&self) -> bool {
        matches!(self.font, FontClass::Bold | FontClass::Title)
    }
}

/// Rendered receipt, ready for encoding
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReceiptDocument {
    /// Character columns at normal width
    pub columns: usize,
    pub lines: Vec<ReceiptLine>,
    /// Blank lines before the first line
    pub feed_top: u32,
    /// Blank lines before the cut
    pub feed_bottom: u32,
    pub left_margin_mm: u32,
    pub line_spacing: f32,
}

impl ReceiptDocument {
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|l| l.text.as_str())
    }
}
