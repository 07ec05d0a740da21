//! Error types for the printer library

use std::fmt;
use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// Network connection error
    #[error("Connection failed: {0}")]
    Connection(String),

    /// IO error during printing
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Printer is offline or unreachable
    #[error("Printer offline: {0}")]
    Offline(String),

    /// No printer with that name/address
    #[error("Printer not found: {0}")]
    NotFound(String),

    /// Paper sensor reports the roll is empty
    #[error("Paper out: {0}")]
    PaperOut(String),

    /// Timeout waiting for printer
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// OS print spooler rejected the job
    #[error("Spooler error: {0}")]
    Spooler(String),

    /// Windows-specific printing error
    #[cfg(windows)]
    #[error("Windows printer error: {0}")]
    WindowsPrinter(String),
}

/// Coarse failure class reported to callers deciding on retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterFailure {
    Offline,
    NotFound,
    PaperOut,
    Unknown,
}

impl fmt::Display for PrinterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterFailure::Offline => write!(f, "offline"),
            PrinterFailure::NotFound => write!(f, "not_found"),
            PrinterFailure::PaperOut => write!(f, "paper_out"),
            PrinterFailure::Unknown => write!(f, "unknown"),
        }
    }
}

impl PrintError {
    /// Classify the error for retry decisions and operator logs
    pub fn failure(&self) -> PrinterFailure {
        match self {
            PrintError::Connection(_) | PrintError::Offline(_) | PrintError::Timeout(_) => {
                PrinterFailure::Offline
            }
            PrintError::NotFound(_) => PrinterFailure::NotFound,
            PrintError::PaperOut(_) => PrinterFailure::PaperOut,
            PrintError::Io(e) => match e.kind() {
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::TimedOut => PrinterFailure::Offline,
                _ => PrinterFailure::Unknown,
            },
            PrintError::InvalidConfig(_) | PrintError::Spooler(_) => PrinterFailure::Unknown,
            #[cfg(windows)]
            PrintError::WindowsPrinter(_) => PrinterFailure::Unknown,
        }
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
