//! # crab-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command building
//! - Code page encoding (WPC1254 for Turkish receipts, GBK, plain ASCII)
//! - Network printing (TCP port 9100) with paper sensor check
//! - OS spooler printing (`lp` on Unix, Win32 driver on Windows)
//! - Logo rasterising
//!
//! Business logic (WHAT to print) stays in the agent:
//! - Receipt layout → crab-print-agent
//!
//! ## Example
//!
//! ```ignore
//! use crab_printer::{Charset, EscPosBuilder, PrinterTarget};
//! use std::time::Duration;
//!
//! let mut builder = EscPosBuilder::new(48, Charset::Wpc1254);
//! builder.center();
//! builder.double_size();
//! builder.line("Sipariş #1042");
//! builder.reset_size();
//! builder.left();
//! builder.line("2x Burger          150.00");
//! builder.cut_feed(3);
//!
//! let printer = PrinterTarget::parse("tcp://192.168.1.100:9100")?.open(Duration::from_secs(5));
//! printer.print(&builder.build()).await?;
//! ```

mod encoding;
mod error;
mod escpos;
mod printer;

// Re-exports
pub use encoding::Charset;
pub use error::{PrintError, PrintResult, PrinterFailure};
pub use escpos::EscPosBuilder;
pub use printer::{NetworkPrinter, Printer, PrinterTarget, DEFAULT_PRINTER_PORT};

#[cfg(feature = "image")]
pub use escpos::rasterize_logo;

#[cfg(not(windows))]
pub use printer::SpoolerPrinter;

#[cfg(windows)]
pub use printer::WindowsPrinter;
