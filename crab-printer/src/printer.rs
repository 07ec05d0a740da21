//! Printer adapters for sending ESC/POS data
//!
//! Supports:
//! - Network printers (TCP port 9100)
//! - OS spooler queues (`lp -o raw` on Unix)
//! - Windows driver printers (via Win32 API)

use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// Raw printing port most thermal printers listen on
pub const DEFAULT_PRINTER_PORT: u16 = 9100;

/// Trait for printer adapters
#[async_trait]
pub trait Printer: Send + Sync {
    /// Human-readable identifier for logs
    fn describe(&self) -> String;

    /// Send raw ESC/POS data to the printer
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Where a configured printer name points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterTarget {
    /// Raw TCP printer
    Network { host: String, port: u16 },
    /// Named OS printer queue
    Queue(String),
}

impl PrinterTarget {
    /// Parse a printer identifier
    ///
    /// - `tcp://host[:port]` → network printer (default port 9100)
    /// - `host:port` → network printer
    /// - anything else → OS printer queue name
    pub fn parse(name: &str) -> PrintResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PrintError::InvalidConfig("printer name is empty".to_string()));
        }

        if let Some(rest) = name.strip_prefix("tcp://") {
            let rest = rest.trim_end_matches('/');
            return match rest.rsplit_once(':') {
                Some((host, port)) => Self::network(host, port)
                    .ok_or_else(|| PrintError::InvalidConfig(format!("Invalid address: {}", name))),
                None if !rest.is_empty() => Ok(PrinterTarget::Network {
                    host: rest.to_string(),
                    port: DEFAULT_PRINTER_PORT,
                }),
                None => Err(PrintError::InvalidConfig(format!("Invalid address: {}", name))),
            };
        }

        if !name.contains(char::is_whitespace)
            && name.matches(':').count() == 1
            && let Some((host, port)) = name.split_once(':')
            && let Some(target) = Self::network(host, port)
        {
            return Ok(target);
        }

        Ok(PrinterTarget::Queue(name.to_string()))
    }

    fn network(host: &str, port: &str) -> Option<Self> {
        let port: u16 = port.parse().ok()?;
        if host.is_empty() || port == 0 {
            return None;
        }
        Some(PrinterTarget::Network {
            host: host.to_string(),
            port,
        })
    }

    /// Build the adapter for this target
    pub fn open(&self, timeout: Duration) -> Arc<dyn Printer> {
        match self {
            PrinterTarget::Network { host, port } => {
                Arc::new(NetworkPrinter::new(host, *port).with_timeout(timeout))
            }
            #[cfg(not(windows))]
            PrinterTarget::Queue(name) => Arc::new(SpoolerPrinter::new(name).with_timeout(timeout)),
            #[cfg(windows)]
            PrinterTarget::Queue(name) => Arc::new(WindowsPrinter::new(name)),
        }
    }
}

/// Network printer (TCP port 9100)
///
/// Most thermal printers support raw TCP printing on port 9100.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    host: String,
    port: u16,
    timeout: Duration,
}

impl NetworkPrinter {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout: Duration::from_secs(5),
        }
    }

    /// Set connection/write timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the printer address
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn connect(&self) -> PrintResult<TcpStream> {
        tokio::time::timeout(self.timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", self.addr())))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.addr(), e)))
    }

    /// Ask the paper roll sensor for its state (DLE EOT 4)
    ///
    /// Printers that don't answer are assumed to have paper.
    async fn paper_out(&self, stream: &mut TcpStream) -> bool {
        if stream.write_all(&[0x10, 0x04, 0x04]).await.is_err() {
            return false;
        }
        let mut status = [0u8; 1];
        match tokio::time::timeout(Duration::from_millis(300), stream.read(&mut status)).await {
            // bits 5 and 6: paper roll end detected
            Ok(Ok(1)) => status[0] & 0x60 == 0x60,
            _ => {
                debug!("Printer did not answer paper status query");
                false
            }
        }
    }
}

#[async_trait]
impl Printer for NetworkPrinter {
    fn describe(&self) -> String {
        format!("tcp://{}", self.addr())
    }

    #[instrument(skip(self, data), fields(addr = %self.addr(), data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let mut stream = self.connect().await?;

        if self.paper_out(&mut stream).await {
            return Err(PrintError::PaperOut(self.addr()));
        }

        tokio::time::timeout(self.timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| PrintError::Timeout(format!("Write timeout: {}", self.addr())))??;

        info!("Print job sent");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        let check_timeout = Duration::from_millis(500);

        match tokio::time::timeout(check_timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(addr = %self.addr(), error = %e, "Printer offline");
                false
            }
            Err(_) => {
                warn!(addr = %self.addr(), "Printer check timeout");
                false
            }
        }
    }
}

/// OS spooler printer (CUPS `lp`)
///
/// Data is submitted with `-o raw` so the driver passes ESC/POS through.
#[cfg(not(windows))]
#[derive(Debug, Clone)]
pub struct SpoolerPrinter {
    queue: String,
    timeout: Duration,
}

#[cfg(not(windows))]
impl SpoolerPrinter {
    pub fn new(queue: &str) -> Self {
        Self {
            queue: queue.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn classify_stderr(&self, stderr: &str) -> PrintError {
        let lower = stderr.to_lowercase();
        if lower.contains("does not exist") || lower.contains("unknown destination") {
            PrintError::NotFound(self.queue.clone())
        } else if lower.contains("not accepting") || lower.contains("disabled") {
            PrintError::Offline(self.queue.clone())
        } else {
            PrintError::Spooler(stderr.trim().to_string())
        }
    }
}

#[cfg(not(windows))]
#[async_trait]
impl Printer for SpoolerPrinter {
    fn describe(&self) -> String {
        format!("lp:{}", self.queue)
    }

    #[instrument(skip(self, data), fields(queue = %self.queue, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        use std::process::Stdio;
        use tokio::process::Command;

        let mut child = Command::new("lp")
            .args(["-d", &self.queue, "-o", "raw"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PrintError::Spooler(format!("failed to run lp: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(data).await?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| PrintError::Timeout(format!("lp timeout: {}", self.queue)))??;

        if output.status.success() {
            info!("Print job spooled");
            Ok(())
        } else {
            Err(self.classify_stderr(&String::from_utf8_lossy(&output.stderr)))
        }
    }

    async fn is_online(&self) -> bool {
        match tokio::process::Command::new("lpstat")
            .args(["-p", &self.queue])
            .output()
            .await
        {
            Ok(out) if out.status.success() => {
                !String::from_utf8_lossy(&out.stdout).contains("disabled")
            }
            _ => false,
        }
    }
}

/// Windows driver printer
///
/// Uses Win32 API to print through installed printer drivers.
#[cfg(windows)]
#[derive(Debug, Clone)]
pub struct WindowsPrinter {
    name: String,
}

#[cfg(windows)]
impl WindowsPrinter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    /// Read the spooler status bits; `None` if the printer cannot be opened
    fn status_bits(name: &str) -> Option<u32> {
        use windows::Win32::Graphics::Printing::{
            ClosePrinter, GetPrinterW, OpenPrinterW, PRINTER_HANDLE, PRINTER_INFO_6,
        };
        use windows::core::PCWSTR;

        unsafe {
            let mut handle = PRINTER_HANDLE::default();
            let name_w = Self::to_wide(name);
            OpenPrinterW(PCWSTR::from_raw(name_w.as_ptr()), &mut handle, None).ok()?;

            let mut needed: u32 = 0;
            let _ = GetPrinterW(handle, 6, None, &mut needed);
            let mut status = 0;
            if needed > 0 {
                let mut buf: Vec<u8> = vec![0; needed as usize];
                if GetPrinterW(handle, 6, Some(buf.as_mut_slice()), &mut needed).is_ok() {
                    status = (*(buf.as_ptr() as *const PRINTER_INFO_6)).dwStatus;
                }
            }
            let _ = ClosePrinter(handle);
            Some(status)
        }
    }

    fn write_raw(&self, data: &[u8]) -> PrintResult<()> {
        use core::ffi::c_void;
        use windows::Win32::Graphics::Printing::{
            ClosePrinter, DOC_INFO_1W, EndDocPrinter, EndPagePrinter, OpenPrinterW, PRINTER_HANDLE,
            PRINTER_STATUS_OFFLINE, PRINTER_STATUS_PAPER_OUT, StartDocPrinterW, StartPagePrinter,
            WritePrinter,
        };
        use windows::core::{PCWSTR, PWSTR};

        let status = Self::status_bits(&self.name)
            .ok_or_else(|| PrintError::NotFound(self.name.clone()))?;
        if status & PRINTER_STATUS_PAPER_OUT != 0 {
            return Err(PrintError::PaperOut(self.name.clone()));
        }
        if status & PRINTER_STATUS_OFFLINE != 0 {
            return Err(PrintError::Offline(self.name.clone()));
        }

        unsafe {
            let mut handle = PRINTER_HANDLE::default();
            let name_w = Self::to_wide(&self.name);
            OpenPrinterW(PCWSTR::from_raw(name_w.as_ptr()), &mut handle, None)
                .map_err(|_| PrintError::NotFound(self.name.clone()))?;

            let doc_name_w = Self::to_wide("Receipt");
            let datatype_w = Self::to_wide("RAW");
            let doc_info = DOC_INFO_1W {
                pDocName: PWSTR(doc_name_w.as_ptr() as *mut _),
                pOutputFile: PWSTR::null(),
                pDatatype: PWSTR(datatype_w.as_ptr() as *mut _),
            };

            if StartDocPrinterW(handle, 1, &doc_info as *const DOC_INFO_1W) == 0 {
                let _ = ClosePrinter(handle);
                return Err(PrintError::WindowsPrinter("StartDocPrinter failed".to_string()));
            }
            if !StartPagePrinter(handle).as_bool() {
                let _ = EndDocPrinter(handle);
                let _ = ClosePrinter(handle);
                return Err(PrintError::WindowsPrinter("StartPagePrinter failed".to_string()));
            }

            let mut written: u32 = 0;
            let ok = WritePrinter(
                handle,
                data.as_ptr() as *const c_void,
                data.len() as u32,
                &mut written,
            );

            let _ = EndPagePrinter(handle);
            let _ = EndDocPrinter(handle);
            let _ = ClosePrinter(handle);

            if !ok.as_bool() || written != data.len() as u32 {
                return Err(PrintError::WindowsPrinter("WritePrinter failed".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(windows)]
#[async_trait]
impl Printer for WindowsPrinter {
    fn describe(&self) -> String {
        format!("win:{}", self.name)
    }

    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        // Win32 spooler calls block; keep them off the runtime threads
        let printer = self.clone();
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || printer.write_raw(&data))
            .await
            .map_err(|e| PrintError::WindowsPrinter(format!("Task join failed: {}", e)))?
    }

    async fn is_online(&self) -> bool {
        use windows::Win32::Graphics::Printing::PRINTER_STATUS_OFFLINE;
        matches!(Self::status_bits(&self.name), Some(s) if s & PRINTER_STATUS_OFFLINE == 0)
    }
}
