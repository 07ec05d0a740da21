//! Code page encoding for thermal printers
//!
//! Thermal printers don't speak UTF-8. Text has to be transcoded into the
//! code table the printer has selected, and the selection command has to be
//! re-sent after every `ESC @` (which resets the code table).
//!
//! ASCII passes through untouched so ESC/POS commands are never corrupted.
//! Characters the code page cannot represent print as `?`.

use encoding_rs::Encoding;
use std::fmt;
use std::str::FromStr;

/// Printer code page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// Windows-1254 (Turkish), ESC t 48
    #[default]
    Wpc1254,
    /// GBK with Chinese mode enabled (FS &)
    Gbk,
    /// PC437, non-ASCII replaced
    Ascii,
}

impl Charset {
    /// Commands that select this code page; sent after every printer reset
    pub fn select_sequence(&self) -> &'static [u8] {
        match self {
            // FS . (cancel Chinese mode), ESC t 48 (WPC1254)
            Charset::Wpc1254 => &[0x1C, 0x2E, 0x1B, 0x74, 48],
            // FS & (Chinese mode), FS C 1 (GBK)
            Charset::Gbk => &[0x1C, 0x26, 0x1C, 0x43, 0x01],
            // ESC t 0 (PC437)
            Charset::Ascii => &[0x1B, 0x74, 0x00],
        }
    }

    fn encoding(&self) -> Option<&'static Encoding> {
        match self {
            Charset::Wpc1254 => Some(encoding_rs::WINDOWS_1254),
            Charset::Gbk => Some(encoding_rs::GBK),
            Charset::Ascii => None,
        }
    }

    /// Encode text for this code page
    pub fn encode_text(&self, s: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(s.len());
        let mut utf8 = [0u8; 4];

        for c in s.chars() {
            if c.is_ascii() {
                out.push(c as u8);
                continue;
            }
            match self.encoding() {
                Some(enc) => {
                    let (bytes, _, had_errors) = enc.encode(c.encode_utf8(&mut utf8));
                    if had_errors {
                        out.push(b'?');
                    } else {
                        out.extend_from_slice(&bytes);
                    }
                }
                None => out.push(b'?'),
            }
        }
        out
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Charset::Wpc1254 => write!(f, "wpc1254"),
            Charset::Gbk => write!(f, "gbk"),
            Charset::Ascii => write!(f, "ascii"),
        }
    }
}

impl FromStr for Charset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wpc1254" | "cp1254" | "windows-1254" => Ok(Charset::Wpc1254),
            "gbk" => Ok(Charset::Gbk),
            "ascii" | "pc437" => Ok(Charset::Ascii),
            other => Err(format!("unsupported printer charset: {}", other)),
        }
    }
}
