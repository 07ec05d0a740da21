//! Receipt Template Model
//!
//! Owned by the central server and edited through the receipt-template editor.
//! The agent treats it as read-only.

use serde::{Deserialize, Serialize};

/// Font sizes (points) per text class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSizes {
    pub title: u16,
    pub normal: u16,
    pub bold: u16,
    pub small: u16,
}

impl Default for FontSizes {
    fn default() -> Self {
        Self {
            title: 24,
            normal: 12,
            bold: 14,
            small: 10,
        }
    }
}

/// Contact info printed under the footer; empty fields are skipped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub instagram: String,
    #[serde(default)]
    pub address: String,
}

/// Paper margins in millimeters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    #[serde(default)]
    pub top: u32,
    #[serde(default)]
    pub left: u32,
    #[serde(default = "default_bottom_margin")]
    pub bottom: u32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 0,
            left: 0,
            bottom: default_bottom_margin(),
        }
    }
}

/// Versioned receipt layout for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptTemplate {
    pub version: u32,
    #[serde(default)]
    pub location_id: String,

    #[serde(default)]
    pub show_logo: bool,
    #[serde(default)]
    pub logo_url: Option<String>,

    #[serde(default)]
    pub font_size: FontSizes,

    // -- Visibility flags --
    #[serde(default = "default_true")]
    pub show_customer_address: bool,
    #[serde(default = "default_true")]
    pub show_customer_phone: bool,
    #[serde(default = "default_true")]
    pub show_notes: bool,
    #[serde(default = "default_true")]
    pub show_item_prices: bool,
    #[serde(default = "default_true")]
    pub show_discount: bool,
    #[serde(default, rename = "showQRCode", alias = "showQrCode")]
    pub show_qr_code: bool,
    #[serde(default)]
    pub show_barcode: bool,

    /// Printed verbatim, in order
    #[serde(default)]
    pub footer_lines: Vec<String>,
    #[serde(default)]
    pub contact: ContactInfo,

    #[serde(default = "default_paper_width")]
    pub paper_width_mm: u32,
    #[serde(default)]
    pub margins: Margins,
    /// Multiplier of the printer's default line height
    #[serde(default = "default_line_spacing")]
    pub line_spacing: f32,
}

fn default_true() -> bool {
    true
}

fn default_bottom_margin() -> u32 {
    4
}

fn default_paper_width() -> u32 {
    80
}

fn default_line_spacing() -> f32 {
    1.0
}

impl Default for ReceiptTemplate {
    fn default() -> Self {
        Self {
            version: 0,
            location_id: String::new(),
            show_logo: false,
            logo_url: None,
            font_size: FontSizes::default(),
            show_customer_address: true,
            show_customer_phone: true,
            show_notes: true,
            show_item_prices: true,
            show_discount: true,
            show_qr_code: false,
            show_barcode: false,
            footer_lines: Vec::new(),
            contact: ContactInfo::default(),
            paper_width_mm: default_paper_width(),
            margins: Margins::default(),
            line_spacing: default_line_spacing(),
        }
    }
}

impl ReceiptTemplate {
    /// Logo URL when the logo is enabled and configured
    pub fn logo(&self) -> Option<&str> {
        if !self.show_logo {
            return None;
        }
        self.logo_url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}
