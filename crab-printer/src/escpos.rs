//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data.

use crate::encoding::Charset;

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers.
/// Text is transcoded to the selected code page as it is written, so raw
/// payloads (raster images, QR data) are never touched by the encoder.
pub struct EscPosBuilder {
    buf: Vec<u8>,
    width: usize,
    charset: Charset,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in characters
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub fn new(width: usize, charset: Charset) -> Self {
        let mut b = Self {
            buf: Vec::with_capacity(4096),
            width,
            charset,
        };
        b.reset();
        b
    }

    /// Get the configured paper width
    pub fn width(&self) -> usize {
        self.width
    }

    // === Text Output ===

    /// Write text in the printer's code page
    pub fn text(&mut self, s: &str) -> &mut Self {
        let encoded = self.charset.encode_text(s);
        self.buf.extend_from_slice(&encoded);
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Print and feed n lines
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        // ESC d n
        self.buf.extend_from_slice(&[0x1B, 0x64, lines]);
        self
    }

    // === Alignment ===

    /// Align text to center
    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x01]);
        self
    }

    /// Align text to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x00]);
        self
    }

    /// Align text to right
    pub fn right(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x02]);
        self
    }

    // === Text Style ===

    /// Enable bold text
    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x01]);
        self
    }

    /// Disable bold text
    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x00]);
        self
    }

    /// Double width and height
    pub fn double_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x11]);
        self
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x00]);
        self
    }

    /// Select the smaller Font B
    pub fn font_small(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x4D, 0x01]);
        self
    }

    /// Select the default Font A
    pub fn font_normal(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x4D, 0x00]);
        self
    }

    // === Page Layout ===

    /// Set line spacing in dots
    pub fn line_spacing(&mut self, dots: u8) -> &mut Self {
        // ESC 3 n
        self.buf.extend_from_slice(&[0x1B, 0x33, dots]);
        self
    }

    /// Set left margin in dots
    pub fn left_margin(&mut self, dots: u16) -> &mut Self {
        // GS L nL nH
        let [lo, hi] = dots.to_le_bytes();
        self.buf.extend_from_slice(&[0x1D, 0x4C, lo, hi]);
        self
    }

    // === Paper Control ===

    /// Full cut with feed: feeds n lines then cuts (GS V 66 n)
    pub fn cut_feed(&mut self, lines: u8) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x42, lines]);
        self
    }

    // === QR Code ===

    /// Print a QR code
    ///
    /// Size: 1-16 (module size in dots)
    pub fn qr_code(&mut self, data: &str, size: u8) -> &mut Self {
        let size = size.clamp(1, 16);

        // Function 165: Select model (Model 2)
        self.buf
            .extend_from_slice(&[0x1D, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x32, 0x00]);

        // Function 167: Set module size
        self.buf
            .extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, size]);

        // Function 169: Set error correction (M)
        self.buf
            .extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, 0x31]);

        // Function 180: Store data
        let data_bytes = data.as_bytes();
        let [p_l, p_h] = ((data_bytes.len() + 3) as u16).to_le_bytes();
        self.buf
            .extend_from_slice(&[0x1D, 0x28, 0x6B, p_l, p_h, 0x31, 0x50, 0x30]);
        self.buf.extend_from_slice(data_bytes);

        // Function 181: Print
        self.buf
            .extend_from_slice(&[0x1D, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]);

        self.newline()
    }

    // === Barcode ===

    /// Print a CODE128 barcode (code set B) with the text printed below
    ///
    /// Data longer than the command allows is truncated.
    pub fn barcode_code128(&mut self, data: &str) -> &mut Self {
        let data: String = data.chars().filter(|c| c.is_ascii_graphic()).take(250).collect();

        // GS h n (height), GS w n (module width), GS H 2 (HRI below)
        self.buf.extend_from_slice(&[0x1D, 0x68, 80]);
        self.buf.extend_from_slice(&[0x1D, 0x77, 2]);
        self.buf.extend_from_slice(&[0x1D, 0x48, 0x02]);

        // GS k 73 n {B data
        self.buf
            .extend_from_slice(&[0x1D, 0x6B, 73, (data.len() + 2) as u8, b'{', b'B']);
        self.buf.extend_from_slice(data.as_bytes());

        self.newline()
    }

    // === Raw Commands ===

    /// Write raw bytes directly (raster images, vendor commands)
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Reset printer to default state and re-select the code page
    pub fn reset(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x40]);
        self.buf.extend_from_slice(self.charset.select_sequence());
        self
    }

    // === Build ===

    /// Build the final byte buffer
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

// ============================================================================
// Image Processing
// ============================================================================

/// Rasterise a logo image for printing
///
/// The image will be:
/// - Resized to fit `max_width` dots (384 for 58mm, 576 for 80mm)
/// - Converted to 1-bit monochrome (transparent pixels are white)
/// - Encoded as GS v 0 raster graphics, centered
#[cfg(feature = "image")]
pub fn rasterize_logo(bytes: &[u8], max_width: u32) -> Option<Vec<u8>> {
    use image::GenericImageView;
    use tracing::{debug, warn};

    let img = match image::load_from_memory(bytes) {
        Ok(i) => i,
        Err(e) => {
            warn!(error = %e, "decode logo failed");
            return None;
        }
    };

    let (w, h) = img.dimensions();
    debug!(width = w, height = h, "logo decoded");
    if w == 0 || h == 0 {
        return None;
    }

    let (new_w, new_h) = if w > max_width {
        let ratio = max_width as f64 / w as f64;
        (max_width, ((h as f64 * ratio) as u32).max(1))
    } else {
        (w, h)
    };

    let rgba = img
        .resize_exact(new_w, new_h, image::imageops::FilterType::Nearest)
        .to_rgba8();

    let x_bytes = new_w.div_ceil(8);
    let mut data = Vec::with_capacity((x_bytes * new_h) as usize + 16);

    // Center align for image
    data.extend_from_slice(&[0x1B, 0x61, 0x01]);

    // GS v 0 m xL xH yL yH
    data.extend_from_slice(&[0x1D, 0x76, 0x30, 0x00]);
    data.extend_from_slice(&(x_bytes as u16).to_le_bytes());
    data.extend_from_slice(&(new_h as u16).to_le_bytes());

    for y in 0..new_h {
        for x_byte in 0..x_bytes {
            let mut byte = 0u8;
            for bit in 0..8 {
                let x = x_byte * 8 + bit;
                if x >= new_w {
                    continue;
                }
                let pixel = rgba.get_pixel(x, y);
                if pixel[3] < 128 {
                    continue;
                }
                let luma = 0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32;
                if luma < 128.0 {
                    byte |= 1 << (7 - bit);
                }
            }
            data.push(byte);
        }
    }

    // Newline after image, back to left alignment
    data.push(0x0A);
    data.extend_from_slice(&[0x1B, 0x61, 0x00]);

    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_starts_with_reset_and_code_page() {
        let b = EscPosBuilder::new(32, Charset::Wpc1254);
        let data = b.build();
        assert_eq!(&data[..2], &[0x1B, 0x40]);
        assert_eq!(&data[2..], Charset::Wpc1254.select_sequence());
    }

    #[test]
    fn test_text_is_transcoded() {
        let mut b = EscPosBuilder::new(32, Charset::Wpc1254);
        b.line("Şiş");
        let data = b.build();
        // Ş = 0xDE, i = 'i', ş = 0xFE
        assert!(data.ends_with(&[0xDE, b'i', 0xFE, b'\n']));
    }

    #[test]
    fn test_barcode_length_prefix() {
        let mut b = EscPosBuilder::new(32, Charset::Ascii);
        b.barcode_code128("1042");
        let data = b.build();
        let pos = data
            .windows(3)
            .position(|w| w == [0x1D, 0x6B, 73])
            .unwrap();
        assert_eq!(data[pos + 3], 6);
        assert_eq!(&data[pos + 4..pos + 10], b"{B1042");
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_rasterize_logo() {
        let mut img = image::RgbaImage::new(16, 2);
        for x in 0..8 {
            img.put_pixel(x, 0, image::Rgba([0, 0, 0, 255]));
        }
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let data = rasterize_logo(&png, 384).unwrap();
        // header: align(3) + GS v 0 m(4) + xL xH yL yH(4)
        assert_eq!(&data[7..11], &[2, 0, 2, 0]);
        assert_eq!(data[11], 0xFF);
        assert_eq!(data[12], 0x00);
    }

    #[cfg(feature = "image")]
    #[test]
    fn test_rasterize_garbage_is_none() {
        assert!(rasterize_logo(b"not an image", 384).is_none());
    }
}
