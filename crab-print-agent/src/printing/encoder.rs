//! ReceiptDocument → ESC/POS bytes

use super::types::{Align, FontClass, LineKind, ReceiptDocument};
use crab_printer::{Charset, EscPosBuilder};

/// Font A dots per character column
pub const DOTS_PER_COLUMN: u32 = 12;
/// Head resolution (203 dpi)
const DOTS_PER_MM: u32 = 8;
/// Printer default line height (ESC 2)
const DEFAULT_LINE_DOTS: f32 = 30.0;
const QR_MODULE_SIZE: u8 = 6;

/// Raster width for a logo on this document
pub fn logo_width_dots(doc: &ReceiptDocument) -> u32 {
    doc.columns as u32 * DOTS_PER_COLUMN
}

/// Encode a rendered document
///
/// `logo` is a pre-rasterised GS v 0 image; without it the logo line is skipped.
pub fn encode(doc: &ReceiptDocument, charset: Charset, logo: Option<&[u8]>) -> Vec<u8> {
    let mut b = EscPosBuilder::new(doc.columns, charset);

    let margin = (doc.left_margin_mm * DOTS_PER_MM).min(u16::MAX as u32) as u16;
    if margin > 0 {
        b.left_margin(margin);
    }
    let spacing = (DEFAULT_LINE_DOTS * doc.line_spacing).round().clamp(1.0, 255.0) as u8;
    b.line_spacing(spacing);

    if doc.feed_top > 0 {
        b.feed(doc.feed_top.min(255) as u8);
    }

    for line in &doc.lines {
        match line.align {
            Align::Left => b.left(),
            Align::Center => b.center(),
            Align::Right => b.right(),
        };

        match &line.kind {
            LineKind::Logo(_) => {
                if let Some(raster) = logo {
                    b.raw(raster);
                }
                continue;
            }
            LineKind::QrCode(data) => {
                b.center().qr_code(data, QR_MODULE_SIZE).left();
                continue;
            }
            LineKind::Barcode(data) => {
                b.center().barcode_code128(data).left();
                continue;
            }
            LineKind::Text | LineKind::Separator => {}
        }

        match line.font {
            FontClass::Title | FontClass::Bold => {
                b.bold();
            }
            FontClass::Small => {
                b.font_small();
            }
            FontClass::Normal => {}
        }
        if line.double_width {
            b.double_size();
        }

        b.line(&line.text);

        if line.double_width {
            b.reset_size();
        }
        match line.font {
            FontClass::Title | FontClass::Bold => {
                b.bold_off();
            }
            FontClass::Small => {
                b.font_normal();
            }
            FontClass::Normal => {}
        }
    }

    b.left();
    if doc.feed_bottom > 0 {
        b.feed(doc.feed_bottom.min(255) as u8);
    }
    b.cut_feed(0);
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printing::types::ReceiptLine;

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn doc(lines: Vec<ReceiptLine>) -> ReceiptDocument {
        ReceiptDocument {
            columns: 48,
            lines,
            feed_top: 0,
            feed_bottom: 4,
            left_margin_mm: 0,
            line_spacing: 1.0,
        }
    }

    #[test]
    fn test_bold_wraps_total_line() {
        let bytes = encode(
            &doc(vec![ReceiptLine {
                text: "TOTAL 130.00".into(),
                font: FontClass::Bold,
                ..Default::default()
            }]),
            Charset::Wpc1254,
            None,
        );

        let on = find(&bytes, &[0x1B, 0x45, 0x01]).unwrap();
        let text = find(&bytes, b"TOTAL 130.00\n").unwrap();
        let off = find(&bytes, &[0x1B, 0x45, 0x00]).unwrap();
        assert!(on < text && text < off);
        // Ends with a cut
        assert_eq!(&bytes[bytes.len() - 4..], &[0x1D, 0x56, 0x42, 0x00]);
    }

    #[test]
    fn test_qr_and_barcode_payloads() {
        let bytes = encode(
            &doc(vec![
                ReceiptLine {
                    text: "[QR]".into(),
                    kind: LineKind::QrCode("1042".into()),
                    ..Default::default()
                },
                ReceiptLine {
                    text: "[BARCODE]".into(),
                    kind: LineKind::Barcode("1042".into()),
                    ..Default::default()
                },
            ]),
            Charset::Wpc1254,
            None,
        );

        assert!(find(&bytes, &[0x31, 0x50, 0x30, b'1', b'0', b'4', b'2']).is_some());
        assert!(find(&bytes, b"{B1042").is_some());
        // Placeholders are not printed as text
        assert!(find(&bytes, b"[QR]").is_none());
    }

    #[test]
    fn test_logo_raster_is_embedded() {
        let lines = vec![ReceiptLine {
            text: "[LOGO]".into(),
            kind: LineKind::Logo("https://cdn.example.com/logo.png".into()),
            ..Default::default()
        }];
        let raster = [0x1D, 0x76, 0x30, 0x00, 0x01, 0x00, 0x01, 0x00, 0xFF];

        let with_logo = encode(&doc(lines.clone()), Charset::Wpc1254, Some(&raster));
        assert!(find(&with_logo, &raster).is_some());

        let without = encode(&doc(lines), Charset::Wpc1254, None);
        assert!(find(&without, b"[LOGO]").is_none());
    }

    #[test]
    fn test_turkish_text_transcoded() {
        let bytes = encode(
            &doc(vec![ReceiptLine {
                text: "Teşekkürler".into(),
                ..Default::default()
            }]),
            Charset::Wpc1254,
            None,
        );
        assert!(find(&bytes, &[b'T', b'e', 0xFE, b'e', b'k', b'k', 0xFC]).is_some());
    }

    #[test]
    fn test_logo_width() {
        assert_eq!(logo_width_dots(&doc(vec![])), 576);
    }
}
