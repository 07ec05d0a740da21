//! Receipt renderer
//!
//! Pure `(order, template) -> ReceiptDocument`. No I/O, no clock.
//!
//! Sections are listed in [`SECTIONS`] as `(name, enabled, build)` triples
//! and always emitted in that order. Every line is wrapped or truncated to
//! the column count derived from the paper width, so nothing a customer
//! types can push a line past the edge of the roll.

use super::layout::{self, MIN_COLUMNS};
use super::money::format_money;
use super::types::{Align, FontClass, LineKind, ReceiptDocument, ReceiptLine};
use rust_decimal::Decimal;
use shared::{Order, ReceiptTemplate};
use thiserror::Error;

/// Continuation indent for wrapped item names
const ITEM_INDENT: usize = 2;

/// Order or template cannot be rendered (never retried)
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Paper width {paper_width_mm}mm leaves {columns} columns (minimum {})", MIN_COLUMNS)]
    PaperTooNarrow { paper_width_mm: u32, columns: usize },

    #[error("Item '{name}' has non-positive quantity {quantity}")]
    InvalidQuantity { name: String, quantity: i32 },

    #[error("Font size '{0}' must be positive")]
    InvalidFontSize(&'static str),

    #[error("Line spacing must be a positive number, got {0}")]
    InvalidLineSpacing(f32),

    #[error("Order has no items")]
    EmptyOrder,
}

/// Everything a section builder may read
struct RenderContext<'a> {
    order: &'a Order,
    template: &'a ReceiptTemplate,
    location_name: &'a str,
}

type Enabled = fn(&RenderContext<'_>) -> bool;
type Build = fn(&RenderContext<'_>, &mut LineSink) -> Result<(), RenderError>;

/// Receipt sections in print order
const SECTIONS: &[(&str, Enabled, Build)] = &[
    ("logo", has_logo, logo),
    ("header", always, header),
    ("customer_name", always, customer_name),
    ("customer_phone", show_phone, customer_phone),
    ("customer_address", show_address, customer_address),
    ("items", always, items),
    ("subtotal", show_subtotal, subtotal),
    ("discount", show_discount, discount),
    ("total", always, total),
    ("notes", show_notes, notes),
    ("footer", has_footer, footer),
    ("contact", has_contact, contact),
    ("qr_code", show_qr_code, qr_code),
    ("barcode", show_barcode, barcode),
];

/// Renders receipts for one location
#[derive(Debug, Clone)]
pub struct ReceiptRenderer {
    location_name: String,
}

impl ReceiptRenderer {
    pub fn new(location_name: impl Into<String>) -> Self {
        Self {
            location_name: location_name.into(),
        }
    }

    pub fn render(
        &self,
        order: &Order,
        template: &ReceiptTemplate,
    ) -> Result<ReceiptDocument, RenderError> {
        let columns = layout::columns_for(template.paper_width_mm, template.margins.left);
        validate(order, template, columns)?;

        let ctx = RenderContext {
            order,
            template,
            location_name: &self.location_name,
        };
        let mut sink = LineSink::new(template, columns);

        for (_, enabled, build) in SECTIONS {
            if enabled(&ctx) {
                build(&ctx, &mut sink)?;
            }
        }

        Ok(ReceiptDocument {
            columns,
            lines: sink.lines,
            feed_top: template.margins.top,
            feed_bottom: template.margins.bottom,
            left_margin_mm: template.margins.left,
            line_spacing: template.line_spacing,
        })
    }
}

fn validate(order: &Order, template: &ReceiptTemplate, columns: usize) -> Result<(), RenderError> {
    if columns < MIN_COLUMNS {
        return Err(RenderError::PaperTooNarrow {
            paper_width_mm: template.paper_width_mm,
            columns,
        });
    }

    let sizes = &template.font_size;
    for (name, size) in [
        ("title", sizes.title),
        ("normal", sizes.normal),
        ("bold", sizes.bold),
        ("small", sizes.small),
    ] {
        if size == 0 {
            return Err(RenderError::InvalidFontSize(name));
        }
    }

    if !template.line_spacing.is_finite() || template.line_spacing <= 0.0 {
        return Err(RenderError::InvalidLineSpacing(template.line_spacing));
    }

    if order.items.is_empty() {
        return Err(RenderError::EmptyOrder);
    }
    if let Some(item) = order.items.iter().find(|i| i.quantity <= 0) {
        return Err(RenderError::InvalidQuantity {
            name: item.name.clone(),
            quantity: item.quantity,
        });
    }
    Ok(())
}

// ========== Line Sink ==========

/// Collects lines, enforcing the width per font class
struct LineSink {
    lines: Vec<ReceiptLine>,
    columns: usize,
    normal_size: u32,
    sizes: [(FontClass, u32); 4],
}

impl LineSink {
    fn new(template: &ReceiptTemplate, columns: usize) -> Self {
        let f = &template.font_size;
        Self {
            lines: Vec::new(),
            columns,
            normal_size: f.normal as u32,
            sizes: [
                (FontClass::Title, f.title as u32),
                (FontClass::Normal, f.normal as u32),
                (FontClass::Bold, f.bold as u32),
                (FontClass::Small, f.small as u32),
            ],
        }
    }

    /// At least 1.5x the normal size prints double width
    fn double_width(&self, font: FontClass) -> bool {
        let size = self
            .sizes
            .iter()
            .find(|(class, _)| *class == font)
            .map(|(_, size)| *size)
            .unwrap_or(self.normal_size);
        size * 2 >= self.normal_size * 3
    }

    /// Usable characters for a font class
    fn width(&self, font: FontClass) -> usize {
        if self.double_width(font) {
            self.columns / 2
        } else {
            self.columns
        }
    }

    fn push(&mut self, text: String, align: Align, font: FontClass, kind: LineKind) {
        let text = layout::truncate(&text, self.width(font));
        self.lines.push(ReceiptLine {
            text,
            align,
            font,
            double_width: self.double_width(font),
            kind,
        });
    }

    fn wrapped(&mut self, text: &str, align: Align, font: FontClass) {
        let text = layout::sanitize(text);
        for line in layout::wrap(&text, self.width(font)) {
            self.push(line, align, font, LineKind::Text);
        }
    }

    fn lr(&mut self, left: &str, right: &str, font: FontClass) {
        let line = layout::lr(&layout::sanitize(left), &layout::sanitize(right), self.width(font));
        self.push(line, Align::Left, font, LineKind::Text);
    }

    fn separator(&mut self) {
        self.push(
            "-".repeat(self.columns),
            Align::Left,
            FontClass::Normal,
            LineKind::Separator,
        );
    }

    fn blank(&mut self) {
        self.push(String::new(), Align::Left, FontClass::Normal, LineKind::Text);
    }

    fn placeholder(&mut self, text: &str, kind: LineKind) {
        self.push(text.to_string(), Align::Center, FontClass::Normal, kind);
    }
}

// ========== Section Flags ==========

fn always(_: &RenderContext<'_>) -> bool {
    true
}

fn has_logo(ctx: &RenderContext<'_>) -> bool {
    ctx.template.logo().is_some()
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn show_phone(ctx: &RenderContext<'_>) -> bool {
    ctx.template.show_customer_phone && non_blank(ctx.order.customer.phone.as_deref())
}

fn show_address(ctx: &RenderContext<'_>) -> bool {
    ctx.template.show_customer_address && non_blank(ctx.order.customer.address.as_deref())
}

fn show_subtotal(ctx: &RenderContext<'_>) -> bool {
    ctx.template.show_item_prices
}

fn show_discount(ctx: &RenderContext<'_>) -> bool {
    ctx.template.show_discount
        && ctx
            .order
            .discount
            .as_ref()
            .is_some_and(|d| d.amount > Decimal::ZERO)
}

fn show_notes(ctx: &RenderContext<'_>) -> bool {
    ctx.template.show_notes && non_blank(ctx.order.notes.as_deref())
}

fn has_footer(ctx: &RenderContext<'_>) -> bool {
    !ctx.template.footer_lines.is_empty()
}

fn has_contact(ctx: &RenderContext<'_>) -> bool {
    let c = &ctx.template.contact;
    [&c.phone, &c.website, &c.instagram, &c.address]
        .iter()
        .any(|v| !v.trim().is_empty())
}

fn show_qr_code(ctx: &RenderContext<'_>) -> bool {
    ctx.template.show_qr_code
}

fn show_barcode(ctx: &RenderContext<'_>) -> bool {
    ctx.template.show_barcode
}

// ========== Section Builders ==========

fn logo(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    if let Some(url) = ctx.template.logo() {
        out.placeholder("[LOGO]", LineKind::Logo(url.to_string()));
    }
    Ok(())
}

fn header(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    if !ctx.location_name.trim().is_empty() {
        out.wrapped(ctx.location_name, Align::Center, FontClass::Title);
    }
    out.wrapped(
        &format!("Order #{}", ctx.order.order_number),
        Align::Center,
        FontClass::Bold,
    );
    out.wrapped(
        &ctx.order.timestamp.format("%d.%m.%Y %H:%M").to_string(),
        Align::Center,
        FontClass::Normal,
    );
    out.separator();
    Ok(())
}

fn customer_name(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    out.wrapped(&ctx.order.customer.name, Align::Left, FontClass::Bold);
    Ok(())
}

fn customer_phone(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    if let Some(phone) = &ctx.order.customer.phone {
        out.wrapped(&format!("Tel: {}", phone), Align::Left, FontClass::Normal);
    }
    Ok(())
}

fn customer_address(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    if let Some(address) = &ctx.order.customer.address {
        out.wrapped(address, Align::Left, FontClass::Normal);
    }
    Ok(())
}

fn items(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    out.separator();
    let width = out.width(FontClass::Normal);

    for item in &ctx.order.items {
        let mut left = format!("{}x {}", item.quantity, item.name);
        if let Some(variant) = item.variant_name.as_deref().filter(|v| !v.trim().is_empty()) {
            left.push_str(&format!(" ({})", variant));
        }
        let left = layout::sanitize(&left);

        let right = if ctx.template.show_item_prices {
            format_money(item.subtotal)
        } else {
            String::new()
        };

        for line in layout::lr_wrapped(&left, &right, width, ITEM_INDENT) {
            out.push(line, Align::Left, FontClass::Normal, LineKind::Text);
        }
    }

    out.separator();
    Ok(())
}

fn subtotal(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    out.lr("Subtotal", &format_money(ctx.order.subtotal), FontClass::Normal);
    Ok(())
}

fn discount(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    if let Some(discount) = &ctx.order.discount {
        let amount = format!("-{}", format_money(discount.amount));
        let right = match discount.coupon_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => format!("{} ({})", amount, code),
            _ => amount,
        };
        out.lr("Discount", &right, FontClass::Normal);
    }
    Ok(())
}

fn total(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    out.lr("TOTAL", &format_money(ctx.order.total), FontClass::Bold);
    Ok(())
}

fn notes(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    if let Some(notes) = &ctx.order.notes {
        out.separator();
        out.wrapped(&format!("Note: {}", notes.trim()), Align::Left, FontClass::Bold);
    }
    Ok(())
}

fn footer(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    out.blank();
    for line in &ctx.template.footer_lines {
        out.wrapped(line, Align::Center, FontClass::Normal);
    }
    Ok(())
}

fn contact(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    let c = &ctx.template.contact;
    out.blank();
    for (label, value) in [
        ("Tel: ", &c.phone),
        ("", &c.website),
        ("Instagram: ", &c.instagram),
        ("", &c.address),
    ] {
        if !value.trim().is_empty() {
            out.wrapped(&format!("{}{}", label, value.trim()), Align::Center, FontClass::Small);
        }
    }
    Ok(())
}

fn qr_code(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    out.placeholder("[QR]", LineKind::QrCode(ctx.order.order_number.to_string()));
    Ok(())
}

fn barcode(ctx: &RenderContext<'_>, out: &mut LineSink) -> Result<(), RenderError> {
    out.placeholder(
        "[BARCODE]",
        LineKind::Barcode(ctx.order.order_number.to_string()),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ContactInfo, Customer, Discount, OrderItem};
    use std::str::FromStr;

    fn money(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn burger_order() -> Order {
        Order {
            order_number: 1042,
            timestamp: chrono::DateTime::parse_from_rfc3339("2024-05-01T19:30:00+03:00").unwrap(),
            customer: Customer {
                name: "Ayse Yilmaz".into(),
                phone: Some("+90 555 000 0000".into()),
                address: Some("Moda Cad. No:12 Kadikoy".into()),
            },
            items: vec![OrderItem {
                name: "Burger".into(),
                variant_name: None,
                unit_price: money("75.00"),
                quantity: 2,
                subtotal: money("150.00"),
            }],
            subtotal: money("150.00"),
            discount: Some(Discount {
                amount: money("20"),
                coupon_code: Some("YENI20".into()),
            }),
            total: money("130.00"),
            notes: Some("Ring the bell".into()),
        }
    }

    fn renderer() -> ReceiptRenderer {
        ReceiptRenderer::new("Crab Burger Kadikoy")
    }

    #[test]
    fn test_burger_scenario() {
        let template = ReceiptTemplate {
            show_discount: true,
            show_item_prices: true,
            ..Default::default()
        };
        let doc = renderer().render(&burger_order(), &template).unwrap();

        let item = doc.texts().find(|l| l.starts_with("2x Burger")).unwrap();
        assert!(item.ends_with("150.00"));

        let discount = doc.texts().find(|l| l.starts_with("Discount")).unwrap();
        assert!(discount.ends_with("-20.00 (YENI20)"));

        let total = doc.lines.iter().find(|l| l.text.starts_with("TOTAL")).unwrap();
        assert!(total.text.ends_with("130.00"));
        assert!(total.is_bold());
    }

    #[test]
    fn test_section_order() {
        let template = ReceiptTemplate {
            show_logo: true,
            logo_url: Some("https://cdn.example.com/logo.png".into()),
            show_qr_code: true,
            show_barcode: true,
            footer_lines: vec!["Afiyet olsun!".into()],
            contact: ContactInfo {
                phone: "0216 000 00 00".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let doc = renderer().render(&burger_order(), &template).unwrap();
        let texts: Vec<&str> = doc.texts().collect();

        let pos = |needle: &str| texts.iter().position(|t| t.contains(needle)).unwrap();
        let order = [
            pos("[LOGO]"),
            pos("Order #1042"),
            pos("Ayse Yilmaz"),
            pos("Tel: +90"),
            pos("Moda Cad."),
            pos("2x Burger"),
            pos("Subtotal"),
            pos("Discount"),
            pos("TOTAL"),
            pos("Note: Ring the bell"),
            pos("Afiyet olsun!"),
            pos("Tel: 0216"),
            pos("[QR]"),
            pos("[BARCODE]"),
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{:?}", order);

        assert_eq!(doc.lines[0].kind, LineKind::Logo("https://cdn.example.com/logo.png".into()));
        assert!(doc.lines.iter().any(|l| l.kind == LineKind::QrCode("1042".into())));
    }

    #[test]
    fn test_hidden_prices_have_no_amounts() {
        let template = ReceiptTemplate {
            show_item_prices: false,
            ..Default::default()
        };
        let doc = renderer().render(&burger_order(), &template).unwrap();

        let item_lines: Vec<&str> = doc.texts().filter(|l| l.starts_with("2x")).collect();
        assert_eq!(item_lines, vec!["2x Burger"]);
        assert!(!doc.texts().any(|l| l.starts_with("Subtotal")));
        // Grand total is always printed
        assert!(doc.texts().any(|l| l.starts_with("TOTAL")));
    }

    #[test]
    fn test_flags_off_hide_sections() {
        let template = ReceiptTemplate {
            show_customer_phone: false,
            show_customer_address: false,
            show_notes: false,
            show_discount: false,
            show_qr_code: false,
            ..Default::default()
        };
        let doc = renderer().render(&burger_order(), &template).unwrap();

        assert!(doc.texts().any(|l| l.contains("Ayse Yilmaz")));
        assert!(!doc.texts().any(|l| l.contains("+90")));
        assert!(!doc.texts().any(|l| l.contains("Moda")));
        assert!(!doc.texts().any(|l| l.contains("Ring the bell")));
        assert!(!doc.texts().any(|l| l.contains("YENI20")));
        assert!(!doc.lines.iter().any(|l| matches!(l.kind, LineKind::QrCode(_))));
        assert!(!doc.texts().any(|l| l.contains("[QR]")));
    }

    #[test]
    fn test_no_line_exceeds_columns() {
        let long = "Çok uzun bir müşteri adı ".repeat(12);
        let unbroken = "X".repeat(300);
        let mut order = burger_order();
        order.customer.name = format!("{long}{unbroken}");
        order.customer.address = Some(unbroken.clone());
        order.notes = Some(long.clone());
        order.items.push(OrderItem {
            name: format!("{unbroken} {long}"),
            variant_name: Some(long.clone()),
            unit_price: money("123456789.995"),
            quantity: 1000,
            subtotal: money("123456789123.995"),
        });
        order.discount = Some(Discount {
            amount: money("99999999.99"),
            coupon_code: Some(unbroken.clone()),
        });

        for paper in [58, 60, 72, 76, 80, 112] {
            for left in [0, 3, 10] {
                let template = ReceiptTemplate {
                    paper_width_mm: paper,
                    margins: shared::Margins {
                        top: 0,
                        left,
                        bottom: 0,
                    },
                    footer_lines: vec![long.clone(), unbroken.clone()],
                    contact: ContactInfo {
                        phone: unbroken.clone(),
                        website: long.clone(),
                        instagram: unbroken.clone(),
                        address: long.clone(),
                    },
                    show_qr_code: true,
                    show_barcode: true,
                    ..Default::default()
                };

                let columns = layout::columns_for(paper, left);
                match renderer().render(&order, &template) {
                    Ok(doc) => {
                        assert_eq!(doc.columns, columns);
                        for line in &doc.lines {
                            assert!(layout::width(&line.text) <= columns, "{:?}", line);
                            assert!(line.printed_width() <= columns, "{:?}", line);
                        }
                    }
                    Err(RenderError::PaperTooNarrow { .. }) => assert!(columns < MIN_COLUMNS),
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }
    }

    #[test]
    fn test_title_prints_double_width() {
        let doc = renderer()
            .render(&burger_order(), &ReceiptTemplate::default())
            .unwrap();
        let title = &doc.lines[0];
        assert_eq!(title.font, FontClass::Title);
        assert!(title.double_width);
        assert!(title.text.chars().count() <= doc.columns / 2);
    }

    #[test]
    fn test_control_characters_are_stripped() {
        let mut order = burger_order();
        order.customer.name = "Evil\x1B@\x1Bd\x05Name".into();
        let doc = renderer()
            .render(&order, &ReceiptTemplate::default())
            .unwrap();
        assert!(doc.texts().all(|l| !l.chars().any(char::is_control)));
    }

    #[test]
    fn test_data_errors() {
        let template = ReceiptTemplate::default();

        let mut order = burger_order();
        order.items.clear();
        assert!(matches!(
            renderer().render(&order, &template),
            Err(RenderError::EmptyOrder)
        ));

        let mut order = burger_order();
        order.items[0].quantity = 0;
        assert!(matches!(
            renderer().render(&order, &template),
            Err(RenderError::InvalidQuantity { .. })
        ));

        let narrow = ReceiptTemplate {
            paper_width_mm: 30,
            ..Default::default()
        };
        assert!(matches!(
            renderer().render(&burger_order(), &narrow),
            Err(RenderError::PaperTooNarrow { .. })
        ));

        let bad_spacing = ReceiptTemplate {
            line_spacing: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            renderer().render(&burger_order(), &bad_spacing),
            Err(RenderError::InvalidLineSpacing(_))
        ));
    }

    #[test]
    fn test_discount_without_coupon() {
        let mut order = burger_order();
        order.discount = Some(Discount {
            amount: money("12.345"),
            coupon_code: None,
        });
        let doc = renderer()
            .render(&order, &ReceiptTemplate::default())
            .unwrap();
        let line = doc.texts().find(|l| l.starts_with("Discount")).unwrap();
        assert!(line.ends_with(" -12.35"));
    }
}
