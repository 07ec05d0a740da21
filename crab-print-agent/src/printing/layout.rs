//! Monospace column layout
//!
//! All widths are in characters. Thermal printers print Font A at 12 dots
//! per character on an 8 dots/mm head, so one column is 1.5 mm.

/// Narrowest receipt the renderer accepts
pub const MIN_COLUMNS: usize = 16;

/// Character columns for a paper width
///
/// Printers keep a non-printable border (10 mm on 58 mm rolls, 8 mm on
/// 80 mm rolls); the template's left margin is taken off the rest.
/// 58 mm → 32 columns, 80 mm → 48 columns.
pub fn columns_for(paper_width_mm: u32, left_margin_mm: u32) -> usize {
    let border = if paper_width_mm < 70 { 10 } else { 8 };
    let printable = paper_width_mm
        .saturating_sub(border)
        .saturating_sub(left_margin_mm) as usize;
    printable * 2 / 3
}

/// Replace control characters with spaces
///
/// Keeps ESC/POS command bytes out of customer-supplied text.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

pub fn width(text: &str) -> usize {
    text.chars().count()
}

pub fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Greedy word wrap
pub fn wrap(text: &str, max: usize) -> Vec<String> {
    wrap_with(text, max, max)
}

/// Greedy word wrap with a different width for the first line
///
/// Words longer than a line are split. Always returns at least one line.
pub fn wrap_with(text: &str, first: usize, rest: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while !word.is_empty() {
            let max = if lines.is_empty() { first } else { rest }.max(1);
            let needed = if current_len == 0 {
                word.len()
            } else {
                current_len + 1 + word.len()
            };

            if needed <= max {
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(word.iter());
                current_len += word.len();
                break;
            }

            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }

            // Longer than a whole line
            let tail = word.split_off(max);
            lines.push(word.iter().collect());
            word = tail;
        }
    }

    if current_len > 0 || lines.is_empty() {
        lines.push(current);
    }
    lines
}

/// Left text and right-aligned text on one line
///
/// The left side is truncated to keep at least one space before the right.
pub fn lr(left: &str, right: &str, max: usize) -> String {
    let right = truncate(right, max);
    let right_len = width(&right);
    let left = truncate(left, max.saturating_sub(right_len + 1));
    let gap = max - width(&left) - right_len;
    format!("{}{}{}", left, " ".repeat(gap), right)
}

/// Left text wrapped with the right text aligned on its first line
///
/// Continuation lines are indented by `indent` spaces.
pub fn lr_wrapped(left: &str, right: &str, max: usize, indent: usize) -> Vec<String> {
    let indent = indent.min(max / 2);
    let right = truncate(right, max);
    let right_len = width(&right);

    if right_len == 0 {
        return indent_rest(wrap_with(left, max, max - indent), indent);
    }

    if right_len + 1 >= max {
        let mut lines = indent_rest(wrap_with(left, max, max - indent), indent);
        lines.push(format!("{}{}", " ".repeat(max - right_len), right));
        return lines;
    }

    let mut lines = indent_rest(wrap_with(left, max - right_len - 1, max - indent), indent);
    let gap = max - width(&lines[0]) - right_len;
    lines[0] = format!("{}{}{}", lines[0], " ".repeat(gap), right);
    lines
}

fn indent_rest(lines: Vec<String>, indent: usize) -> Vec<String> {
    let pad = " ".repeat(indent);
    lines
        .into_iter()
        .enumerate()
        .map(|(i, l)| if i == 0 { l } else { format!("{pad}{l}") })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_for_paper() {
        assert_eq!(columns_for(58, 0), 32);
        assert_eq!(columns_for(80, 0), 48);
        assert_eq!(columns_for(80, 6), 44);
        assert_eq!(columns_for(10, 0), 0);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("Ali\x1B@\nVeli\t"), "Ali @ Veli ");
    }

    #[test]
    fn test_wrap_words_and_long_tokens() {
        assert_eq!(wrap("Extra crispy chicken", 10), vec!["Extra", "crispy", "chicken"]);
        assert_eq!(wrap("abcdefghijkl", 5), vec!["abcde", "fghij", "kl"]);
        assert_eq!(wrap("", 5), vec![""]);
        assert_eq!(wrap("Çiğ köfte dürüm", 9), vec!["Çiğ köfte", "dürüm"]);
    }

    #[test]
    fn test_lr_pads_and_truncates() {
        assert_eq!(lr("Total", "130.00", 16), "Total     130.00");
        assert_eq!(lr("A very long label", "9.99", 12), "A very  9.99");
        assert_eq!(lr("Discount", "-20.00 (YENI20)", 12), "-20.00 (YENI");
    }

    #[test]
    fn test_lr_wrapped_indents_continuation() {
        let lines = lr_wrapped("1x Mixed grill platter for two", "450.00", 20, 2);
        assert_eq!(lines[0], "1x Mixed      450.00");
        assert!(lines[1..].iter().all(|l| l.starts_with("  ")));
        assert!(lines.iter().all(|l| width(l) <= 20));
    }
}
