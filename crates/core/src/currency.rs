use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<int>\d{1,3}(?:\.\d{3})+|\d{1,3}(?:,\d{3})+\b|\d+)(?:,(?P<frac>\d+))?")
        .expect("valid regex")
});

/// Formats an amount with Indonesian digit grouping (`3500000` → `3.500.000`).
///
/// Fractions keep at most three digits with trailing zeros removed and use `,` as the
/// decimal mark.
pub fn format_grouped(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let negative = value < 0.0;
    let scaled = (value.abs() * 1000.0).round() as u128;
    let whole = scaled / 1000;
    let frac = scaled % 1000;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if frac > 0 {
        let frac_text = format!("{frac:03}");
        grouped.push(',');
        grouped.push_str(frac_text.trim_end_matches('0'));
    }
    if negative && (whole > 0 || frac > 0) {
        grouped.insert(0, '-');
    }
    grouped
}

pub fn format_rupiah(value: f64) -> String {
    format!("Rp {}", format_grouped(value))
}

/// Reads a numeric-ish metadata value: JSON numbers, or strings such as `"3500000"`,
/// `"Rp 3.500.000"`, `"Rp 3,500,000"` and `"1.350.000,5"`. Whole three-digit groups after a
/// comma are thousands; any other comma starts the fraction.
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_amount_text(text),
        _ => None,
    }
}

fn parse_amount_text(text: &str) -> Option<f64> {
    let caps = AMOUNT_RE.captures(text)?;
    let mut digits = caps.name("int")?.as_str().replace(['.', ','], "");
    if let Some(frac) = caps.name("frac") {
        digits.push('.');
        digits.push_str(frac.as_str());
    }
    digits.parse().ok()
}
