//! Display formatting shared by the HTML report and the exports.

use chrono::{DateTime, Utc};

pub const MET_COLOR: &str = "#27ae60";
pub const MISSED_COLOR: &str = "#e74c3c";

/// Digits of `n` with comma thousands separators.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// `$12.5M`, `$350K` or `$999`.
pub fn format_currency(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("${:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("${:.0}K", value / 1_000.0)
    } else {
        format!("${}", group_thousands(value.max(0.0).round() as u64))
    }
}

pub fn format_sqft(sqft: u64) -> String {
    if sqft == 0 {
        "N/A".to_string()
    } else {
        format!("{} sq ft", group_thousands(sqft))
    }
}

pub fn format_hours(hours: f64) -> String {
    if hours <= 0.0 {
        "0".to_string()
    } else {
        group_thousands(hours.round() as u64)
    }
}

/// Date part of a CKAN timestamp (`2026-03-04T00:00:00` → `2026-03-04`).
pub fn date_display(raw: &str) -> &str {
    match raw.find('T') {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}

pub fn format_run_time(run_time: DateTime<Utc>) -> String {
    run_time.format("%B %d, %Y at %I:%M %p").to_string()
}

/// First `max` characters, never splitting a code point.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Like [`truncate`] but marks the cut with `...`.
pub fn ellipsize(text: &str, max: usize) -> String {
    let cut = truncate(text, max);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        cut.to_string()
    }
}

pub fn target_color(pct: f64, target: f64) -> &'static str {
    if pct >= target {
        MET_COLOR
    } else {
        MISSED_COLOR
    }
}
