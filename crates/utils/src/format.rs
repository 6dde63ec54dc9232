//! Formatting utilities — money, percentages, timestamps.

use chrono::DateTime;

/// Fractional unix seconds → `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_unix_secs(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "—".to_string();
    }
    let whole = secs.trunc();
    let nanos = ((secs - whole) * 1e9) as u32;
    match DateTime::from_timestamp(whole as i64, nanos) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "—".to_string(),
    }
}

/// `1234567.891` → `1,234,567.89`.
pub fn with_thousands(value: f64, decimals: usize) -> String {
    let raw = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (raw.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && raw.chars().any(|c| c.is_ascii_digit() && c != '0') { "-" } else { "" };
    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Dollar amount with two decimals.
pub fn format_usd(value: f64) -> String {
    format!("${}", with_thousands(value, 2))
}

/// Unit price. Zero is `N/A`; sub-cent prices keep 8 decimals.
pub fn format_price(price: f64) -> String {
    if price == 0.0 {
        "N/A".to_string()
    } else if price < 0.01 {
        format!("${price:.8}")
    } else {
        format_usd(price)
    }
}

/// Signed 24h change. Missing or exactly zero is `N/A`.
pub fn format_change(change: Option<f64>) -> String {
    match change {
        Some(c) if c != 0.0 && c.is_finite() => format!("{c:+.2}%"),
        _ => "N/A".to_string(),
    }
}

/// Token amount: 4 decimals from 1 upward, 8 below.
pub fn format_amount(amount: f64) -> String {
    if amount >= 1.0 {
        with_thousands(amount, 4)
    } else {
        format!("{amount:.8}")
    }
}

/// `312.4` seconds → `5m 12s`.
pub fn format_age(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m {:02}s", s / 60, s % 60),
        s => format!("{}h {:02}m", s / 3600, (s % 3600) / 60),
    }
}

/// Shorten `0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48` to `0xa0b8…eb48`.
pub fn short_address(addr: &str) -> String {
    if addr.len() <= 12 {
        return addr.to_string();
    }
    format!("{}…{}", &addr[..6], &addr[addr.len() - 4..])
}
