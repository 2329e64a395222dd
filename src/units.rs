use std::time::Duration;

use chrono::{DateTime, Utc};
use indicatif::HumanDuration;

/// Label used for layers that carry no filesystem content.
pub const ZERO_SIZE: &str = "0B";

const BINARY_UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

/// Human-readable binary size with up to four significant digits and no
/// space before the unit: `100B`, `1.5KiB`, `77.84MiB`.
pub fn bytes_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < BINARY_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{}{}", significant(size, 4), BINARY_UNITS[unit])
}

/// Format like C's `%.{digits}g` for the magnitudes `bytes_size` produces.
fn significant(value: f64, digits: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let magnitude = value.abs().log10().floor() as i64;
    let decimals = (digits as i64 - 1 - magnitude).max(0) as usize;
    let text = format!("{value:.decimals$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// How long ago `then` was, as seen from `now`. Timestamps in the future
/// clamp to zero.
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = (now - then).to_std().unwrap_or(Duration::ZERO);
    HumanDuration(elapsed).to_string()
}
