//! Completion percentage from an ffmpeg timemark.

use std::sync::OnceLock;

use cq_core::config::ProgressFormula;
use regex::Regex;

fn timemark_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+):(\d{1,2}):(\d{1,2})(?:\.\d+)?$").expect("timemark regex is valid")
    })
}

/// Percentage (0..=100) of `duration_secs` covered by `timemark`.
///
/// Returns 0 while nothing has been written (`target_size == 0`) or when the
/// timemark does not parse. Never panics on degenerate durations.
pub fn estimate_percent(
    duration_secs: f64,
    timemark: &str,
    target_size: u64,
    formula: ProgressFormula,
) -> u8 {
    if target_size == 0 {
        return 0;
    }
    let raw = match formula {
        ProgressFormula::Legacy => legacy(duration_secs, timemark),
        ProgressFormula::Ratio => ratio(duration_secs, timemark),
    };
    to_percent(raw)
}

/// `minutes.seconds` read as a decimal against a duration-derived window.
fn legacy(duration_secs: f64, timemark: &str) -> f64 {
    let value = timemark_re()
        .captures(timemark.trim())
        .and_then(|c| format!("{}.{}", &c[2], &c[3]).parse::<f64>().ok())
        .unwrap_or(0.0);
    let window = ((duration_secs % 3600.0) / 62.5) % (duration_secs % 60.0).ceil();
    if !window.is_finite() || window <= 0.0 {
        return 0.0;
    }
    value / window * 100.0
}

fn ratio(duration_secs: f64, timemark: &str) -> f64 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return 0.0;
    }
    let elapsed = timemark_re()
        .captures(timemark.trim())
        .map(|c| {
            let part = |i: usize| c[i].parse::<f64>().unwrap_or(0.0);
            part(1) * 3600.0 + part(2) * 60.0 + part(3)
        })
        .unwrap_or(0.0);
    (elapsed / duration_secs).clamp(0.0, 1.0) * 100.0
}

fn to_percent(raw: f64) -> u8 {
    if raw.is_finite() {
        raw.round().clamp(0.0, 100.0) as u8
    } else {
        0
    }
}
