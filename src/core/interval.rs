// src/core/interval.rs

//! Parsing of `<float><unit>` time-interval strings into integer microseconds.
//!
//! Units are `us`, `ms`, `s` and `m` (minutes), matched case-insensitively by
//! longest suffix first so that `250ms` is milliseconds and not seconds. Bare
//! numbers are interpreted as seconds. The scheduling form
//! `"<interval>:<offset>"` is never parsed here; it travels verbatim to the
//! daemons.

use crate::core::errors::ConductorError;

const USEC_PER_MSEC: f64 = 1_000.0;
const USEC_PER_SEC: f64 = 1_000_000.0;
const USEC_PER_MIN: f64 = 60_000_000.0;

/// Converts an interval string to integer microseconds.
pub fn to_micros(interval: &str) -> Result<u64, ConductorError> {
    let lowered = interval.trim().to_ascii_lowercase();

    let (number, scale) = if let Some(rest) = lowered.strip_suffix("us") {
        (rest, 1.0)
    } else if let Some(rest) = lowered.strip_suffix("ms") {
        (rest, USEC_PER_MSEC)
    } else if let Some(rest) = lowered.strip_suffix('s') {
        (rest, USEC_PER_SEC)
    } else if let Some(rest) = lowered.strip_suffix('m') {
        (rest, USEC_PER_MIN)
    } else {
        (lowered.as_str(), USEC_PER_SEC)
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| ConductorError::InvalidInterval(interval.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(ConductorError::InvalidInterval(interval.to_string()));
    }
    Ok((value * scale).round() as u64)
}
