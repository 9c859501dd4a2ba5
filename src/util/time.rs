//! Timestamp and duration utilities
//!
//! Directory nodes report event times as raw ticks: 100-nanosecond
//! intervals since 1601-01-01 UTC. A value of zero means the event never
//! happened. The helpers here convert between that representation and
//! calendar timestamps, and handle the duration strings accepted on the
//! command line.

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

/// Ticks between 1601-01-01 and the Unix epoch (100ns units)
pub const UNIX_EPOCH_TICKS: i128 = 116_444_736_000_000_000;

/// Ticks per second in the raw timestamp format
pub const TICKS_PER_SEC: i128 = 10_000_000;

/// Convert a raw directory timestamp to a calendar timestamp
///
/// Returns `None` for zero, the directory's encoding of "never".
///
/// # Examples
///
/// ```
/// use lockscan::util::time::raw_timestamp_to_datetime;
///
/// // The Unix epoch expressed in 100ns ticks since 1601
/// let dt = raw_timestamp_to_datetime(116_444_736_000_000_000).unwrap();
/// assert_eq!(dt.to_rfc3339(), "1970-01-01T00:00:00+00:00");
///
/// assert!(raw_timestamp_to_datetime(0).is_none());
/// ```
pub fn raw_timestamp_to_datetime(raw: u64) -> Option<DateTime<Utc>> {
    if raw == 0 {
        return None;
    }

    let rel = raw as i128 - UNIX_EPOCH_TICKS;
    let secs: i64 = rel.div_euclid(TICKS_PER_SEC).try_into().ok()?;
    let nanos = (rel.rem_euclid(TICKS_PER_SEC) * 100) as u32;

    Utc.timestamp_opt(secs, nanos).single()
}

/// Convert a calendar timestamp back to the raw tick representation
///
/// Dates before 1601 clamp to zero. Used by the simulated backend to
/// produce realistic wire values.
pub fn datetime_to_raw_timestamp(dt: &DateTime<Utc>) -> u64 {
    let ticks = dt.timestamp() as i128 * TICKS_PER_SEC
        + (dt.timestamp_subsec_nanos() / 100) as i128
        + UNIX_EPOCH_TICKS;

    ticks.clamp(0, u64::MAX as i128) as u64
}

/// Parse a duration string with an explicit unit
///
/// Accepts `ms`, `s`, `m`, and `h` suffixes.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use lockscan::util::time::parse_duration;
///
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// ```
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    // "ms" must be checked before "s"
    let (num_str, unit_ms) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1_000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        anyhow::bail!("Invalid duration unit in '{}'. Use ms, s, m, or h", s);
    };

    let num: u64 = num_str
        .parse()
        .with_context(|| format!("Invalid number in duration: {}", num_str))?;

    Ok(Duration::from_millis(num * unit_ms))
}

/// Format a duration in human-readable form
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use lockscan::util::time::format_duration;
///
/// assert_eq!(format_duration(Duration::from_micros(250)), "250us");
/// assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
/// assert_eq!(format_duration(Duration::from_secs(5)), "5.00s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();

    if millis < 1 {
        format!("{}us", duration.as_micros())
    } else if millis < 1_000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{:.1}m", duration.as_secs_f64() / 60.0)
    }
}
