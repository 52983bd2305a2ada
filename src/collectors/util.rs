//! Shared helpers for the AWS fetchers:
//! - Prometheus label sanitization for instance tag keys.
//! - Unit conversions applied at the fetch boundary so that every emitted
//!   value is already in base units (bytes, seconds).

use once_cell::sync::OnceCell;
use regex::Regex;

const GIGABYTE: i64 = 1 << 30;
const MEGABYTE: i64 = 1 << 20;
const DAY_SECONDS: i64 = 86_400;

/// Replace every character that is not valid in a Prometheus label name
/// with an underscore.
///
/// # Panics
///
/// Panics if the regex cannot be compiled (should never happen).
#[must_use]
pub fn clear_prometheus_label(name: &str) -> String {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"[^a-zA-Z0-9_]").expect("Invalid regex")
    });

    re.replace_all(name, "_").into_owned()
}

/// Convert a gibibyte count to bytes.
#[inline]
#[must_use]
pub const fn gib_to_bytes(value: i64) -> i64 {
    value * GIGABYTE
}

/// Convert a gibibyte count (as reported by service quotas) to bytes.
#[inline]
#[must_use]
pub fn gib_to_bytes_f64(value: f64) -> f64 {
    value * GIGABYTE as f64
}

/// Convert a mebibyte count to bytes.
#[inline]
#[must_use]
pub const fn mib_to_bytes(value: i64) -> i64 {
    value * MEGABYTE
}

/// Convert a megabyte-per-second rate to bytes per second.
#[inline]
#[must_use]
pub fn mbps_to_bytes_per_second(value: f64) -> f64 {
    value * 1_000_000.0
}

/// Convert an integral megabyte-per-second rate to bytes per second.
#[inline]
#[must_use]
pub const fn mbps_to_bytes(value: i64) -> i64 {
    value * 1_000_000
}

/// Convert a day count (backup retention) to seconds.
#[inline]
#[must_use]
pub const fn days_to_seconds(value: i64) -> i64 {
    value * DAY_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_prometheus_label() {
        assert_eq!(clear_prometheus_label("environment"), "environment");
        assert_eq!(clear_prometheus_label("cost-center"), "cost_center");
        assert_eq!(clear_prometheus_label("team/name"), "team_name");
        assert_eq!(clear_prometheus_label("a.b:c d"), "a_b_c_d");
        assert_eq!(clear_prometheus_label("Valid_123"), "Valid_123");
    }

    #[test]
    fn test_gib_to_bytes() {
        assert_eq!(gib_to_bytes(1), 1_073_741_824);
        assert_eq!(gib_to_bytes(20), 21_474_836_480);
        assert_eq!(gib_to_bytes(0), 0);
    }

    #[test]
    fn test_gib_to_bytes_f64() {
        assert!((gib_to_bytes_f64(100.0) - 107_374_182_400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mib_to_bytes() {
        assert_eq!(mib_to_bytes(1), 1_048_576);
        assert_eq!(mib_to_bytes(2048), 2_147_483_648);
    }

    #[test]
    fn test_mbps_to_bytes_per_second() {
        assert!((mbps_to_bytes_per_second(347.5) - 347_500_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_days_to_seconds() {
        assert_eq!(days_to_seconds(7), 604_800);
        assert_eq!(days_to_seconds(0), 0);
    }
}
