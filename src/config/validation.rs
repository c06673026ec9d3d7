//! Configuration validation.
//!
//! # Responsibilities
//! - Parse lease durations (Go-style duration grammar, seconds fallback)
//! - Check the log level is one the logging layer understands
//! - Refuse `skip-grant-table` without root privilege
//!
//! All checks are pure functions returning errors; only `main` decides to exit.

use std::time::Duration;

use thiserror::Error;

/// Lease parsing failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeaseError {
    /// Neither the value nor the value with a seconds suffix parsed.
    #[error("invalid lease duration {0}")]
    Invalid(String),

    /// The value parsed to a negative duration.
    #[error("invalid lease duration {0}: lease must not be negative")]
    Negative(String),
}

/// Privilege check failure.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("running with skip-grant-table requires root privilege")]
pub struct PrivilegeError;

/// Log levels accepted by the logging layer.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "fatal"];

/// Parse a lease duration.
///
/// The value is first parsed as a duration with units (`10s`, `1m30s`,
/// `250ms`). If that fails the seconds unit is appended and parsing is
/// retried, so a bare `10` means ten seconds. Negative results are rejected.
pub fn parse_lease(lease: &str) -> Result<Duration, LeaseError> {
    let parsed = parse_signed_duration(lease)
        .or_else(|| parse_signed_duration(&format!("{lease}s")));

    match parsed {
        Some(SignedDuration { negative: true, nanos }) if nanos > 0 => {
            Err(LeaseError::Negative(lease.to_string()))
        }
        Some(SignedDuration { nanos, .. }) => Ok(Duration::from_nanos(nanos)),
        None => Err(LeaseError::Invalid(lease.to_string())),
    }
}

/// Check that `level` is a known log level (case-insensitive).
pub fn is_known_log_level(level: &str) -> bool {
    LOG_LEVELS.iter().any(|l| l.eq_ignore_ascii_case(level))
}

/// Refuse to skip grant tables unless the process runs as root.
pub fn check_privilege(skip_grant_table: bool, is_root: bool) -> Result<(), PrivilegeError> {
    if skip_grant_table && !is_root {
        return Err(PrivilegeError);
    }
    Ok(())
}

/// Whether the effective user of this process is root.
pub fn has_root_privilege() -> bool {
    nix::unistd::geteuid().is_root()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SignedDuration {
    negative: bool,
    nanos: u64,
}

fn unit_nanos(unit: &str) -> Option<u64> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 60 * 60 * 1_000_000_000,
        _ => return None,
    };
    Some(nanos)
}

/// Parse `[-+]?(<int>[.<frac>]<unit>)+`, or a bare `0`.
///
/// Magnitudes beyond `i64::MAX` nanoseconds are rejected.
fn parse_signed_duration(input: &str) -> Option<SignedDuration> {
    let (negative, mut s) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if s == "0" {
        return Some(SignedDuration { negative, nanos: 0 });
    }
    if s.is_empty() {
        return None;
    }

    let mut total: u64 = 0;
    while !s.is_empty() {
        let int_len = s.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, rest) = s.split_at(int_len);
        s = rest;

        let mut frac_digits = "";
        if let Some(rest) = s.strip_prefix('.') {
            let frac_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            let (frac, rest) = rest.split_at(frac_len);
            frac_digits = frac;
            s = rest;
        }
        if int_digits.is_empty() && frac_digits.is_empty() {
            return None;
        }

        let unit_len = s
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(s.len());
        let (unit, rest) = s.split_at(unit_len);
        s = rest;
        let unit = unit_nanos(unit)?;

        let whole: u64 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().ok()?
        };
        let mut value = whole.checked_mul(unit)?;

        if !frac_digits.is_empty() {
            let mut frac: u64 = 0;
            let mut scale = 1.0_f64;
            for digit in frac_digits.bytes() {
                // Extra precision beyond u64 is dropped.
                if frac > u64::MAX / 10 - 9 {
                    break;
                }
                frac = frac * 10 + u64::from(digit - b'0');
                scale *= 10.0;
            }
            value = value.checked_add((frac as f64 * (unit as f64 / scale)) as u64)?;
        }

        total = total.checked_add(value)?;
    }

    if total > i64::MAX as u64 {
        return None;
    }
    Some(SignedDuration { negative, nanos: total })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_with_units() {
        assert_eq!(parse_lease("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_lease("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_lease("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_lease("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_lease("2us"), Ok(Duration::from_micros(2)));
        assert_eq!(parse_lease("2µs"), Ok(Duration::from_micros(2)));
        assert_eq!(parse_lease(".5s"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_lease("+3s"), Ok(Duration::from_secs(3)));
    }

    #[test]
    fn bare_number_means_seconds() {
        for n in ["0", "1", "3", "10", "3600"] {
            assert_eq!(parse_lease(n), parse_lease(&format!("{n}s")), "lease {n}");
        }
        assert_eq!(parse_lease("10"), Ok(Duration::from_secs(10)));
        assert_eq!(parse_lease("1.5"), Ok(Duration::from_millis(1500)));
    }

    #[test]
    fn trailing_number_takes_seconds_fallback() {
        assert_eq!(parse_lease("1m2"), Ok(Duration::from_secs(62)));
    }

    #[test]
    fn zero_lease() {
        assert_eq!(parse_lease("0"), Ok(Duration::ZERO));
        assert_eq!(parse_lease("-0"), Ok(Duration::ZERO));
        assert_eq!(parse_lease("0s"), Ok(Duration::ZERO));
    }

    #[test]
    fn negative_lease_rejected() {
        assert_eq!(parse_lease("-1s"), Err(LeaseError::Negative("-1s".into())));
        assert_eq!(parse_lease("-5"), Err(LeaseError::Negative("-5".into())));
    }

    #[test]
    fn garbage_lease_rejected() {
        for bad in ["", "abc", "10x", "s", "--1s", ".s", "1e3s", "1 s"] {
            assert_eq!(parse_lease(bad), Err(LeaseError::Invalid(bad.into())), "lease {bad:?}");
        }
    }

    #[test]
    fn overflowing_lease_rejected() {
        assert!(matches!(
            parse_lease("9999999999999999999h"),
            Err(LeaseError::Invalid(_))
        ));
        assert!(matches!(parse_lease("3000000h"), Err(LeaseError::Invalid(_))));
    }

    #[test]
    fn error_names_the_value() {
        let err = parse_lease("soon").unwrap_err();
        assert_eq!(err.to_string(), "invalid lease duration soon");
    }

    #[test]
    fn log_levels() {
        assert!(is_known_log_level("info"));
        assert!(is_known_log_level("WARN"));
        assert!(is_known_log_level("fatal"));
        assert!(!is_known_log_level("verbose"));
    }

    #[test]
    fn skip_grant_requires_root() {
        assert_eq!(check_privilege(true, false), Err(PrivilegeError));
        assert_eq!(check_privilege(true, true), Ok(()));
        assert_eq!(check_privilege(false, false), Ok(()));
    }
}
