use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
}

const NANOS_PER_SECOND: u64 = 1_000_000_000;

// Both micro signs are accepted: U+00B5 and U+03BC.
const UNITS: &[(&str, u64)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("\u{00b5}s", 1_000),
    ("\u{03bc}s", 1_000),
    ("ms", 1_000_000),
    ("s", NANOS_PER_SECOND),
    ("m", 60 * NANOS_PER_SECOND),
    ("h", 3600 * NANOS_PER_SECOND),
];

// Magnitude of i64::MIN; the largest value a negative duration may reach.
const LIMIT: u64 = 1 << 63;

/// Parse a duration such as `"90s"`, `"2m"`, `"1h30m"`, `"1.5h"` or `"-5m"`.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let invalid = || DurationError::Invalid(input.to_string());

    let mut s = input;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }
    if s == "0" {
        return Ok(Duration::zero());
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    while !s.is_empty() {
        let first = s.as_bytes()[0];
        if !(first == b'.' || first.is_ascii_digit()) {
            return Err(invalid());
        }

        let (whole, rest) = leading_int(s).ok_or_else(invalid)?;
        let has_whole = rest.len() != s.len();
        s = rest;

        let mut fraction = 0u64;
        let mut scale = 1.0f64;
        let mut has_fraction = false;
        if let Some(rest) = s.strip_prefix('.') {
            let (f, sc, after) = leading_fraction(rest);
            has_fraction = after.len() != rest.len();
            fraction = f;
            scale = sc;
            s = after;
        }
        if !has_whole && !has_fraction {
            return Err(invalid());
        }

        let unit_end = s
            .bytes()
            .position(|b| b == b'.' || b.is_ascii_digit())
            .unwrap_or(s.len());
        if unit_end == 0 {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let (unit, rest) = s.split_at(unit_end);
        s = rest;
        let multiplier = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, m)| *m)
            .ok_or_else(|| DurationError::UnknownUnit {
                unit: unit.to_string(),
                input: input.to_string(),
            })?;

        if whole > LIMIT / multiplier {
            return Err(invalid());
        }
        let mut value = whole * multiplier;
        if fraction > 0 {
            value += (fraction as f64 * (multiplier as f64 / scale)) as u64;
            if value > LIMIT {
                return Err(invalid());
            }
        }
        total = total.checked_add(value).ok_or_else(invalid)?;
        if total > LIMIT {
            return Err(invalid());
        }
    }

    if negative {
        let nanos = if total == LIMIT { i64::MIN } else { -(total as i64) };
        return Ok(Duration::nanoseconds(nanos));
    }
    if total > LIMIT - 1 {
        return Err(invalid());
    }
    Ok(Duration::nanoseconds(total as i64))
}

fn leading_int(s: &str) -> Option<(u64, &str)> {
    let mut x: u64 = 0;
    let mut consumed = 0;
    for b in s.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        if x > LIMIT / 10 {
            return None;
        }
        x = x * 10 + u64::from(b - b'0');
        if x > LIMIT {
            return None;
        }
        consumed += 1;
    }
    Some((x, &s[consumed..]))
}

// Digits past the representable precision are consumed but ignored.
fn leading_fraction(s: &str) -> (u64, f64, &str) {
    let mut x: u64 = 0;
    let mut scale = 1.0f64;
    let mut overflow = false;
    let mut consumed = 0;
    for b in s.bytes() {
        if !b.is_ascii_digit() {
            break;
        }
        consumed += 1;
        if overflow {
            continue;
        }
        if x > (LIMIT - 1) / 10 {
            overflow = true;
            continue;
        }
        let y = x * 10 + u64::from(b - b'0');
        if y > LIMIT {
            overflow = true;
            continue;
        }
        x = y;
        scale *= 10.0;
    }
    (x, scale, &s[consumed..])
}

fn total_nanos(d: Duration) -> i128 {
    i128::from(d.num_seconds()) * i128::from(NANOS_PER_SECOND) + i128::from(d.subsec_nanos())
}

/// The duration as floating-point seconds.
pub fn seconds(d: Duration) -> f64 {
    let nanos = total_nanos(d);
    let per_second = i128::from(NANOS_PER_SECOND);
    (nanos / per_second) as f64 + (nanos % per_second) as f64 / 1e9
}

/// Seconds as the shortest plain decimal that round-trips, e.g. `120` or `60.5`.
pub fn format_seconds(d: Duration) -> String {
    format!("{}", seconds(d))
}

/// Render a duration as `2m0s`, `1h30m0s`, `1.5s` or `300ms`.
pub fn format_duration(d: Duration) -> String {
    let nanos = total_nanos(d);
    let negative = nanos < 0;
    let mut u = nanos.unsigned_abs();

    let body = if u < u128::from(NANOS_PER_SECOND) {
        if u == 0 {
            return "0s".to_string();
        }
        let (prec, unit) = if u < 1_000 {
            (0, "ns")
        } else if u < 1_000_000 {
            (3, "\u{00b5}s")
        } else {
            (6, "ms")
        };
        let (frac, whole) = split_fraction(u, prec);
        format!("{whole}{frac}{unit}")
    } else {
        let (frac, secs) = split_fraction(u, 9);
        u = secs;
        let mut out = format!("{}{}s", u % 60, frac);
        u /= 60;
        if u > 0 {
            out = format!("{}m{}", u % 60, out);
            u /= 60;
            if u > 0 {
                out = format!("{u}h{out}");
            }
        }
        out
    };

    if negative {
        format!("-{body}")
    } else {
        body
    }
}

fn split_fraction(v: u128, prec: u32) -> (String, u128) {
    if prec == 0 {
        return (String::new(), v);
    }
    let pow = 10u128.pow(prec);
    let frac = v % pow;
    if frac == 0 {
        return (String::new(), v / pow);
    }
    let digits = format!("{:0width$}", frac, width = prec as usize);
    (format!(".{}", digits.trim_end_matches('0')), v / pow)
}
