//! Duration values in the config file.
//!
//! Accepts Go-style strings such as `"15m"`, `"1h30m"` or `"250ms"`, and plain
//! integers which are read as seconds.

use serde::{Deserialize, Deserializer};
use std::time::Duration;

const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("us", 1e3),
    ("µs", 1e3),
    ("μs", 1e3),
    ("ms", 1e6),
    ("s", 1e9),
    ("m", 60e9),
    ("h", 3600e9),
];

pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if text.starts_with('-') {
        return Err(format!("negative duration {text:?}"));
    }
    let body = text.strip_prefix('+').unwrap_or(text);
    if body == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = body;
    let mut nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration {text:?}"));
        }
        let number: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid number in duration {text:?}"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| {
                if unit.is_empty() {
                    format!("missing unit in duration {text:?}")
                } else {
                    format!("unknown unit {unit:?} in duration {text:?}")
                }
            })?;
        nanos += number * scale;
        rest = &rest[unit_len..];
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(format!("duration {text:?} out of range"));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

/// Serde adapter for `Option<Duration>` fields; absent and zero both mean "unset".
pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawDuration>::deserialize(deserializer)?;
    let duration = match raw {
        None => return Ok(None),
        Some(RawDuration::Seconds(secs)) => Duration::from_secs(secs),
        Some(RawDuration::Text(text)) => parse_duration(&text).map_err(serde::de::Error::custom)?,
    };
    Ok(Some(duration).filter(|d| !d.is_zero()))
}
