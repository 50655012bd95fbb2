//! Coercion of element text and attribute values into typed scalars.
//!
//! Every coercer reports `InvalidScalar` with the raw text instead of
//! substituting a default.

use std::str::FromStr;

use jiff::civil::DateTime;
use jiff::tz::Offset;

use crate::error::{ParseError, Result};
use crate::gpx_types::GpxTime;

/// Parse a decimal such as `35.6762` or `-2.5E3`. Non-finite values are rejected.
pub fn parse_decimal(field: &'static str, text: &str) -> Result<f64> {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ParseError::invalid_scalar(field, text)),
    }
}

pub fn parse_integer<T: FromStr>(field: &'static str, text: &str) -> Result<T> {
    parse_trimmed(field, text)
}

/// Parse a keyword into an enumeration via its `FromStr` impl.
pub fn parse_enum<T: FromStr>(field: &'static str, text: &str) -> Result<T> {
    parse_trimmed(field, text)
}

/// Parse an ISO-8601 date-time, keeping a trailing `Z` or `±HH[:MM]` offset.
pub fn parse_timestamp(field: &'static str, text: &str) -> Result<GpxTime> {
    let invalid = || ParseError::invalid_scalar(field, text);

    let (civil, offset) = split_offset(text.trim()).ok_or_else(invalid)?;
    let datetime: DateTime = civil.parse().map_err(|_| invalid())?;
    let instant = offset
        .unwrap_or(Offset::UTC)
        .to_timestamp(datetime)
        .map_err(|_| invalid())?;

    Ok(GpxTime::new(instant, offset))
}

fn parse_trimmed<T: FromStr>(field: &'static str, text: &str) -> Result<T> {
    text.trim()
        .parse::<T>()
        .map_err(|_| ParseError::invalid_scalar(field, text))
}

/// Split `text` into its civil date-time and its offset, if any.
/// Returns `None` when an offset is present but unreadable.
fn split_offset(text: &str) -> Option<(&str, Option<Offset>)> {
    if let Some(civil) = text.strip_suffix(['Z', 'z']) {
        return Some((civil, Some(Offset::UTC)));
    }

    // Dashes before the time part belong to the date.
    let Some(time_start) = text.find(['T', 't', ' ']) else {
        return Some((text, None));
    };
    match text[time_start..].rfind(['+', '-']) {
        None => Some((text, None)),
        Some(relative) => {
            let at = time_start + relative;
            let offset = parse_offset(&text[at..])?;
            Some((&text[..at], Some(offset)))
        }
    }
}

fn parse_offset(text: &str) -> Option<Offset> {
    let sign = match text.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits = &text[1..];
    if !digits.is_ascii() {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits, "00"),
        4 => (&digits[..2], &digits[2..]),
        5 if digits.as_bytes()[2] == b':' => (&digits[..2], &digits[3..]),
        _ => return None,
    };
    if !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    Offset::from_seconds(sign * (hours * 3600 + minutes * 60)).ok()
}
