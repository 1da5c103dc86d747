//! Normalization of the timestamp formats found in the wild in feeds.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};

/// Offset-carrying layouts for the part after an optional weekday.
const OFFSET_FORMATS: &[&str] = &["%d %b %Y %H:%M:%S %z", "%e %b %Y %H:%M:%S %z"];

const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a feed timestamp, returning `None` if no known layout matches.
///
/// A leading weekday is dropped without being checked against the date, and
/// a zone abbreviation chrono does not know is read as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let body = strip_weekday(raw);

    parse_with_offset(body)
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt: DateTime<FixedOffset>| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT)
                .ok()
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            DateTime::parse_from_rfc2822(body)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
        .or_else(|| {
            let (rest, zone) = body.rsplit_once(' ')?;
            if !zone.chars().all(|c| c.is_ascii_alphabetic()) {
                return None;
            }
            parse_with_offset(&format!("{rest} +0000")).map(|dt| dt.with_timezone(&Utc))
        })
}

fn parse_with_offset(body: &str) -> Option<DateTime<FixedOffset>> {
    OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(body, format).ok())
}

/// `"Tue, 15 Jan 2024 ..."` -> `"15 Jan 2024 ..."`.
fn strip_weekday(raw: &str) -> &str {
    match raw.split_once(',') {
        Some((day, rest)) if day.len() >= 3 && day.chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim_start()
        }
        _ => raw,
    }
}

/// Like [`parse_date`], but never fails: empty or unrecognized input maps to
/// the current time, so such items sort as the most recent.
pub fn normalize_date(raw: &str) -> DateTime<Utc> {
    parse_date(raw).unwrap_or_else(|| {
        if !raw.trim().is_empty() {
            tracing::debug!("Unrecognized date {:?}, using current time", raw);
        }
        Utc::now()
    })
}
