//! Scalar parsers and normalisers shared by the columnar and row paths.
//!
//! Both the Arrow kernels in `remedia-pipeline` and the row-at-a-time
//! reference implementation call these functions, so the two paths cannot
//! drift apart.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SubsecRound};
use regex::Regex;

/// Days from 0001-01-01 (CE) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// RFC 5322 address: dot-atom or quoted local part, host name or
/// bracketed IPv4 literal. Matched against the whole trimmed value.
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"(?i)^(?:[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*"#,
        r#"|"(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21\x23-\x5b\x5d-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])*")"#,
        r#"@(?:(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?"#,
        r#"|\[(?:(?:25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\.){3}"#,
        r#"(?:25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9]"#,
        r#"|[a-z0-9-]*[a-z0-9]:(?:[\x01-\x08\x0b\x0c\x0e-\x1f\x21-\x5a\x53-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])+)\])$"#,
    ))
    .expect("email pattern compiles")
});

/// Parse an integer, ignoring surrounding whitespace.
///
/// Returns `None` for missing, blank, non-numeric or out-of-range input.
pub fn parse_integer<T: FromStr>(raw: Option<&str>) -> Option<T> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse().ok()
}

/// Parse a calendar date, trying each format in order.
pub fn parse_date<S: AsRef<str>>(raw: Option<&str>, formats: &[S]) -> Option<NaiveDate> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f.as_ref()).ok())
}

/// Parse a timestamp, truncated to microseconds.
///
/// Tries the timestamp formats, then RFC 3339 (converted to UTC, zone
/// dropped), then the date formats at midnight.
pub fn parse_timestamp<S: AsRef<str>>(
    raw: Option<&str>,
    timestamp_formats: &[S],
    date_formats: &[S],
) -> Option<NaiveDateTime> {
    let s = raw?.trim();
    if s.is_empty() {
        return None;
    }
    timestamp_formats
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f.as_ref()).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
        .or_else(|| parse_date(Some(s), date_formats).and_then(|d| d.and_hms_opt(0, 0, 0)))
        .map(|ts| ts.trunc_subsecs(6))
}

/// Normalise a personal name: trim, collapse internal whitespace, and
/// title-case each word. Blank input becomes `None`.
///
/// A letter is upper-cased when it follows a non-letter, so
/// `"o'brien-smith"` becomes `"O'Brien-Smith"`. Letters whose case
/// mapping is more than one character (`ß`, `İ`) are kept as written.
pub fn normalize_name(raw: Option<&str>) -> Option<String> {
    let words: Vec<&str> = raw?.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(words.iter().map(|w| w.len() + 1).sum());
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let mut upper_next = true;
        for c in word.chars() {
            if c.is_alphabetic() {
                out.push(if upper_next {
                    single_char(c.to_uppercase()).unwrap_or(c)
                } else {
                    single_char(c.to_lowercase()).unwrap_or(c)
                });
                upper_next = false;
            } else {
                out.push(c);
                upper_next = true;
            }
        }
    }
    Some(out)
}

fn single_char(mut mapped: impl Iterator<Item = char>) -> Option<char> {
    let c = mapped.next()?;
    mapped.next().is_none().then_some(c)
}

/// Trim an e-mail address. Blank input becomes `None`.
pub fn normalize_email(raw: Option<&str>) -> Option<String> {
    let s = raw?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Canonical form of a status token: trimmed and lower-cased.
pub fn normalize_status(raw: Option<&str>) -> Option<String> {
    let s = raw?.trim();
    (!s.is_empty()).then(|| s.to_lowercase())
}

/// Whether a (trimmed) e-mail address looks deliverable.
pub fn is_valid_email(email: Option<&str>) -> bool {
    email.is_some_and(|e| !e.is_empty() && EMAIL_PATTERN.is_match(e))
}

/// Age in whole calendar years at account creation, by year difference.
pub fn age_at_creation(birth_date: NaiveDate, created_at: NaiveDateTime) -> i32 {
    created_at.year() - birth_date.year()
}

/// Arrow `Date32` value (days since the Unix epoch).
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Arrow `Timestamp(Microsecond)` value.
pub fn timestamp_to_micros(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}
