//! Publish-date normalization and the recency window.
//!
//! Sources print dates as relative French phrases ("Aujourd'hui", "il y a 3 jours"),
//! day-first literals, or ISO timestamps pulled from embedded JSON. Everything is
//! reduced to a naive local timestamp; anything unrecognized is `None` ("unknown").

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};
use regex::Regex;

static DAYS_AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:il y a (\d+) jours?|(\d+) days? ago)").unwrap());
static DAY_FIRST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2})[-/](\d{2})[-/](\d{4})").unwrap());

/// Trailing window a listing must fall in to be kept.
pub const RECENCY_WEEKS: i64 = 4;

/// Sentinel some sources emit when the page shows no date.
pub const UNKNOWN: &str = "Unknown";

pub fn normalize(text: &str) -> Option<NaiveDateTime> {
    normalize_at(text, Local::now().naive_local())
}

/// Normalize `text` relative to `now`.
pub fn normalize_at(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if text.is_empty() || text == UNKNOWN {
        return None;
    }
    let s = text.trim().to_lowercase().replace('’', "'");

    if s.contains("aujourd'hui") || s.contains("today") {
        return Some(now);
    }
    if s.contains("hier") || s.contains("yesterday") {
        return Some(now - Duration::days(1));
    }
    if let Some(caps) = DAYS_AGO_RE.captures(&s) {
        let days = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse::<i64>().ok())?;
        // Out-of-range counts read as unknown
        return Duration::try_days(days).and_then(|d| now.checked_sub_signed(d));
    }
    // No sub-day precision
    if (s.contains("il y a") && (s.contains("heure") || s.contains("minute")))
        || ((s.contains("hour") || s.contains("minute")) && s.contains("ago"))
    {
        return Some(now);
    }
    if let Some(caps) = DAY_FIRST_RE.captures(&s) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0);
    }
    if s.chars().count() >= 10 {
        return parse_iso_token(s.split(' ').next().unwrap_or_default());
    }
    None
}

/// Strict ISO parse of a single token: full timestamps first, then a bare date.
fn parse_iso_token(token: &str) -> Option<NaiveDateTime> {
    let upper = token.to_uppercase();
    if let Ok(dt) = DateTime::parse_from_rfc3339(&upper) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&upper, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(token, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

pub fn within_window(date: Option<NaiveDateTime>) -> bool {
    within_window_at(date, Local::now().naive_local())
}

/// Unknown dates are kept; known dates must be no older than `RECENCY_WEEKS`.
pub fn within_window_at(date: Option<NaiveDateTime>, now: NaiveDateTime) -> bool {
    match date {
        None => true,
        Some(d) => d >= now - Duration::weeks(RECENCY_WEEKS),
    }
}

/// Convenience for detail extractors: parse and check in one step.
pub fn is_recent(text: &str) -> bool {
    within_window(normalize(text))
}
