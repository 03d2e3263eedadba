// src/ingest/normalize.rs
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

use crate::error::NormalizeError;
use crate::ingest::types::{Entry, PublishedParts, RawEntry};

/// Trimmed link, or `None` when missing or blank.
pub fn link_of(raw: &RawEntry) -> Option<&str> {
    raw.link.as_deref().map(str::trim).filter(|l| !l.is_empty())
}

/// Summary fallback: `summary` if present, else `description`, else empty.
pub fn summary_of(raw: &RawEntry) -> String {
    raw.summary
        .as_deref()
        .or(raw.description.as_deref())
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Build a UTC instant from decomposed parts. Out-of-range fields are an error.
pub fn utc_from_parts(p: &PublishedParts) -> Result<DateTime<Utc>, NormalizeError> {
    NaiveDate::from_ymd_opt(p.year, p.month, p.day)
        .and_then(|d| d.and_hms_opt(p.hour, p.minute, p.second))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            NormalizeError::InvalidTimestamp(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                p.year, p.month, p.day, p.hour, p.minute, p.second
            ))
        })
}

/// Turn a raw entry into an [`Entry`]. `now` stands in for a missing publication time.
pub fn normalize_entry(
    raw: &RawEntry,
    source_feed: &str,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<Entry, NormalizeError> {
    let identifier = link_of(raw).ok_or(NormalizeError::MissingLink)?;

    let published_utc = match &raw.published {
        Some(parts) => utc_from_parts(parts)?,
        None => now,
    };

    Ok(Entry {
        title: raw.title.as_deref().unwrap_or_default().trim().to_string(),
        identifier: identifier.to_string(),
        published_at: published_utc.with_timezone(&offset),
        summary: summary_of(raw),
        source_feed: source_feed.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn shifts_published_time_to_offset() {
        let raw = RawEntry {
            link: Some(" https://a.test/1 ".into()),
            title: Some("  Sensex climbs ".into()),
            published: Some(PublishedParts {
                year: 2024,
                month: 2,
                day: 29,
                hour: 20,
                minute: 0,
                second: 0,
            }),
            ..Default::default()
        };
        let e = normalize_entry(&raw, "https://feed.test/rss", ist(), now()).unwrap();
        assert_eq!(e.identifier, "https://a.test/1");
        assert_eq!(e.title, "Sensex climbs");
        assert_eq!(e.published_at.to_rfc3339(), "2024-03-01T01:30:00+05:30");
        assert_eq!(e.source_feed, "https://feed.test/rss");
    }

    #[test]
    fn missing_time_uses_now() {
        let raw = RawEntry {
            link: Some("https://a.test/1".into()),
            ..Default::default()
        };
        let e = normalize_entry(&raw, "f", ist(), now()).unwrap();
        assert_eq!(e.published_at, now().with_timezone(&ist()));
        assert_eq!(e.published_at.offset(), &ist());
    }

    #[test]
    fn out_of_range_parts_are_an_error() {
        let raw = RawEntry {
            link: Some("https://a.test/1".into()),
            published: Some(PublishedParts {
                year: 2024,
                month: 13,
                day: 1,
                hour: 0,
                minute: 0,
                second: 0,
            }),
            ..Default::default()
        };
        let err = normalize_entry(&raw, "f", ist(), now()).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidTimestamp(_)));
    }

    #[test]
    fn summary_prefers_summary_then_description() {
        let mut raw = RawEntry {
            summary: Some(" primary ".into()),
            description: Some("alt".into()),
            ..Default::default()
        };
        assert_eq!(summary_of(&raw), "primary");
        raw.summary = None;
        assert_eq!(summary_of(&raw), "alt");
        raw.description = None;
        assert_eq!(summary_of(&raw), "");
    }

    #[test]
    fn blank_link_is_rejected() {
        let raw = RawEntry {
            link: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(link_of(&raw), None);
        assert_eq!(
            normalize_entry(&raw, "f", ist(), now()).unwrap_err(),
            NormalizeError::MissingLink
        );
    }
}
