//! Julian date helpers
//!
//! Index keys and the `i:jd` column carry Julian dates (UTC). Query
//! parameters may be given either as raw Julian dates or as ISO strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::ArchiveError;
use crate::Result;

/// Julian date of 1970-01-01T00:00:00Z
pub const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Julian date of 2019-11-01T00:00:00Z, start of the alert archive
pub const ARCHIVE_EPOCH_JD: f64 = 2_458_788.5;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Bare numbers outside this range are not taken as Julian dates
/// (1858-11-16 to 2132-08-31)
pub const PLAUSIBLE_JD: std::ops::RangeInclusive<f64> = 2_400_000.0..=2_500_000.0;

pub fn datetime_to_jd(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0 / SECONDS_PER_DAY + UNIX_EPOCH_JD
}

pub fn jd_to_datetime(jd: f64) -> Option<DateTime<Utc>> {
    if !jd.is_finite() {
        return None;
    }
    let millis = ((jd - UNIX_EPOCH_JD) * SECONDS_PER_DAY * 1000.0).round();
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
}

/// `YYYY-MM-DD HH:MM:SS.fff` rendering of a Julian date
pub fn jd_to_iso(jd: f64) -> Option<String> {
    jd_to_datetime(jd).map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
}

pub fn now_jd() -> f64 {
    datetime_to_jd(&Utc::now())
}

/// Parse a query time bound: a Julian date, a bare year, an ISO date, an
/// ISO date-time (space or `T` separated) or RFC 3339.
pub fn parse_time(text: &str) -> Result<f64> {
    let text = text.trim();
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        return parse_time(&format!("{}-01-01", text));
    }
    if let Ok(jd) = text.parse::<f64>() {
        if PLAUSIBLE_JD.contains(&jd) {
            return Ok(jd);
        }
        return Err(ArchiveError::InvalidRequest(format!(
            "{} is not a plausible Julian date",
            text
        )));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(datetime_to_jd(&dt.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(datetime_to_jd(&naive.and_utc()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(datetime_to_jd(&naive.and_utc()));
        }
    }
    Err(ArchiveError::InvalidRequest(format!(
        "cannot interpret '{}' as a date or Julian date",
        text
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_archive_epoch() {
        assert_eq!(parse_time("2019-11-01").unwrap(), ARCHIVE_EPOCH_JD);
        assert_eq!(parse_time("2019-11-01 00:00:00").unwrap(), ARCHIVE_EPOCH_JD);
        assert_eq!(
            jd_to_iso(ARCHIVE_EPOCH_JD).unwrap(),
            "2019-11-01 00:00:00.000"
        );
    }

    #[test]
    fn test_parse_time_variants() {
        assert_eq!(parse_time("2459000.5").unwrap(), 2459000.5);
        assert_eq!(parse_time("2020-05-31T12:00:00").unwrap(), 2459001.0);
        assert_eq!(parse_time("2020-05-31T12:00:00Z").unwrap(), 2459001.0);
        assert!(matches!(
            parse_time("yesterday"),
            Err(ArchiveError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_bare_numbers() {
        assert_eq!(parse_time("2021").unwrap(), parse_time("2021-01-01").unwrap());
        assert_eq!(parse_time("2021").unwrap(), 2459215.5);
        for text in ["2021.0", "59000", "-1", "inf", "NaN"] {
            assert!(
                matches!(parse_time(text), Err(ArchiveError::InvalidRequest(_))),
                "{} accepted",
                text
            );
        }
    }

    #[test]
    fn test_now_is_after_epoch() {
        assert!(now_jd() > ARCHIVE_EPOCH_JD);
    }
}
