//! Row-key codec for the alert archive index tables
//!
//! Every index table keys its rows with a `_`-delimited composite:
//! `[salt_]primary[_secondary][_timestamp]`. Which optional segments are
//! present is declared per table family by a [`TableShape`]:
//!
//! - object tables: `ZTF21abcdefg_2459000.5` (no salt, timestamp suffix)
//! - class / pixel tables: `Early SN Ia candidate_2459000.5`, `12345_2459000.5`
//! - jd-indexed timelines: `2459000.5_ZTF21abcdefg` (secondary, no timestamp)
//! - salted object tables: `789_170000000000000789` (3-char suffix salt)
//! - name resolvers: `c_sn2023abc` (1-char case-folded suffix salt)
//! - solar system sources: `24_K24A01B_60400.1` (characters 1..3 as salt)
//! - daily summaries: `20260129` (primary only)
//!
//! The salt is derived deterministically from the primary identifier so that
//! keys written by the ingestion side are reproduced bit for bit here.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ArchiveError;
use crate::Result;

/// Segment delimiter shared by every table family
pub const KEY_DELIMITER: char = '_';

/// How the salt segment is derived from the primary identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SaltPolicy {
    /// Last `len` characters of the primary (the whole primary if shorter).
    /// With `case_fold`, salt and primary are lowercased.
    Suffix { len: usize, case_fold: bool },
    /// Characters `[start, end)` of the primary.
    Slice { start: usize, end: usize },
}

impl SaltPolicy {
    /// Compute the salt for an already normalized primary identifier
    pub fn salt_for(&self, primary: &str) -> Result<String> {
        let chars: Vec<char> = primary.chars().collect();
        match *self {
            SaltPolicy::Suffix { len, .. } => {
                let start = chars.len().saturating_sub(len);
                Ok(chars[start..].iter().collect())
            }
            SaltPolicy::Slice { start, end } => {
                if end > chars.len() || start >= end {
                    return Err(ArchiveError::MalformedKey(format!(
                        "cannot take salt [{}, {}) from '{}'",
                        start, end, primary
                    )));
                }
                Ok(chars[start..end].iter().collect())
            }
        }
    }

    /// Normalize a primary identifier before salting
    pub fn normalize(&self, primary: &str) -> String {
        match self {
            SaltPolicy::Suffix {
                case_fold: true, ..
            } => primary.to_lowercase(),
            _ => primary.to_string(),
        }
    }
}

/// Which optional segments a table family carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableShape {
    pub salt: Option<SaltPolicy>,
    pub secondary: bool,
    pub timestamp: bool,
}

impl TableShape {
    /// `{objectId}_{jd}`
    pub const OBJECT: TableShape = TableShape {
        salt: None,
        secondary: false,
        timestamp: true,
    };

    /// `{class}_{jd}` and `{pixel}_{jd}`
    pub const TIME_SUFFIXED: TableShape = TableShape::OBJECT;

    /// `{jd}_{objectId}`
    pub const TIMELINE: TableShape = TableShape {
        salt: None,
        secondary: true,
        timestamp: false,
    };

    /// `{id[-3:]}_{id}`
    pub const SALTED_OBJECT: TableShape = TableShape {
        salt: Some(SaltPolicy::Suffix {
            len: 3,
            case_fold: false,
        }),
        secondary: false,
        timestamp: false,
    };

    /// `{name[-1]}_{name}` on the lowercased name
    pub const NAME_RESOLVER: TableShape = TableShape {
        salt: Some(SaltPolicy::Suffix {
            len: 1,
            case_fold: true,
        }),
        secondary: false,
        timestamp: false,
    };

    /// `{designation[1:3]}_{designation}_{time}`
    pub const SSO_SOURCE: TableShape = TableShape {
        salt: Some(SaltPolicy::Slice { start: 1, end: 3 }),
        secondary: false,
        timestamp: true,
    };

    /// `{date}`
    pub const SUMMARY: TableShape = TableShape {
        salt: None,
        secondary: false,
        timestamp: false,
    };

    /// Number of delimited segments a key of this shape has
    pub fn segment_count(&self) -> usize {
        1 + usize::from(self.salt.is_some())
            + usize::from(self.secondary)
            + usize::from(self.timestamp)
    }
}

/// Decoded row key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    pub salt: Option<String>,
    pub primary: String,
    pub secondary: Option<String>,
    pub timestamp: Option<String>,
}

impl RowKey {
    /// Build a key for `shape`, computing the salt from the primary.
    pub fn build(
        shape: &TableShape,
        primary: &str,
        secondary: Option<&str>,
        timestamp: Option<&str>,
    ) -> Result<Self> {
        if secondary.is_some() != shape.secondary {
            return Err(ArchiveError::MalformedKey(format!(
                "secondary segment {} for this table shape",
                if shape.secondary { "required" } else { "not allowed" }
            )));
        }
        if timestamp.is_some() != shape.timestamp {
            return Err(ArchiveError::MalformedKey(format!(
                "timestamp segment {} for this table shape",
                if shape.timestamp { "required" } else { "not allowed" }
            )));
        }

        let primary = match &shape.salt {
            Some(policy) => policy.normalize(primary),
            None => primary.to_string(),
        };
        check_segment("primary", &primary)?;
        if let Some(secondary) = secondary {
            check_segment("secondary", secondary)?;
        }
        if let Some(timestamp) = timestamp {
            check_segment("timestamp", timestamp)?;
        }

        let salt = match &shape.salt {
            Some(policy) => Some(policy.salt_for(&primary)?),
            None => None,
        };

        Ok(Self {
            salt,
            primary,
            secondary: secondary.map(str::to_string),
            timestamp: timestamp.map(str::to_string),
        })
    }

    /// Serialize to the stored key string
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for segment in [
            self.salt.as_deref(),
            Some(self.primary.as_str()),
            self.secondary.as_deref(),
            self.timestamp.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if !out.is_empty() {
                out.push(KEY_DELIMITER);
            }
            out.push_str(segment);
        }
        out
    }

    /// Parse a stored key according to `shape`
    pub fn decode(raw: &str, shape: &TableShape) -> Result<Self> {
        let segments: Vec<&str> = raw.split(KEY_DELIMITER).collect();
        if segments.len() != shape.segment_count() {
            return Err(ArchiveError::MalformedKey(format!(
                "expected {} segments, got {} in '{}'",
                shape.segment_count(),
                segments.len(),
                raw
            )));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ArchiveError::MalformedKey(format!(
                "empty segment in '{}'",
                raw
            )));
        }

        let mut segments = segments.into_iter();
        let salt = shape.salt.and_then(|_| segments.next()).map(str::to_string);
        let primary = segments
            .next()
            .map(str::to_string)
            .ok_or_else(|| ArchiveError::MalformedKey(format!("missing primary in '{}'", raw)))?;
        let secondary = if shape.secondary {
            segments.next().map(str::to_string)
        } else {
            None
        };
        let timestamp = if shape.timestamp {
            segments.next().map(str::to_string)
        } else {
            None
        };

        if let (Some(policy), Some(salt)) = (&shape.salt, &salt) {
            let expected = policy.salt_for(&primary)?;
            if &expected != salt {
                return Err(ArchiveError::MalformedKey(format!(
                    "salt '{}' does not match primary '{}' (expected '{}')",
                    salt, primary, expected
                )));
            }
        }

        Ok(Self {
            salt,
            primary,
            secondary,
            timestamp,
        })
    }

    /// Timestamp segment as a Julian date, if present and numeric
    pub fn timestamp_jd(&self) -> Option<f64> {
        self.timestamp.as_deref().and_then(|t| t.parse().ok())
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn check_segment(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ArchiveError::MalformedKey(format!("{} segment is empty", name)));
    }
    if value.contains(KEY_DELIMITER) {
        return Err(ArchiveError::MalformedKey(format!(
            "{} segment '{}' contains the key delimiter",
            name, value
        )));
    }
    Ok(())
}

/// Prefix matching every key of `primary`: `[salt_]primary`, plus a trailing
/// delimiter when the shape has further segments after the primary.
pub fn key_prefix(shape: &TableShape, primary: &str) -> Result<String> {
    let primary = match &shape.salt {
        Some(policy) => policy.normalize(primary),
        None => primary.to_string(),
    };
    check_segment("primary", &primary)?;

    let mut prefix = String::new();
    if let Some(policy) = &shape.salt {
        prefix.push_str(&policy.salt_for(&primary)?);
        prefix.push(KEY_DELIMITER);
    }
    prefix.push_str(&primary);
    if shape.secondary || shape.timestamp {
        prefix.push(KEY_DELIMITER);
    }
    Ok(prefix)
}

/// Half-open key range `[primary_start, primary_stop)` over a time-suffixed table.
/// Class labels may contain the delimiter, so only emptiness is checked.
pub fn time_range(primary: &str, start_jd: f64, stop_jd: f64) -> Result<(String, String)> {
    if primary.is_empty() {
        return Err(ArchiveError::MalformedKey("primary segment is empty".to_string()));
    }
    Ok((
        format!("{}{}{}", primary, KEY_DELIMITER, format_jd(start_jd)),
        format!("{}{}{}", primary, KEY_DELIMITER, format_jd(stop_jd)),
    ))
}

/// Julian date as written into keys: shortest round-trip decimal, never
/// without a fractional part.
pub fn format_jd(jd: f64) -> String {
    let text = jd.to_string();
    if text.contains('.') || !jd.is_finite() {
        text
    } else {
        format!("{}.0", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_object_key_round_trip() {
        let key = RowKey::build(&TableShape::OBJECT, "ZTF21abcdefg", None, Some("2459000.5"))
            .unwrap();
        let encoded = key.encode();
        assert_eq!(encoded, "ZTF21abcdefg_2459000.5");
        assert_eq!(RowKey::decode(&encoded, &TableShape::OBJECT).unwrap(), key);
        assert_eq!(key.timestamp_jd(), Some(2459000.5));
    }

    #[test]
    fn test_round_trip_across_shapes() {
        let cases = [
            (TableShape::OBJECT, "ZTF18aaaaaaa", None, Some("2458800.0")),
            (TableShape::TIMELINE, "2459000.5", Some("ZTF18aaaaaaa"), None),
            (TableShape::SALTED_OBJECT, "170000000000000789", None, None),
            (TableShape::NAME_RESOLVER, "sn2023abc", None, None),
            (TableShape::SSO_SOURCE, "K24A01B", None, Some("60400.1")),
            (TableShape::SUMMARY, "20260129", None, None),
        ];
        for (shape, primary, secondary, timestamp) in cases {
            let key = RowKey::build(&shape, primary, secondary, timestamp).unwrap();
            let decoded = RowKey::decode(&key.encode(), &shape).unwrap();
            assert_eq!(decoded, key);
        }
    }

    #[test]
    fn test_salted_object_key() {
        let key =
            RowKey::build(&TableShape::SALTED_OBJECT, "170000000000000789", None, None).unwrap();
        assert_eq!(key.encode(), "789_170000000000000789");
    }

    #[test]
    fn test_name_resolver_salt_is_case_folded() {
        let key = RowKey::build(&TableShape::NAME_RESOLVER, "SN2023ABC", None, None).unwrap();
        assert_eq!(key.encode(), "c_sn2023abc");
        assert_eq!(
            key_prefix(&TableShape::NAME_RESOLVER, "SN2023ABC").unwrap(),
            "c_sn2023abc"
        );
    }

    #[test]
    fn test_short_primary_uses_whole_identifier_as_salt() {
        let key = RowKey::build(&TableShape::SALTED_OBJECT, "42", None, None).unwrap();
        assert_eq!(key.encode(), "42_42");
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        let err = RowKey::decode("ZTF21abcdefg", &TableShape::OBJECT).unwrap_err();
        assert!(matches!(err, ArchiveError::MalformedKey(_)));

        let err = RowKey::decode("a_b_c", &TableShape::OBJECT).unwrap_err();
        assert!(matches!(err, ArchiveError::MalformedKey(_)));
    }

    #[test]
    fn test_decode_rejects_inconsistent_salt() {
        let err = RowKey::decode("123_170000000000000789", &TableShape::SALTED_OBJECT).unwrap_err();
        assert!(matches!(err, ArchiveError::MalformedKey(_)));
    }

    #[test]
    fn test_build_rejects_delimiter_in_components() {
        let err =
            RowKey::build(&TableShape::OBJECT, "bad_id", None, Some("2459000.5")).unwrap_err();
        assert!(matches!(err, ArchiveError::MalformedKey(_)));

        let err = RowKey::build(&TableShape::OBJECT, "ZTF21abcdefg", None, None).unwrap_err();
        assert!(matches!(err, ArchiveError::MalformedKey(_)));
    }

    #[test]
    fn test_prefixes_and_ranges() {
        assert_eq!(
            key_prefix(&TableShape::OBJECT, "ZTF21abcdefg").unwrap(),
            "ZTF21abcdefg_"
        );
        assert_eq!(
            key_prefix(&TableShape::SALTED_OBJECT, "170000000000000789").unwrap(),
            "789_170000000000000789"
        );

        let (start, stop) = time_range("QSO", 2458788.5, 2459000.0).unwrap();
        assert_eq!(start, "QSO_2458788.5");
        assert_eq!(stop, "QSO_2459000.0");
        assert!(start <= stop);
    }

    #[test]
    fn test_sso_salt_is_sliced_from_designation() {
        assert_eq!(
            key_prefix(&TableShape::SSO_SOURCE, "K24A01B").unwrap(),
            "24_K24A01B_"
        );
        assert_eq!(
            RowKey::decode("24_K24A01B_60400.1", &TableShape::SSO_SOURCE)
                .unwrap()
                .primary,
            "K24A01B"
        );
        // too short to slice
        let err = key_prefix(&TableShape::SSO_SOURCE, "K2").unwrap_err();
        assert!(matches!(err, ArchiveError::MalformedKey(_)));

        assert_eq!(key_prefix(&TableShape::SUMMARY, "202601").unwrap(), "202601");
    }

    #[test]
    fn test_format_jd() {
        assert_eq!(format_jd(2459000.0), "2459000.0");
        assert_eq!(format_jd(2459432.7045718), "2459432.7045718");
    }
}
