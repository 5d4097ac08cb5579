//! NATS subject parser for the alert archive providers
//!
//! Parses NATS subjects in the format:
//! `archive.{intent}.{action}`
//!
//! Examples:
//! - `archive.objects.query`
//! - `archive.conesearch.query`
//! - `archive.schema.get`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Query intent addressed by a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Objects,
    Classes,
    Conesearch,
    Timeline,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Objects => "objects",
            QueryKind::Classes => "classes",
            QueryKind::Conesearch => "conesearch",
            QueryKind::Timeline => "timeline",
        }
    }
}

impl FromStr for QueryKind {
    type Err = SubjectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "objects" => Ok(QueryKind::Objects),
            "classes" => Ok(QueryKind::Classes),
            "conesearch" => Ok(QueryKind::Conesearch),
            "timeline" => Ok(QueryKind::Timeline),
            other => Err(SubjectParseError::InvalidIntent(format!(
                "Unknown intent: {}. Valid intents: objects, classes, conesearch, timeline",
                other
            ))),
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed information from a NATS subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectInfo {
    pub intent: QueryKind,
    /// Action to perform (currently only "query")
    pub action: String,
}

impl SubjectInfo {
    /// Parse a NATS subject into SubjectInfo
    ///
    /// Expected format: `archive.{intent}.query`
    ///
    /// # Examples
    /// ```
    /// use alert_archive_common::subject_parser::{QueryKind, SubjectInfo};
    ///
    /// let info = SubjectInfo::parse("archive.conesearch.query").unwrap();
    /// assert_eq!(info.intent, QueryKind::Conesearch);
    /// assert_eq!(info.action, "query");
    /// ```
    pub fn parse(subject: &str) -> Result<Self, SubjectParseError> {
        let parts: Vec<&str> = subject.split('.').collect();

        if parts.len() != 3 {
            return Err(SubjectParseError::InvalidFormat(format!(
                "Expected format 'archive.{{intent}}.{{action}}', got: {}",
                subject
            )));
        }

        if parts[0] != "archive" {
            return Err(SubjectParseError::InvalidPrefix(format!(
                "Subject must start with 'archive', got: {}",
                parts[0]
            )));
        }

        let intent = parts[1].parse()?;
        let action = parts[2].to_string();
        if action != "query" {
            return Err(SubjectParseError::InvalidAction(format!(
                "Unknown action: {}. Valid actions: query",
                action
            )));
        }

        Ok(Self { intent, action })
    }

    /// Build the subject for an intent
    pub fn query_subject(intent: QueryKind) -> String {
        format!("archive.{}.query", intent)
    }
}

/// Subject parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubjectParseError {
    #[error("Invalid subject format: {0}")]
    InvalidFormat(String),
    #[error("Invalid subject prefix: {0}")]
    InvalidPrefix(String),
    #[error("Invalid intent: {0}")]
    InvalidIntent(String),
    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_subjects() {
        for intent in [
            QueryKind::Objects,
            QueryKind::Classes,
            QueryKind::Conesearch,
            QueryKind::Timeline,
        ] {
            let subject = SubjectInfo::query_subject(intent);
            assert_eq!(SubjectInfo::parse(&subject).unwrap().intent, intent);
        }
    }

    #[test]
    fn test_parse_invalid_subjects() {
        assert!(matches!(
            SubjectInfo::parse("archive.objects"),
            Err(SubjectParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            SubjectInfo::parse("alerts.objects.query"),
            Err(SubjectParseError::InvalidPrefix(_))
        ));
        assert!(matches!(
            SubjectInfo::parse("archive.skymap.query"),
            Err(SubjectParseError::InvalidIntent(_))
        ));
        assert!(matches!(
            SubjectInfo::parse("archive.objects.write"),
            Err(SubjectParseError::InvalidAction(_))
        ));
    }
}
