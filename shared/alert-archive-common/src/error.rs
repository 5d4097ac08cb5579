//! Error types for the alert archive providers

use thiserror::Error;

/// Alert archive query errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArchiveError {
    /// Unparsable or out-of-range sky coordinate
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Cone radius above the allowed maximum
    #[error("Radius too large: {radius_arcsec} arcsec (maximum is {max_arcsec} arcsec)")]
    RadiusTooLarge { radius_arcsec: f64, max_arcsec: f64 },

    /// Row key does not match the declared table shape
    #[error("Malformed row key: {0}")]
    MalformedKey(String),

    /// Store scan or schema call failed
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Column returned by the store has no schema entry, or a value cannot be coerced
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A column needed by a derived field is missing
    #[error("Missing derivation input: {0}")]
    MissingDerivationInput(String),

    /// Trend name unknown or not allowed for the class
    #[error("Invalid trend: {0}")]
    InvalidTrend(String),

    /// Request payload or parameter validation error
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Caller cancelled the query before it completed
    #[error("Query cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ArchiveError {
    /// Stable machine-readable code used in wire error replies.
    pub fn code(&self) -> &'static str {
        match self {
            ArchiveError::InvalidCoordinate(_) => "invalid_coordinate",
            ArchiveError::RadiusTooLarge { .. } => "radius_too_large",
            ArchiveError::MalformedKey(_) => "malformed_key",
            ArchiveError::UpstreamUnavailable(_) => "upstream_unavailable",
            ArchiveError::SchemaMismatch(_) => "schema_mismatch",
            ArchiveError::MissingDerivationInput(_) => "missing_derivation_input",
            ArchiveError::InvalidTrend(_) => "invalid_trend",
            ArchiveError::InvalidRequest(_) => "invalid_request",
            ArchiveError::Cancelled => "cancelled",
            ArchiveError::SerializationError(_) => "serialization_error",
            ArchiveError::ConfigError(_) => "config_error",
        }
    }

    /// Validation failures the caller can fix (4xx class).
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ArchiveError::InvalidCoordinate(_)
                | ArchiveError::RadiusTooLarge { .. }
                | ArchiveError::InvalidTrend(_)
                | ArchiveError::InvalidRequest(_)
        )
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        ArchiveError::SerializationError(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for ArchiveError {
    fn from(err: arrow::error::ArrowError) -> Self {
        ArchiveError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for ArchiveError {
    fn from(err: reqwest::Error) -> Self {
        ArchiveError::UpstreamUnavailable(err.to_string())
    }
}

impl From<anyhow::Error> for ArchiveError {
    fn from(err: anyhow::Error) -> Self {
        ArchiveError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_are_validation_failures() {
        assert!(ArchiveError::InvalidCoordinate("x".into()).is_user_error());
        assert!(ArchiveError::RadiusTooLarge {
            radius_arcsec: 20000.0,
            max_arcsec: 18000.0
        }
        .is_user_error());
        assert!(ArchiveError::InvalidTrend("x".into()).is_user_error());
        assert!(!ArchiveError::UpstreamUnavailable("down".into()).is_user_error());
        assert!(!ArchiveError::SchemaMismatch("x".into()).is_user_error());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ArchiveError::Cancelled.code(), "cancelled");
        assert_eq!(
            ArchiveError::MissingDerivationInput("i:jd".into()).code(),
            "missing_derivation_input"
        );
    }
}
