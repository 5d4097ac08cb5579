//! Query request bodies accepted by the alert query service

use serde::{Deserialize, Deserializer, Serialize};

fn default_true() -> bool {
    true
}

/// Accept coordinates sent either as JSON numbers or as text
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a number or a string, got {}",
            other
        ))),
    }
}

/// Alerts of one or more objects by identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectQuery {
    /// One identifier or a comma-separated list
    #[serde(alias = "objectId")]
    pub object_id: String,
    /// Table to read; the objects table when absent
    #[serde(default)]
    pub table: Option<String>,
    /// Comma-separated `family:qualifier` list
    #[serde(default)]
    pub columns: Option<String>,
    /// Full alert history, or only the latest alert per object
    #[serde(default = "default_true")]
    pub include_history: bool,
}

/// Most recent alerts of a class in a time window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassQuery {
    pub class: String,
    #[serde(default, alias = "startdate")]
    pub start: Option<String>,
    #[serde(default, alias = "stopdate")]
    pub stop: Option<String>,
    #[serde(default)]
    pub n: Option<usize>,
    #[serde(default)]
    pub columns: Option<String>,
    #[serde(default)]
    pub trend: Option<String>,
    /// Also derive rate and colour
    #[serde(default)]
    pub color: bool,
}

/// Alerts within a radius of a sky position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConeQuery {
    #[serde(deserialize_with = "string_or_number")]
    pub ra: String,
    #[serde(deserialize_with = "string_or_number")]
    pub dec: String,
    /// Radius in arcseconds
    pub radius: f64,
    #[serde(default, alias = "startdate")]
    pub start: Option<String>,
    #[serde(default, alias = "stopdate")]
    pub stop: Option<String>,
    /// Days after `start`, in place of `stop`
    #[serde(default)]
    pub window: Option<f64>,
    /// Per-pixel row limit
    #[serde(default)]
    pub n: Option<usize>,
    #[serde(default)]
    pub columns: Option<String>,
    /// Group latest alerts per (object, pixel) instead of per object
    #[serde(default)]
    pub group_by_pixel: bool,
}

/// Alerts of a time window from a jd-indexed table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineQuery {
    /// jd-indexed table to read; the timeline table when neither this nor
    /// `tag` is given
    #[serde(default)]
    pub table: Option<String>,
    /// Tag whose timeline to read
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default, alias = "startdate")]
    pub start: Option<String>,
    #[serde(default, alias = "stopdate")]
    pub stop: Option<String>,
    #[serde(default)]
    pub n: Option<usize>,
    #[serde(default)]
    pub columns: Option<String>,
}
