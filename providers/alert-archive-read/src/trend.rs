//! Trend filter: class-specific trend vocabularies applied as row predicates

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use alert_archive_common::{ArchiveError, Result};

use crate::materializer::{AlertTable, MaterializedRow, V_RATE};

/// Class whose low-state timeline is served by default
pub const DEFAULT_STATE_CLASS: &str = "(CTA) Blazar";

const MAG_RATE: &str = "d:mag_rate";
const BLAZAR_M0: &str = "d:blazar_stats_m0";
/// Position of the linear-trend slope in the light-curve feature vector
const SLOPE_POSITION: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Fading,
    LowState,
    NewLowState,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Rising => "rising",
            Trend::Fading => "fading",
            Trend::LowState => "low_state",
            Trend::NewLowState => "new_low_state",
        }
    }

    fn is_state_trend(&self) -> bool {
        matches!(self, Trend::LowState | Trend::NewLowState)
    }
}

impl FromStr for Trend {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rising" => Ok(Trend::Rising),
            "fading" => Ok(Trend::Fading),
            "low_state" => Ok(Trend::LowState),
            "new_low_state" => Ok(Trend::NewLowState),
            other => Err(ArchiveError::InvalidTrend(format!(
                "unknown trend '{}', expected rising, fading, low_state or new_low_state",
                other
            ))),
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Allow-list of class/trend pairs and the predicates behind each trend
#[derive(Debug, Clone)]
pub struct TrendRules {
    state_classes: HashSet<String>,
}

impl Default for TrendRules {
    fn default() -> Self {
        Self::new([DEFAULT_STATE_CLASS])
    }
}

impl TrendRules {
    pub fn new<I, S>(state_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state_classes: state_classes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn state_classes(&self) -> impl Iterator<Item = &str> {
        self.state_classes.iter().map(String::as_str)
    }

    pub fn is_state_class(&self, class: &str) -> bool {
        self.state_classes.contains(class)
    }

    /// Check a requested trend against the class before anything is fetched
    pub fn validate(&self, class: &str, trend: &str) -> Result<Trend> {
        let parsed: Trend = trend.parse()?;
        if parsed.is_state_trend() && !self.is_state_class(class) {
            return Err(ArchiveError::InvalidTrend(format!(
                "trend {} is not available for class {}",
                parsed, class
            )));
        }
        Ok(parsed)
    }

    /// Drop rows that do not follow `trend`
    pub fn apply(&self, trend: Trend, table: &mut AlertTable) {
        let before = table.len();
        table.retain(|row| matches_trend(trend, row));
        debug!("Trend {} kept {} of {} rows", trend, table.len(), before);
    }
}

fn matches_trend(trend: Trend, row: &MaterializedRow) -> bool {
    match trend {
        Trend::Rising => brightness_trend(row).map_or(false, |(rate, slope)| {
            rate < 0.0 && slope.map_or(true, |s| s < 0.0)
        }),
        Trend::Fading => brightness_trend(row).map_or(false, |(rate, slope)| {
            rate > 0.0 && slope.map_or(true, |s| s > 0.0)
        }),
        // the low-state timeline only holds low-state alerts
        Trend::LowState => true,
        Trend::NewLowState => row.f64(BLAZAR_M0).map_or(false, |m0| m0 >= 1.0),
    }
}

/// Magnitude rate and, when the band's feature column is present, the
/// linear-trend slope
fn brightness_trend(row: &MaterializedRow) -> Option<(f64, Option<f64>)> {
    let rate = row.f64(MAG_RATE).or_else(|| row.f64(V_RATE))?;
    let features = match row.i64("i:fid") {
        Some(1) => "d:lc_features_g",
        _ => "d:lc_features_r",
    };
    let slope = match row.get(features) {
        Some(_) => Some(row.str(features).and_then(|v| feature_at(v, SLOPE_POSITION))?),
        None => None,
    };
    Some((rate, slope))
}

/// Element `pos` of a `{a,b,...}` or `[a,b,...]` feature vector; NaN counts
/// as absent
pub fn feature_at(vector: &str, pos: usize) -> Option<f64> {
    vector
        .trim()
        .trim_start_matches(['{', '['])
        .trim_end_matches(['}', ']'])
        .split(',')
        .nth(pos)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_archive_common::{CellValue, DeclaredType};
    use pretty_assertions::assert_eq;

    fn row(object: &str, cells: &[(&str, CellValue)]) -> MaterializedRow {
        let mut row = MaterializedRow::new(object);
        row.fields.insert("i:objectId".to_string(), object.into());
        for (name, value) in cells {
            row.fields.insert(name.to_string(), value.clone());
        }
        row
    }

    fn table(rows: Vec<MaterializedRow>) -> AlertTable {
        AlertTable {
            columns: vec![("i:objectId".to_string(), DeclaredType::String)],
            derived_columns: Vec::new(),
            rows,
        }
    }

    fn objects(table: &AlertTable) -> Vec<&str> {
        table.rows.iter().filter_map(|r| r.str("i:objectId")).collect()
    }

    fn slope_vector(slope: f64) -> CellValue {
        let mut values = vec!["0.0".to_string(); 12];
        values[SLOPE_POSITION] = slope.to_string();
        CellValue::Str(format!("[{}]", values.join(",")))
    }

    #[test]
    fn test_parse_trend() {
        assert_eq!("rising".parse::<Trend>().unwrap(), Trend::Rising);
        assert!(matches!(
            "sideways".parse::<Trend>(),
            Err(ArchiveError::InvalidTrend(_))
        ));
    }

    #[test]
    fn test_validate_pairs() {
        let rules = TrendRules::default();
        assert_eq!(
            rules.validate("Early SN Ia candidate", "fading").unwrap(),
            Trend::Fading
        );
        assert_eq!(
            rules.validate("(CTA) Blazar", "new_low_state").unwrap(),
            Trend::NewLowState
        );
        assert_eq!(rules.validate("(CTA) Blazar", "rising").unwrap(), Trend::Rising);
        assert!(matches!(
            rules.validate("Early SN Ia candidate", "low_state"),
            Err(ArchiveError::InvalidTrend(_))
        ));
    }

    #[test]
    fn test_rising_and_fading() {
        let rules = TrendRules::default();
        let rows = vec![
            row("UP", &[("d:mag_rate", (-0.2).into())]),
            row("DOWN", &[("d:mag_rate", 0.3.into())]),
            row("FLAT", &[("d:mag_rate", 0.0.into())]),
            row("NONE", &[]),
        ];

        let mut rising = table(rows.clone());
        rules.apply(Trend::Rising, &mut rising);
        assert_eq!(objects(&rising), vec!["UP"]);

        let mut fading = table(rows);
        rules.apply(Trend::Fading, &mut fading);
        assert_eq!(objects(&fading), vec!["DOWN"]);
    }

    #[test]
    fn test_rising_needs_agreeing_slope_when_features_present() {
        let rules = TrendRules::default();
        let rows = vec![
            row(
                "AGREE",
                &[
                    ("i:fid", CellValue::Int(1)),
                    ("d:mag_rate", (-0.2).into()),
                    ("d:lc_features_g", slope_vector(-0.01)),
                ],
            ),
            row(
                "DISAGREE",
                &[
                    ("i:fid", CellValue::Int(1)),
                    ("d:mag_rate", (-0.2).into()),
                    ("d:lc_features_g", slope_vector(0.01)),
                ],
            ),
        ];
        let mut rising = table(rows);
        rules.apply(Trend::Rising, &mut rising);
        assert_eq!(objects(&rising), vec!["AGREE"]);
    }

    #[test]
    fn test_derived_rate_is_used_without_mag_rate() {
        let mut up = row("UP", &[]);
        up.derived.insert(V_RATE, CellValue::Float(-0.1));
        let mut rising = table(vec![up]);
        TrendRules::default().apply(Trend::Rising, &mut rising);
        assert_eq!(rising.len(), 1);
    }

    #[test]
    fn test_low_state_keeps_timeline_new_low_state_needs_m0() {
        let rules = TrendRules::default();
        let rows = vec![
            row("FILL", &[("d:blazar_stats_m0", (-1.0).into())]),
            row("LOW", &[("d:blazar_stats_m0", 0.4.into())]),
            row("NEW", &[("d:blazar_stats_m0", 1.2.into())]),
            row("UNSET", &[]),
        ];

        let mut low = table(rows.clone());
        rules.apply(Trend::LowState, &mut low);
        assert_eq!(objects(&low), vec!["FILL", "LOW", "NEW", "UNSET"]);

        let mut new_low = table(rows);
        rules.apply(Trend::NewLowState, &mut new_low);
        assert_eq!(objects(&new_low), vec!["NEW"]);
    }

    #[test]
    fn test_feature_vector_parsing() {
        assert_eq!(feature_at("{1.0, 2.0, NaN}", 1), Some(2.0));
        assert_eq!(feature_at("{1.0, 2.0, NaN}", 2), None);
        assert_eq!(feature_at("[]", 0), None);
    }
}
