//! Classification fusion: one label per alert from cross-match, solar
//! system, microlensing and supernova classifier columns

use super::MaterializedRow;

/// Pluggable label function over a typed row
pub trait Classifier: Send + Sync {
    /// Columns the classifier reads; all must be present in the table
    fn required_columns(&self) -> &[&'static str];

    fn classify(&self, row: &MaterializedRow) -> String;
}

/// Cross-match labels meaning "nothing known at this position"
const UNKNOWN_XMATCH: &[&str] = &["Unknown", "Candidate_SN*", "SN", "Transient", "Fail", "Fail 504"];

const REQUIRED: &[&str] = &[
    "d:cdsxmatch",
    "d:roid",
    "d:mulens",
    "d:snn_snia_vs_nonia",
    "d:snn_sn_vs_all",
    "d:rf_snia_vs_nonia",
    "i:ndethist",
    "i:drb",
    "i:classtar",
    "i:jd",
    "i:jdstarthist",
    "d:rf_kn_vs_nonkn",
    "d:tracklet",
];

/// Inputs of the cascade read once per row
#[derive(Debug, Clone, Default)]
struct Inputs<'a> {
    cdsxmatch: &'a str,
    roid: Option<i64>,
    mulens: Option<f64>,
    snn_snia_vs_nonia: Option<f64>,
    snn_sn_vs_all: Option<f64>,
    rf_snia_vs_nonia: Option<f64>,
    rf_kn_vs_nonkn: Option<f64>,
    ndethist: Option<i64>,
    drb: Option<f64>,
    classtar: Option<f64>,
    lapse: Option<f64>,
    tracklet: &'a str,
}

impl<'a> Inputs<'a> {
    fn read(row: &'a MaterializedRow) -> Self {
        let lapse = match (row.f64("i:jd"), row.f64("i:jdstarthist")) {
            (Some(jd), Some(start)) => Some(jd - start),
            _ => None,
        };
        Self {
            cdsxmatch: row.str("d:cdsxmatch").unwrap_or("Unknown"),
            roid: row.i64("d:roid"),
            mulens: row.f64("d:mulens"),
            snn_snia_vs_nonia: row.f64("d:snn_snia_vs_nonia"),
            snn_sn_vs_all: row.f64("d:snn_sn_vs_all"),
            rf_snia_vs_nonia: row.f64("d:rf_snia_vs_nonia"),
            rf_kn_vs_nonkn: row.f64("d:rf_kn_vs_nonkn"),
            ndethist: row.i64("i:ndethist"),
            drb: row.f64("i:drb"),
            classtar: row.f64("i:classtar"),
            lapse,
            tracklet: row.str("d:tracklet").unwrap_or(""),
        }
    }

    fn unknown_xmatch(&self) -> bool {
        UNKNOWN_XMATCH.contains(&self.cdsxmatch)
    }

    fn good_quality(&self) -> bool {
        above(self.drb, 0.5) && above(self.classtar, 0.4)
    }

    fn young(&self) -> bool {
        self.ndethist.map_or(false, |n| n <= 20) && self.lapse.map_or(false, |l| l <= 20.0)
    }
}

fn above(value: Option<f64>, threshold: f64) -> bool {
    value.map_or(false, |v| v > threshold)
}

struct Rule {
    label: &'static str,
    matches: fn(&Inputs<'_>) -> bool,
}

/// Fixed-priority cascade, first match wins
const RULES: &[Rule] = &[
    Rule {
        label: "Tracklet",
        matches: |i: &Inputs<'_>| i.tracklet.starts_with("TRCK"),
    },
    Rule {
        label: "Solar System MPC",
        matches: |i: &Inputs<'_>| i.roid == Some(3),
    },
    Rule {
        label: "Solar System candidate",
        matches: |i: &Inputs<'_>| i.roid == Some(2),
    },
    Rule {
        label: "Early SN Ia candidate",
        matches: |i: &Inputs<'_>| {
            i.unknown_xmatch()
                && i.good_quality()
                && i.young()
                && above(i.rf_snia_vs_nonia, 0.5)
                && above(i.snn_snia_vs_nonia, 0.5)
        },
    },
    Rule {
        label: "SN candidate",
        matches: |i: &Inputs<'_>| {
            i.unknown_xmatch()
                && i.good_quality()
                && above(i.snn_snia_vs_nonia, 0.5)
                && above(i.snn_sn_vs_all, 0.5)
        },
    },
    Rule {
        label: "Kilonova candidate",
        matches: |i: &Inputs<'_>| {
            i.unknown_xmatch() && i.good_quality() && i.young() && above(i.rf_kn_vs_nonkn, 0.5)
        },
    },
    Rule {
        label: "Microlensing candidate",
        matches: |i: &Inputs<'_>| i.unknown_xmatch() && above(i.mulens, 0.0),
    },
];

/// Default cascade; rows no rule claims fall back to their cross-match label
#[derive(Debug, Clone, Copy, Default)]
pub struct CascadeClassifier;

impl Classifier for CascadeClassifier {
    fn required_columns(&self) -> &[&'static str] {
        REQUIRED
    }

    fn classify(&self, row: &MaterializedRow) -> String {
        let inputs = Inputs::read(row);
        if let Some(rule) = RULES.iter().find(|rule| (rule.matches)(&inputs)) {
            return rule.label.to_string();
        }
        if inputs.cdsxmatch.is_empty() || inputs.cdsxmatch.starts_with("Fail") {
            "Unknown".to_string()
        } else {
            inputs.cdsxmatch.to_string()
        }
    }
}
