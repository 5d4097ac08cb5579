//! Materializer: merged raw scans to typed, derived, grouped alert tables

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use alert_archive_common::time::jd_to_iso;
use alert_archive_common::{
    ArchiveError, CellValue, DeclaredType, Result, SchemaRegistry, TableSchema, INTERNAL_FAMILY,
};

use crate::planner::MergedScan;
use crate::sky::SkyCoord;

pub mod classification;
pub mod constellation;
pub mod photometry;
pub mod table;

pub use classification::{CascadeClassifier, Classifier};
pub use constellation::{ConstellationLookup, NearestCentroid};
pub use table::{AlertTable, MaterializedRow};

pub const V_CLASSIFICATION: &str = "v:classification";
pub const V_RATE: &str = "v:rate";
pub const V_SIGMA_RATE: &str = "v:sigma(rate)";
pub const V_COLOR: &str = "v:g-r";
pub const V_SIGMA_COLOR: &str = "v:sigma(g-r)";
pub const V_COLOR_RATE: &str = "v:rate(g-r)";
pub const V_SIGMA_COLOR_RATE: &str = "v:sigma(rate(g-r))";
pub const V_LASTDATE: &str = "v:lastdate";
pub const V_FIRSTDATE: &str = "v:firstdate";
pub const V_LAPSE: &str = "v:lapse";
pub const V_CONSTELLATION: &str = "v:constellation";
pub const V_SEPARATION: &str = "v:separation_degree";

pub const OBJECT_ID: &str = "i:objectId";
pub const JD: &str = "i:jd";
pub const JD_START_HIST: &str = "i:jdstarthist";
pub const RA: &str = "i:ra";
pub const DEC: &str = "i:dec";

/// Partition key used by latest-only grouping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupKey {
    #[default]
    Object,
    /// Object plus the pixel encoded as the row key's leading segment
    ObjectAndPixel,
}

/// Exact cone refinement applied after the coarse pixel scan
#[derive(Debug, Clone, PartialEq)]
pub struct ConeFilter {
    pub center: SkyCoord,
    pub radius_deg: f64,
    /// Keep rows first detected at or after `start` and last seen before `stop`
    pub time_window: Option<(f64, f64)>,
}

impl ConeFilter {
    pub fn new(center: SkyCoord, radius_arcsec: f64) -> Self {
        Self {
            center,
            radius_deg: radius_arcsec / 3600.0,
            time_window: None,
        }
    }

    pub fn with_time_window(mut self, start_jd: f64, stop_jd: f64) -> Self {
        self.time_window = Some((start_jd, stop_jd));
        self
    }
}

/// Per-query materialization switches
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializeOptions {
    /// Caller restricted columns: dynamic schema, no backfill, no derivation
    pub truncated: bool,
    pub latest_only: bool,
    pub group_key: GroupKey,
    pub extract_color: bool,
    pub with_constellation: bool,
    /// Rows are ZTF alerts: classify and derive photometry and sky fields.
    /// Other tables only get detection dates, and only when both jd columns
    /// are declared.
    pub alert_derivations: bool,
    pub cone: Option<ConeFilter>,
}

impl Default for MaterializeOptions {
    fn default() -> Self {
        Self {
            truncated: false,
            latest_only: false,
            group_key: GroupKey::Object,
            extract_color: true,
            with_constellation: true,
            alert_derivations: true,
            cone: None,
        }
    }
}

/// Turns merged scans into typed tables against the registry's schemas
pub struct Materializer {
    registry: Arc<SchemaRegistry>,
    classifier: Arc<dyn Classifier>,
    constellations: Arc<dyn ConstellationLookup>,
    color_tolerance: f64,
}

impl Materializer {
    pub fn new(registry: Arc<SchemaRegistry>, color_tolerance: f64) -> Self {
        Self {
            registry,
            classifier: Arc::new(CascadeClassifier),
            constellations: Arc::new(NearestCentroid),
            color_tolerance,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_constellations(mut self, lookup: Arc<dyn ConstellationLookup>) -> Self {
        self.constellations = lookup;
        self
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Materialize `scan` against the declared schema of `table`.
    ///
    /// Stages run in order and the first error aborts: strip, schema check,
    /// backfill, coerce, derive, cone refinement, grouping, sort.
    #[instrument(skip(self, scan, options), fields(rows = scan.len(), truncated = options.truncated))]
    pub async fn materialize(
        &self,
        table: &str,
        scan: MergedScan,
        options: &MaterializeOptions,
    ) -> Result<AlertTable> {
        let schema = self.registry.table_schema(table).await?;
        let start = Instant::now();
        let mut output = self.build(&schema, scan, options)?;

        if !options.truncated && !output.rows.is_empty() {
            self.derive(&mut output, options)?;
        }
        if let Some(cone) = &options.cone {
            refine_cone(&mut output, cone)?;
        }
        if options.latest_only {
            group_latest(&mut output, options.group_key);
        }
        sort_rows(&mut output, options.cone.is_some());

        info!(
            "Materialized {} rows ({} columns) from {} in {}ms",
            output.len(),
            output.columns.len() + output.derived_columns.len(),
            table,
            start.elapsed().as_millis()
        );
        Ok(output)
    }

    /// Strip, check, backfill and coerce
    fn build(
        &self,
        schema: &TableSchema,
        scan: MergedScan,
        options: &MaterializeOptions,
    ) -> Result<AlertTable> {
        let internal_prefix = format!("{}:", INTERNAL_FAMILY);
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut raw_rows = Vec::with_capacity(scan.records.len());

        for mut record in scan.records {
            record.cells.retain(|column, _| !column.starts_with(&internal_prefix));
            for column in record.cells.keys() {
                if schema.column(column).is_none() {
                    return Err(ArchiveError::SchemaMismatch(format!(
                        "column {} of row {} is not declared for table {}",
                        column, record.key, schema.table
                    )));
                }
                if !seen.contains(column) {
                    seen.insert(column.clone());
                }
            }
            raw_rows.push(record);
        }

        // fixed mode keeps every declared column, dynamic mode only returned ones
        let declared: Vec<_> = schema
            .columns()
            .iter()
            .filter(|c| !options.truncated || seen.contains(&c.name))
            .collect();

        let mut rows = Vec::with_capacity(raw_rows.len());
        for record in raw_rows {
            let mut row = MaterializedRow::new(record.key);
            for column in &declared {
                let value = match record.cells.get(&column.name) {
                    Some(raw) => column.coerce(raw)?,
                    None if options.truncated => CellValue::Null,
                    None => column.fill_value()?,
                };
                row.fields.insert(column.name.clone(), value);
            }
            rows.push(row);
        }

        debug!(
            "Coerced {} rows over {} columns of {}",
            rows.len(),
            declared.len(),
            schema.table
        );
        Ok(AlertTable {
            columns: declared
                .iter()
                .map(|c| (c.name.clone(), c.declared_type))
                .collect(),
            derived_columns: Vec::new(),
            rows,
        })
    }

    fn derive(&self, output: &mut AlertTable, options: &MaterializeOptions) -> Result<()> {
        if options.alert_derivations {
            self.derive_alert_fields(output, options)?;
        }
        if options.alert_derivations || (output.has_column(JD) && output.has_column(JD_START_HIST)) {
            derive_dates(output)?;
        }
        if options.alert_derivations && options.with_constellation {
            require(output, &[RA, DEC], "constellation")?;
            for row in output.rows.iter_mut() {
                let name = position(row)
                    .map(|coord| self.constellations.constellation(&coord))
                    .map_or(CellValue::Null, CellValue::from);
                row.derived.insert(V_CONSTELLATION, name);
            }
            output
                .derived_columns
                .push((V_CONSTELLATION, DeclaredType::String));
        }
        Ok(())
    }

    fn derive_alert_fields(&self, output: &mut AlertTable, options: &MaterializeOptions) -> Result<()> {
        require(output, self.classifier.required_columns(), "classification")?;
        for row in output.rows.iter_mut() {
            let label = self.classifier.classify(row);
            row.derived.insert(V_CLASSIFICATION, CellValue::Str(label));
        }
        output
            .derived_columns
            .push((V_CLASSIFICATION, DeclaredType::String));

        if options.extract_color {
            require(output, photometry::PHOTOMETRY_COLUMNS, "rate and colour")?;
            photometry::extract_rate_and_color(&mut output.rows, self.color_tolerance);
            for column in [
                V_RATE,
                V_SIGMA_RATE,
                V_COLOR,
                V_SIGMA_COLOR,
                V_COLOR_RATE,
                V_SIGMA_COLOR_RATE,
            ] {
                output.derived_columns.push((column, DeclaredType::Float64));
            }
        }
        Ok(())
    }
}

fn derive_dates(output: &mut AlertTable) -> Result<()> {
    require(output, &[JD, JD_START_HIST], "detection dates")?;
    for row in output.rows.iter_mut() {
        let jd = row.f64(JD);
        let first = row.f64(JD_START_HIST);
        let text = |jd: Option<f64>| {
            jd.and_then(jd_to_iso)
                .map_or(CellValue::Null, CellValue::Str)
        };
        row.derived.insert(V_LASTDATE, text(jd));
        row.derived.insert(V_FIRSTDATE, text(first));
        let lapse = match (jd, first) {
            (Some(jd), Some(first)) => CellValue::Float(jd - first),
            _ => CellValue::Null,
        };
        row.derived.insert(V_LAPSE, lapse);
    }
    output.derived_columns.extend([
        (V_LASTDATE, DeclaredType::String),
        (V_FIRSTDATE, DeclaredType::String),
        (V_LAPSE, DeclaredType::Float64),
    ]);
    Ok(())
}

fn require(output: &AlertTable, columns: &[&str], stage: &str) -> Result<()> {
    match columns.iter().find(|c| !output.has_column(c)) {
        Some(missing) => Err(ArchiveError::MissingDerivationInput(format!(
            "{} needs column {}",
            stage, missing
        ))),
        None => Ok(()),
    }
}

fn position(row: &MaterializedRow) -> Option<SkyCoord> {
    SkyCoord::new(row.f64(RA)?, row.f64(DEC)?).ok()
}

/// Attach exact separations and drop rows outside the radius
fn refine_cone(output: &mut AlertTable, cone: &ConeFilter) -> Result<()> {
    if output.rows.is_empty() {
        // a truncated scan of an empty region declares no columns at all
        output
            .derived_columns
            .push((V_SEPARATION, DeclaredType::Float64));
        return Ok(());
    }
    if !output.has_column(RA) || !output.has_column(DEC) {
        return Err(ArchiveError::MissingDerivationInput(
            "cone refinement needs i:ra and i:dec".to_string(),
        ));
    }

    let before = output.len();
    for row in output.rows.iter_mut() {
        let separation = position(row)
            .map(|coord| coord.separation_deg(&cone.center))
            .map_or(CellValue::Null, CellValue::Float);
        row.derived.insert(V_SEPARATION, separation);
    }
    output.retain(|row| {
        row.f64(V_SEPARATION)
            .map_or(false, |sep| sep <= cone.radius_deg)
    });

    if let Some((start, stop)) = cone.time_window {
        output.retain(|row| {
            let first_ok = row.f64(JD_START_HIST).map_or(true, |first| first >= start);
            let last_ok = row.f64(JD).map_or(true, |jd| jd < stop);
            first_ok && last_ok
        });
    }

    output
        .derived_columns
        .push((V_SEPARATION, DeclaredType::Float64));
    debug!("Cone refinement kept {} of {} rows", output.len(), before);
    Ok(())
}

/// Keep the maximum-jd row per entity, first occurrence on ties
fn group_latest(output: &mut AlertTable, group_key: GroupKey) {
    if !output.has_column(OBJECT_ID) || !output.has_column(JD) {
        debug!("Skipping latest-only grouping: object id or jd not selected");
        return;
    }

    let mut best: HashMap<String, (usize, f64)> = HashMap::new();
    for (i, row) in output.rows.iter().enumerate() {
        let Some(object) = row.str(OBJECT_ID) else {
            continue;
        };
        let entity = match group_key {
            GroupKey::Object => object.to_string(),
            GroupKey::ObjectAndPixel => {
                let pixel = row.key.split('_').next().unwrap_or_default();
                format!("{}/{}", object, pixel)
            }
        };
        let jd = row.f64(JD).unwrap_or(f64::NEG_INFINITY);
        match best.get(&entity) {
            Some(&(_, top)) if top >= jd => {}
            _ => {
                best.insert(entity, (i, jd));
            }
        }
    }

    let keep: BTreeSet<usize> = best.values().map(|&(i, _)| i).collect();
    let mut index = 0;
    output.rows.retain(|_| {
        let kept = keep.contains(&index);
        index += 1;
        kept
    });
}

/// Cone results by separation ascending, everything else by jd descending.
/// Both sorts are stable so ties keep arrival order.
fn sort_rows(output: &mut AlertTable, by_separation: bool) {
    if by_separation {
        output.rows.sort_by(|a, b| {
            compare_missing_last(a.f64(V_SEPARATION), b.f64(V_SEPARATION))
        });
    } else if output.has_column(JD) {
        output
            .rows
            .sort_by(|a, b| compare_missing_last(b.f64(JD), a.f64(JD)));
    }
}

fn compare_missing_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_archive_common::{ColumnSchema, MemoryStore, RawRecord, OBJECTS_TABLE};
    use pretty_assertions::assert_eq;

    fn ztf_schema() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::new("i:objectId", DeclaredType::String),
            ColumnSchema::new("i:jd", DeclaredType::Float64),
            ColumnSchema::new("i:jdstarthist", DeclaredType::Float64),
            ColumnSchema::new("i:fid", DeclaredType::NullableInt64),
            ColumnSchema::new("i:magpsf", DeclaredType::Float64),
            ColumnSchema::new("i:sigmapsf", DeclaredType::Float64),
            ColumnSchema::new("i:ra", DeclaredType::Float64),
            ColumnSchema::new("i:dec", DeclaredType::Float64),
            ColumnSchema::new("i:ndethist", DeclaredType::NullableInt64),
            ColumnSchema::new("i:drb", DeclaredType::Float64),
            ColumnSchema::new("i:classtar", DeclaredType::Float64),
            ColumnSchema::new("d:cdsxmatch", DeclaredType::String),
            ColumnSchema::new("d:roid", DeclaredType::NullableInt64),
            ColumnSchema::new("d:mulens", DeclaredType::Float64),
            ColumnSchema::new("d:snn_snia_vs_nonia", DeclaredType::Float64),
            ColumnSchema::new("d:snn_sn_vs_all", DeclaredType::Float64),
            ColumnSchema::new("d:rf_snia_vs_nonia", DeclaredType::Float64),
            ColumnSchema::new("d:rf_kn_vs_nonkn", DeclaredType::Float64),
            ColumnSchema::new("d:tracklet", DeclaredType::String),
            ColumnSchema::new("d:nalerthist_valid", DeclaredType::Boolean),
            ColumnSchema::new("d:blazar_stats_m0", DeclaredType::Float64),
        ]
    }

    fn alert(object: &str, jd: f64, fid: u8, mag: f64) -> RawRecord {
        RawRecord::new(format!("{}_{}", object, jd))
            .with_cell("key:key", format!("{}_{}", object, jd))
            .with_cell("i:objectId", object)
            .with_cell("i:jd", jd.to_string())
            .with_cell("i:jdstarthist", "2459000.5")
            .with_cell("i:fid", fid.to_string())
            .with_cell("i:magpsf", mag.to_string())
            .with_cell("i:sigmapsf", "0.1")
            .with_cell("i:ra", "193.821739")
            .with_cell("i:dec", "2.897311")
    }

    async fn materializer() -> (Arc<MemoryStore>, Materializer) {
        let store = Arc::new(MemoryStore::new());
        store.set_schema(OBJECTS_TABLE, ztf_schema());
        let registry = Arc::new(SchemaRegistry::new(store.clone()));
        (store, Materializer::new(registry, 0.3))
    }

    fn merged(records: Vec<RawRecord>) -> MergedScan {
        MergedScan::from_partials(OBJECTS_TABLE, vec![records])
    }

    #[tokio::test]
    async fn test_fixed_mode_columns_equal_schema() {
        let (_, materializer) = materializer().await;
        let output = materializer
            .materialize(
                OBJECTS_TABLE,
                merged(vec![alert("ZTF1", 2459001.5, 1, 18.0)]),
                &MaterializeOptions::default(),
            )
            .await
            .unwrap();

        let expected: Vec<String> = ztf_schema().into_iter().map(|c| c.name).collect();
        assert_eq!(output.column_names(), expected);
        let row = &output.rows[0];
        assert!(!row.fields.contains_key("key:key"));
        assert_eq!(row.fields["d:tracklet"], CellValue::Str(String::new()));
        assert_eq!(row.fields["d:blazar_stats_m0"], CellValue::Float(-1.0));
        assert_eq!(row.fields["d:roid"], CellValue::Null);
        assert_eq!(row.str(V_CLASSIFICATION), Some("Unknown"));
        assert_eq!(row.str(V_CONSTELLATION), Some("Virgo"));
        assert_eq!(row.f64(V_LAPSE), Some(1.0));
    }

    #[tokio::test]
    async fn test_truncated_mode_keeps_returned_columns_only() {
        let (_, materializer) = materializer().await;
        let record = RawRecord::new("ZTF1_2459001.5")
            .with_cell("i:objectId", "ZTF1")
            .with_cell("i:jd", "2459001.5");
        let options = MaterializeOptions {
            truncated: true,
            ..Default::default()
        };
        let output = materializer
            .materialize(OBJECTS_TABLE, merged(vec![record]), &options)
            .await
            .unwrap();
        assert_eq!(output.column_names(), vec!["i:objectId", "i:jd"]);
        assert!(output.derived_columns.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_column_is_schema_mismatch() {
        let (_, materializer) = materializer().await;
        let record = alert("ZTF1", 2459001.5, 1, 18.0).with_cell("d:mystery", "1");
        let err = materializer
            .materialize(OBJECTS_TABLE, merged(vec![record]), &MaterializeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn test_missing_classifier_input_fails() {
        let store = Arc::new(MemoryStore::new());
        let columns: Vec<ColumnSchema> = ztf_schema()
            .into_iter()
            .filter(|c| c.name != "d:mulens")
            .collect();
        store.set_schema(OBJECTS_TABLE, columns);
        let materializer = Materializer::new(Arc::new(SchemaRegistry::new(store)), 0.3);

        let err = materializer
            .materialize(
                OBJECTS_TABLE,
                merged(vec![alert("ZTF1", 2459001.5, 1, 18.0)]),
                &MaterializeOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingDerivationInput(_)));
    }

    #[tokio::test]
    async fn test_strict_boolean_coercion() {
        let (_, materializer) = materializer().await;
        let records = vec![
            alert("ZTF1", 2459001.5, 1, 18.0).with_cell("d:nalerthist_valid", "true"),
            alert("ZTF2", 2459002.5, 1, 18.0).with_cell("d:nalerthist_valid", "True"),
        ];
        let output = materializer
            .materialize(OBJECTS_TABLE, merged(records), &MaterializeOptions::default())
            .await
            .unwrap();
        let flag = |object: &str| {
            output
                .rows
                .iter()
                .find(|r| r.str(OBJECT_ID) == Some(object))
                .map(|r| r.fields["d:nalerthist_valid"].clone())
        };
        assert_eq!(flag("ZTF1"), Some(CellValue::Bool(true)));
        assert_eq!(flag("ZTF2"), Some(CellValue::Str("True".to_string())));
    }

    #[tokio::test]
    async fn test_latest_only_keeps_max_jd_per_object() {
        let (_, materializer) = materializer().await;
        let records = vec![
            alert("ZTF1", 2459001.5, 1, 18.0),
            alert("ZTF1", 2459004.5, 1, 17.5),
            alert("ZTF1", 2459002.5, 2, 18.2),
            alert("ZTF2", 2459003.5, 1, 19.0),
        ];
        let options = MaterializeOptions {
            latest_only: true,
            ..Default::default()
        };
        let output = materializer
            .materialize(OBJECTS_TABLE, merged(records), &options)
            .await
            .unwrap();

        let summary: Vec<(Option<&str>, Option<f64>)> = output
            .rows
            .iter()
            .map(|r| (r.str(OBJECT_ID), r.f64(JD)))
            .collect();
        assert_eq!(
            summary,
            vec![(Some("ZTF1"), Some(2459004.5)), (Some("ZTF2"), Some(2459003.5))]
        );
        // rate comes from the full history before grouping
        assert_eq!(output.rows[0].f64(V_RATE), Some(-0.5 / 3.0));
    }

    #[tokio::test]
    async fn test_default_sort_is_jd_descending() {
        let (_, materializer) = materializer().await;
        let records = vec![
            alert("ZTF1", 2459001.5, 1, 18.0),
            alert("ZTF2", 2459003.5, 1, 18.0),
            alert("ZTF3", 2459002.5, 1, 18.0),
        ];
        let output = materializer
            .materialize(OBJECTS_TABLE, merged(records), &MaterializeOptions::default())
            .await
            .unwrap();
        let jds: Vec<f64> = output.rows.iter().filter_map(|r| r.f64(JD)).collect();
        assert_eq!(jds, vec![2459003.5, 2459002.5, 2459001.5]);
    }

    #[tokio::test]
    async fn test_cone_refinement_and_order() {
        let (_, materializer) = materializer().await;
        let at = |object: &str, dec_offset_arcsec: f64| {
            alert(object, 2459001.5, 1, 18.0)
                .with_cell("i:dec", (2.897311 + dec_offset_arcsec / 3600.0).to_string())
        };
        let records = vec![at("FAR", 15.0), at("MID", 8.0), at("NEAR", 2.0)];
        let center = SkyCoord::new(193.821739, 2.897311).unwrap();
        let options = MaterializeOptions {
            cone: Some(ConeFilter::new(center, 10.0)),
            ..Default::default()
        };
        let output = materializer
            .materialize(OBJECTS_TABLE, merged(records), &options)
            .await
            .unwrap();

        let objects: Vec<&str> = output.rows.iter().filter_map(|r| r.str(OBJECT_ID)).collect();
        assert_eq!(objects, vec!["NEAR", "MID"]);
        assert!(output
            .rows
            .iter()
            .all(|r| r.f64(V_SEPARATION).unwrap() * 3600.0 <= 10.0));
    }

    #[tokio::test]
    async fn test_truncated_cone_over_empty_region() {
        let (_, materializer) = materializer().await;
        let center = SkyCoord::new(193.821739, 2.897311).unwrap();
        let options = MaterializeOptions {
            truncated: true,
            latest_only: true,
            cone: Some(ConeFilter::new(center, 10.0)),
            ..Default::default()
        };
        let output = materializer
            .materialize(OBJECTS_TABLE, merged(Vec::new()), &options)
            .await
            .unwrap();
        assert!(output.is_empty());
        assert!(output.columns.is_empty());
        assert_eq!(
            output.derived_columns,
            vec![(V_SEPARATION, DeclaredType::Float64)]
        );
    }

    #[tokio::test]
    async fn test_non_alert_rows_skip_alert_derivations() {
        let store = Arc::new(MemoryStore::new());
        store.set_schema(
            "rubin.diaObject",
            vec![
                ColumnSchema::new("r:diaObjectId", DeclaredType::String),
                ColumnSchema::new("r:midpointMjdTai", DeclaredType::Float64),
            ],
        );
        let materializer = Materializer::new(Arc::new(SchemaRegistry::new(store)), 0.3);
        let record = RawRecord::new("789_170000000000000789")
            .with_cell("r:diaObjectId", "170000000000000789")
            .with_cell("r:midpointMjdTai", "60400.1");
        let options = MaterializeOptions {
            alert_derivations: false,
            ..Default::default()
        };
        let output = materializer
            .materialize(
                "rubin.diaObject",
                MergedScan::from_partials("rubin.diaObject", vec![vec![record]]),
                &options,
            )
            .await
            .unwrap();

        assert_eq!(output.len(), 1);
        assert!(output.derived_columns.is_empty());
        assert_eq!(output.rows[0].str("r:diaObjectId"), Some("170000000000000789"));

        // the same rows still fail when alert fields are expected
        let err = materializer
            .materialize(
                "rubin.diaObject",
                MergedScan::from_partials(
                    "rubin.diaObject",
                    vec![vec![RawRecord::new("789_170000000000000789")
                        .with_cell("r:diaObjectId", "170000000000000789")]],
                ),
                &MaterializeOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingDerivationInput(_)));
    }
}
