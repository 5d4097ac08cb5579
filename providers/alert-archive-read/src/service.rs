//! Alert query service: the four query intents end to end
//!
//! Validation happens first, then planning and scanning, then
//! materialization and trend filtering. Nothing is returned on a partial
//! failure.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use alert_archive_common::time::{now_jd, parse_time, ARCHIVE_EPOCH_JD};
use alert_archive_common::{
    AlertStore, ArchiveConfig, ArchiveError, ColumnFilter, Result, SchemaRegistry, TableSchema,
    TableShape,
};

use crate::materializer::{
    AlertTable, ConeFilter, GroupKey, MaterializeOptions, Materializer, DEC, JD, JD_START_HIST,
    OBJECT_ID, RA,
};
use crate::planner::{QueryIntent, ScanPlanner};
use crate::requests::{ClassQuery, ConeQuery, ObjectQuery, TimelineQuery};
use crate::sky::{self, parse_coordinates};
use crate::trend::{Trend, TrendRules};

/// Columns every truncated alert query still needs for grouping and sorting
const GROUPING_COLUMNS: &[&str] = &[OBJECT_ID, JD];
/// Packed designation of a solar system source
const SSO_COLUMNS: &[&str] = &["r:mpcDesignation"];

pub struct AlertQueryService {
    config: ArchiveConfig,
    planner: ScanPlanner,
    materializer: Materializer,
    trends: TrendRules,
    cone_time_filter: bool,
}

impl AlertQueryService {
    /// Wire planner, registry and materializer over one store handle
    pub fn new(store: Arc<dyn AlertStore>, config: ArchiveConfig) -> Self {
        let trends = TrendRules::default();
        let planner = ScanPlanner::new(
            Arc::clone(&store),
            config.tables.clone(),
            config.scan_concurrency,
        )
        .with_identifier_limit(config.default_limit)
        .with_state_classes(trends.state_classes().map(str::to_string));
        let registry = Arc::new(SchemaRegistry::new(store));
        let materializer = Materializer::new(registry, config.color_tolerance_days);

        Self {
            config,
            planner,
            materializer,
            trends,
            cone_time_filter: false,
        }
    }

    /// Replace the default materializer (custom classifier or lookups)
    pub fn with_materializer(mut self, materializer: Materializer) -> Self {
        self.materializer = materializer;
        self
    }

    /// Also filter cone results on first/last detection dates
    pub fn with_cone_time_filter(mut self, enabled: bool) -> Self {
        self.cone_time_filter = enabled;
        self
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        self.materializer.registry()
    }

    /// Declared schema of a table
    pub async fn schema(&self, table: &str) -> Result<Arc<TableSchema>> {
        if self.config.tables.shape_of(table).is_none() {
            return Err(ArchiveError::InvalidRequest(format!("unknown table {}", table)));
        }
        self.registry().table_schema(table).await
    }

    #[instrument(skip(self, query, cancel), fields(ids = %query.object_id))]
    pub async fn by_identifier(
        &self,
        query: &ObjectQuery,
        cancel: &CancellationToken,
    ) -> Result<AlertTable> {
        let table = query
            .table
            .clone()
            .unwrap_or_else(|| self.config.tables.objects.clone());
        let columns = column_filter(query.columns.as_deref(), self.required_columns(&table));
        let options = MaterializeOptions {
            truncated: columns.is_truncated(),
            latest_only: !query.include_history,
            alert_derivations: self.config.tables.carries_alert_fields(&table),
            ..Default::default()
        };

        let intent = QueryIntent::ByIdentifier {
            table: table.clone(),
            ids: vec![query.object_id.clone()],
            columns,
        };
        let (plan, merged) = self.planner.run(&intent, cancel).await?;
        let output = self
            .materializer
            .materialize(&plan.table, merged, &options)
            .await?;
        info!("Object query on {} returned {} rows", table, output.len());
        Ok(output)
    }

    #[instrument(skip(self, query, cancel), fields(class = %query.class))]
    pub async fn by_class_and_time(
        &self,
        query: &ClassQuery,
        cancel: &CancellationToken,
    ) -> Result<AlertTable> {
        let trend = query
            .trend
            .as_deref()
            .map(|t| self.trends.validate(&query.class, t))
            .transpose()?;
        let (start_jd, stop_jd) = time_window(query.start.as_deref(), query.stop.as_deref())?;
        let limit = positive_limit(query.n, self.config.class_limit)?;

        let mut required = GROUPING_COLUMNS.to_vec();
        required.extend(trend_columns(trend));
        let columns = column_filter(query.columns.as_deref(), &required);
        let truncated = columns.is_truncated();

        let intent = QueryIntent::ByClass {
            class: query.class.clone(),
            start_jd,
            stop_jd,
            limit,
            columns,
        };
        let (plan, merged) = self.planner.run(&intent, cancel).await?;
        let options = MaterializeOptions {
            truncated,
            latest_only: plan.route.as_ref().map_or(false, |r| r.needs_latest_only()),
            extract_color: query.color,
            ..Default::default()
        };
        let mut output = self
            .materializer
            .materialize(&plan.table, merged, &options)
            .await?;

        if let Some(trend) = trend {
            self.trends.apply(trend, &mut output);
        }
        info!(
            "Class query '{}' returned {} rows from {}",
            query.class,
            output.len(),
            plan.table
        );
        Ok(output)
    }

    #[instrument(skip(self, query, cancel), fields(ra = %query.ra, dec = %query.dec, radius = query.radius))]
    pub async fn by_cone(&self, query: &ConeQuery, cancel: &CancellationToken) -> Result<AlertTable> {
        let center = parse_coordinates(&query.ra, &query.dec)?;
        sky::check_radius(query.radius, self.config.max_radius_arcsec)?;
        let window = cone_window(query)?;
        let limit = positive_limit(query.n, self.config.cone_limit)?;
        let pixels = sky::pixelize(
            center.ra_deg,
            center.dec_deg,
            query.radius,
            self.config.nside,
        )?;

        let mut required = GROUPING_COLUMNS.to_vec();
        required.extend([RA, DEC, JD_START_HIST]);
        let columns = column_filter(query.columns.as_deref(), &required);

        let mut cone = ConeFilter::new(center, query.radius);
        if let (true, Some((start, stop))) = (self.cone_time_filter, window) {
            cone = cone.with_time_window(start, stop);
        }
        let options = MaterializeOptions {
            truncated: columns.is_truncated(),
            latest_only: true,
            group_key: if query.group_by_pixel {
                GroupKey::ObjectAndPixel
            } else {
                GroupKey::Object
            },
            cone: Some(cone),
            ..Default::default()
        };

        let intent = QueryIntent::ByPixels {
            pixels,
            window,
            limit,
            columns,
        };
        let (plan, merged) = self.planner.run(&intent, cancel).await?;
        let output = self
            .materializer
            .materialize(&plan.table, merged, &options)
            .await?;
        info!(
            "Cone query over {} pixels returned {} rows",
            plan.requests.len(),
            output.len()
        );
        Ok(output)
    }

    #[instrument(skip(self, query, cancel))]
    pub async fn by_time_range(
        &self,
        query: &TimelineQuery,
        cancel: &CancellationToken,
    ) -> Result<AlertTable> {
        let table = self.timeline_table(query)?;
        let (start_jd, stop_jd) = time_window(query.start.as_deref(), query.stop.as_deref())?;
        let limit = query.n.map(check_limit).transpose()?;
        let columns = column_filter(query.columns.as_deref(), self.required_columns(&table));
        let options = MaterializeOptions {
            truncated: columns.is_truncated(),
            alert_derivations: self.config.tables.carries_alert_fields(&table),
            ..Default::default()
        };

        let intent = QueryIntent::ByTimeRange {
            table,
            start_jd,
            stop_jd,
            limit,
            columns,
        };
        let (plan, merged) = self.planner.run(&intent, cancel).await?;
        let output = self
            .materializer
            .materialize(&plan.table, merged, &options)
            .await?;
        info!(
            "Timeline query on {} returned {} rows",
            plan.table,
            output.len()
        );
        Ok(output)
    }

    /// Resolve the jd-indexed table a timeline query reads
    fn timeline_table(&self, query: &TimelineQuery) -> Result<String> {
        let tables = &self.config.tables;
        let table = match (&query.table, &query.tag) {
            (Some(_), Some(_)) => {
                return Err(ArchiveError::InvalidRequest(
                    "give either a table or a tag, not both".to_string(),
                ))
            }
            (Some(table), None) => table.clone(),
            (None, Some(tag)) => tables.tag_table(tag).ok_or_else(|| {
                ArchiveError::InvalidRequest(format!(
                    "{} is not a valid tag, expected one of: {}",
                    tag,
                    tables.tags.join(", ")
                ))
            })?,
            (None, None) => tables.timeline.clone(),
        };
        if tables.shape_of(&table) != Some(TableShape::TIMELINE) {
            return Err(ArchiveError::InvalidRequest(format!(
                "{} is not a jd-indexed table",
                table
            )));
        }
        Ok(table)
    }

    /// Columns a truncated query on `table` cannot do without
    fn required_columns(&self, table: &str) -> &'static [&'static str] {
        if self.config.tables.carries_alert_fields(table) {
            GROUPING_COLUMNS
        } else if table == self.config.tables.sso {
            SSO_COLUMNS
        } else {
            &[]
        }
    }
}

fn column_filter(columns: Option<&str>, required: &[&str]) -> ColumnFilter {
    ColumnFilter::from_list(columns).with_required(required)
}

/// Resolve optional start/stop times, defaulting to the archive epoch and now
fn time_window(start: Option<&str>, stop: Option<&str>) -> Result<(f64, f64)> {
    let start_jd = start.map(parse_time).transpose()?.unwrap_or(ARCHIVE_EPOCH_JD);
    let stop_jd = stop.map(parse_time).transpose()?.unwrap_or_else(now_jd);
    if start_jd > stop_jd {
        return Err(ArchiveError::InvalidRequest(format!(
            "start {} is after stop {}",
            start_jd, stop_jd
        )));
    }
    Ok((start_jd, stop_jd))
}

/// Cone bounds: none, start/stop, or start plus a window in days
fn cone_window(query: &ConeQuery) -> Result<Option<(f64, f64)>> {
    let Some(days) = query.window else {
        return match (query.start.as_deref(), query.stop.as_deref()) {
            (None, None) => Ok(None),
            (start, stop) => time_window(start, stop).map(Some),
        };
    };
    if query.stop.is_some() {
        return Err(ArchiveError::InvalidRequest(
            "window and stop are mutually exclusive".to_string(),
        ));
    }
    let Some(start) = query.start.as_deref() else {
        return Err(ArchiveError::InvalidRequest(
            "window needs a start date".to_string(),
        ));
    };
    if !(days.is_finite() && days > 0.0) {
        return Err(ArchiveError::InvalidRequest(format!(
            "window must be a positive number of days, got {}",
            days
        )));
    }
    let start_jd = parse_time(start)?;
    Ok(Some((start_jd, start_jd + days)))
}

fn positive_limit(requested: Option<usize>, default: usize) -> Result<usize> {
    check_limit(requested.unwrap_or(default))
}

fn check_limit(n: usize) -> Result<usize> {
    if n == 0 {
        return Err(ArchiveError::InvalidRequest(
            "row limit must be at least 1".to_string(),
        ));
    }
    Ok(n)
}

fn trend_columns(trend: Option<Trend>) -> Vec<&'static str> {
    match trend {
        Some(Trend::Rising) | Some(Trend::Fading) => vec!["d:mag_rate"],
        Some(Trend::NewLowState) => vec!["d:blazar_stats_m0"],
        Some(Trend::LowState) | None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_archive_common::MemoryStore;
    use pretty_assertions::assert_eq;

    fn service(store: Arc<MemoryStore>) -> AlertQueryService {
        AlertQueryService::new(store, ArchiveConfig::default())
    }

    fn class_query(class: &str, trend: Option<&str>) -> ClassQuery {
        ClassQuery {
            class: class.to_string(),
            start: Some("2459000.5".to_string()),
            stop: Some("2459100.5".to_string()),
            n: None,
            columns: None,
            trend: trend.map(str::to_string),
            color: false,
        }
    }

    #[tokio::test]
    async fn test_invalid_trend_issues_no_scan() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let err = service
            .by_class_and_time(
                &class_query("Early SN Ia candidate", Some("low_state")),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidTrend(_)));
        assert_eq!(store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_cone_validation_precedes_scans() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let cancel = CancellationToken::new();
        let cone = |ra: &str, radius: f64| ConeQuery {
            ra: ra.to_string(),
            dec: "2.897311".to_string(),
            radius,
            start: None,
            stop: None,
            window: None,
            n: None,
            columns: None,
            group_by_pixel: false,
        };

        let err = service.by_cone(&cone("400.0", 10.0), &cancel).await.unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidCoordinate(_)));
        let err = service
            .by_cone(&cone("193.821739", 18_001.0), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::RadiusTooLarge { .. }));
        assert_eq!(store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_inverted_window_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let query = TimelineQuery {
            table: None,
            tag: None,
            start: Some("2021-02-01".to_string()),
            stop: Some("2021-01-01".to_string()),
            n: None,
            columns: None,
        };
        let err = service(store.clone())
            .by_time_range(&query, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidRequest(_)));
        assert_eq!(store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_schema_table() {
        let service = service(Arc::new(MemoryStore::new()));
        assert!(matches!(
            service.schema("nope").await,
            Err(ArchiveError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_cone_window_needs_start_and_excludes_stop() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());
        let cone = |start: Option<&str>, stop: Option<&str>, window: f64| ConeQuery {
            ra: "193.821739".to_string(),
            dec: "2.897311".to_string(),
            radius: 10.0,
            start: start.map(str::to_string),
            stop: stop.map(str::to_string),
            window: Some(window),
            n: None,
            columns: None,
            group_by_pixel: false,
        };

        for query in [
            cone(None, None, 1.0),
            cone(Some("2021-06-25"), Some("2021-06-27"), 1.0),
            cone(Some("2021-06-25"), None, 0.0),
        ] {
            let err = service
                .by_cone(&query, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ArchiveError::InvalidRequest(_)));
        }
        assert_eq!(store.scan_count(), 0);

        let window = cone_window(&cone(Some("2459000.5"), None, 2.5)).unwrap();
        assert_eq!(window, Some((2459000.5, 2459003.0)));
    }

    #[tokio::test]
    async fn test_timeline_table_resolution() {
        let store = Arc::new(MemoryStore::new());
        let mut config = ArchiveConfig::default();
        config.tables.tags = vec!["in_tns".to_string()];
        let service = AlertQueryService::new(store.clone(), config);
        let query = |table: Option<&str>, tag: Option<&str>| TimelineQuery {
            table: table.map(str::to_string),
            tag: tag.map(str::to_string),
            start: None,
            stop: None,
            n: None,
            columns: None,
        };

        assert_eq!(service.timeline_table(&query(None, None)).unwrap(), "ztf.jd");
        assert_eq!(
            service.timeline_table(&query(None, Some("in_tns"))).unwrap(),
            "rubin.in_tns"
        );
        assert_eq!(
            service
                .timeline_table(&query(Some("ztf.low_state_blazars"), None))
                .unwrap(),
            "ztf.low_state_blazars"
        );
        for bad in [
            query(Some("ztf.jd"), Some("in_tns")),
            query(None, Some("unknown_tag")),
            query(Some("ztf.class"), None),
        ] {
            let err = service
                .by_time_range(&bad, &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, ArchiveError::InvalidRequest(_)));
        }
        assert_eq!(store.scan_count(), 0);
    }
}
