//! Scan planner
//!
//! Turns a [`QueryIntent`] into key-prefix / key-range scans over the index
//! tables, dispatches them on a bounded pool and unions the partial results
//! into one collection keyed by row key.

use futures::{stream, FutureExt, StreamExt, TryStreamExt};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use alert_archive_common::{
    format_jd, key_prefix, time_range, AlertStore, ArchiveError, ColumnFilter, RawRecord, Result,
    ScanRequest, TableCatalog, TableShape,
};

/// Class label prefix routed to the TNS-indexed table
pub const TNS_CLASS_PREFIX: &str = "(TNS) ";
/// Class label prefix stripped before hitting the class table
pub const SIMBAD_CLASS_PREFIX: &str = "(SIMBAD) ";

/// What a query asks for, dispatched once by the planner
#[derive(Debug, Clone, PartialEq)]
pub enum QueryIntent {
    /// Exact or prefix match per identifier
    ByIdentifier {
        table: String,
        ids: Vec<String>,
        columns: ColumnFilter,
    },
    /// Most recent `limit` rows of a class in `[start_jd, stop_jd)`
    ByClass {
        class: String,
        start_jd: f64,
        stop_jd: f64,
        limit: usize,
        columns: ColumnFilter,
    },
    /// One scan per pixel, time-bounded when a window is given
    ByPixels {
        pixels: BTreeSet<u64>,
        window: Option<(f64, f64)>,
        limit: usize,
        columns: ColumnFilter,
    },
    /// A single reversed range over a jd-indexed table
    ByTimeRange {
        table: String,
        start_jd: f64,
        stop_jd: f64,
        limit: Option<usize>,
        columns: ColumnFilter,
    },
}

/// Where a class search is served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassRoute {
    /// `{class}_{jd}` keys in the class table
    Classes(String),
    /// `{type}_{jd}` keys in the TNS-indexed table
    Tns(String),
    /// `{jd}_{objectId}` keys in the low-state timeline
    StateTimeline,
}

impl ClassRoute {
    /// Routes that index one row per alert and need latest-only grouping
    pub fn needs_latest_only(&self) -> bool {
        !matches!(self, ClassRoute::Classes(_))
    }
}

/// Ordered scan requests against one table
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    pub table: String,
    pub requests: Vec<ScanRequest>,
    pub route: Option<ClassRoute>,
}

/// Union of every scan of a plan: unique row keys, first-arrival order,
/// last write wins on a key collision
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedScan {
    pub table: String,
    pub records: Vec<RawRecord>,
}

impl MergedScan {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            records: Vec::new(),
        }
    }

    /// Union per-request partial results in request order
    pub fn from_partials(table: impl Into<String>, partials: Vec<Vec<RawRecord>>) -> Self {
        let mut merged = Self::new(table);
        let mut positions: HashMap<String, usize> = HashMap::new();
        for record in partials.into_iter().flatten() {
            match positions.get(&record.key) {
                Some(&i) => merged.records[i] = record,
                None => {
                    positions.insert(record.key.clone(), merged.records.len());
                    merged.records.push(record);
                }
            }
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Plans and runs scans for one query at a time over a shared store handle
pub struct ScanPlanner {
    store: Arc<dyn AlertStore>,
    tables: TableCatalog,
    identifier_limit: usize,
    max_concurrency: usize,
    state_classes: HashSet<String>,
}

impl ScanPlanner {
    pub fn new(store: Arc<dyn AlertStore>, tables: TableCatalog, max_concurrency: usize) -> Self {
        Self {
            store,
            tables,
            identifier_limit: alert_archive_common::config::DEFAULT_LIMIT,
            max_concurrency: max_concurrency.max(1),
            state_classes: HashSet::new(),
        }
    }

    /// Row limit applied to each identifier scan
    pub fn with_identifier_limit(mut self, limit: usize) -> Self {
        self.identifier_limit = limit.max(1);
        self
    }

    /// Classes served from the low-state timeline
    pub fn with_state_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    pub fn tables(&self) -> &TableCatalog {
        &self.tables
    }

    /// Resolve which table and primary key serve a class label
    pub fn route_class(&self, class: &str) -> ClassRoute {
        if self.state_classes.contains(class) {
            ClassRoute::StateTimeline
        } else if let Some(tns_type) = class.strip_prefix(TNS_CLASS_PREFIX) {
            ClassRoute::Tns(tns_type.to_string())
        } else if let Some(simbad) = class.strip_prefix(SIMBAD_CLASS_PREFIX) {
            ClassRoute::Classes(simbad.to_string())
        } else {
            ClassRoute::Classes(class.to_string())
        }
    }

    /// Translate an intent into scan requests without touching the store
    pub fn plan(&self, intent: &QueryIntent) -> Result<ScanPlan> {
        match intent {
            QueryIntent::ByIdentifier {
                table,
                ids,
                columns,
            } => {
                let shape = self.tables.shape_of(table).ok_or_else(|| {
                    ArchiveError::InvalidRequest(format!("unknown table {}", table))
                })?;
                let ids: Vec<&str> = ids
                    .iter()
                    .flat_map(|id| id.split(','))
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .collect();
                if ids.is_empty() {
                    return Err(ArchiveError::InvalidRequest(
                        "at least one identifier is required".to_string(),
                    ));
                }

                let requests = ids
                    .into_iter()
                    .map(|id| {
                        Ok(ScanRequest::prefix(table.as_str(), key_prefix(&shape, id)?)
                            .with_columns(columns.clone())
                            .with_limit(self.identifier_limit))
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(ScanPlan {
                    table: table.clone(),
                    requests,
                    route: None,
                })
            }

            QueryIntent::ByClass {
                class,
                start_jd,
                stop_jd,
                limit,
                columns,
            } => {
                check_window(*start_jd, *stop_jd)?;
                let route = self.route_class(class);
                let (table, start, stop) = match &route {
                    ClassRoute::Classes(primary) => {
                        let (start, stop) = time_range(primary, *start_jd, *stop_jd)?;
                        (self.tables.classes.clone(), start, stop)
                    }
                    ClassRoute::Tns(primary) => {
                        let (start, stop) = time_range(primary, *start_jd, *stop_jd)?;
                        (self.tables.tns.clone(), start, stop)
                    }
                    ClassRoute::StateTimeline => (
                        self.tables.low_state.clone(),
                        format_jd(*start_jd),
                        format_jd(*stop_jd),
                    ),
                };

                let request = ScanRequest::range(table.as_str(), start, stop)
                    .with_columns(columns.clone())
                    .with_limit(*limit)
                    .reversed();
                Ok(ScanPlan {
                    table,
                    requests: vec![request],
                    route: Some(route),
                })
            }

            QueryIntent::ByPixels {
                pixels,
                window,
                limit,
                columns,
            } => {
                if let Some((start, stop)) = window {
                    check_window(*start, *stop)?;
                }
                let table = self.tables.pixels.clone();
                let requests = pixels
                    .iter()
                    .map(|pixel| {
                        let pixel = pixel.to_string();
                        let request = match window {
                            Some((start, stop)) => {
                                let (start, stop) = time_range(&pixel, *start, *stop)?;
                                ScanRequest::range(table.as_str(), start, stop)
                            }
                            None => ScanRequest::prefix(
                                table.as_str(),
                                key_prefix(&TableShape::TIME_SUFFIXED, &pixel)?,
                            ),
                        };
                        Ok(request.with_columns(columns.clone()).with_limit(*limit))
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(ScanPlan {
                    table,
                    requests,
                    route: None,
                })
            }

            QueryIntent::ByTimeRange {
                table,
                start_jd,
                stop_jd,
                limit,
                columns,
            } => {
                check_window(*start_jd, *stop_jd)?;
                if self.tables.shape_of(table) != Some(TableShape::TIMELINE) {
                    return Err(ArchiveError::InvalidRequest(format!(
                        "{} is not a jd-indexed table",
                        table
                    )));
                }
                let mut request =
                    ScanRequest::range(table.as_str(), format_jd(*start_jd), format_jd(*stop_jd))
                        .with_columns(columns.clone())
                        .reversed();
                if let Some(limit) = limit {
                    request = request.with_limit(*limit);
                }
                Ok(ScanPlan {
                    table: table.clone(),
                    requests: vec![request],
                    route: None,
                })
            }
        }
    }

    /// Run every request of a plan and union the results.
    ///
    /// Any failed scan aborts the whole query as `UpstreamUnavailable`.
    /// Cancellation drops in-flight scans and discards partial results.
    #[instrument(skip(self, plan, cancel), fields(table = %plan.table, scans = plan.requests.len()))]
    pub async fn execute(&self, plan: &ScanPlan, cancel: &CancellationToken) -> Result<MergedScan> {
        let start = Instant::now();
        debug!(
            "Dispatching {} scans with concurrency {}",
            plan.requests.len(),
            self.max_concurrency
        );

        let scans = stream::iter(plan.requests.iter().map(|request| {
            let store = Arc::clone(&self.store);
            async move { store.scan(request).await.map_err(|e| upstream(request, e)) }
        }))
        .buffered(self.max_concurrency)
        .try_collect::<Vec<Vec<RawRecord>>>()
        .boxed();

        let partials = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Query cancelled with {} scans outstanding", plan.requests.len());
                return Err(ArchiveError::Cancelled);
            }
            partials = scans => partials?,
        };

        let merged = MergedScan::from_partials(plan.table.clone(), partials);
        info!(
            "Merged {} rows from {} scans on {} in {}ms",
            merged.len(),
            plan.requests.len(),
            plan.table,
            start.elapsed().as_millis()
        );
        Ok(merged)
    }

    /// Plan and execute in one step
    pub async fn run(&self, intent: &QueryIntent, cancel: &CancellationToken) -> Result<(ScanPlan, MergedScan)> {
        let plan = self.plan(intent)?;
        let merged = self.execute(&plan, cancel).await?;
        Ok((plan, merged))
    }
}

fn check_window(start_jd: f64, stop_jd: f64) -> Result<()> {
    if !start_jd.is_finite() || !stop_jd.is_finite() || start_jd > stop_jd {
        return Err(ArchiveError::InvalidRequest(format!(
            "invalid time window [{}, {})",
            start_jd, stop_jd
        )));
    }
    Ok(())
}

fn upstream(request: &ScanRequest, err: ArchiveError) -> ArchiveError {
    match err {
        ArchiveError::UpstreamUnavailable(_) => err,
        other => ArchiveError::UpstreamUnavailable(format!(
            "scan of {} from '{}' failed: {}",
            request.table, request.start_key, other
        )),
    }
}
