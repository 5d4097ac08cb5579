//! HBase REST gateway client
//!
//! Scans go through the stateful scanner resource of the REST gateway:
//! `PUT /{table}/scanner` creates a scanner (its URL comes back in the
//! `Location` header), `GET` on that URL returns batches of cells until the
//! gateway answers 204, then the scanner is removed with `DELETE`. Row keys,
//! column names and cell values are base64 encoded on the wire.
//!
//! Table schemas are read from a dedicated schema row whose cells map each
//! `family:qualifier` column to its declared type name.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::AlertStore;
use crate::error::ArchiveError;
use crate::schemas::{ColumnSchema, DeclaredType};
use crate::types::{ColumnFilter, RawRecord, ScanRequest};
use crate::Result;

/// Rows fetched per scanner `GET`
const DEFAULT_BATCH_SIZE: usize = 1000;

/// Scanner definition posted to the gateway
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScannerSpec {
    start_row: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_row: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    column: Vec<String>,
    batch: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    reversed: bool,
}

#[derive(Debug, Deserialize)]
struct CellSet {
    #[serde(rename = "Row", default)]
    rows: Vec<RowModel>,
}

#[derive(Debug, Deserialize)]
struct RowModel {
    key: String,
    #[serde(rename = "Cell", default)]
    cells: Vec<CellModel>,
}

#[derive(Debug, Deserialize)]
struct CellModel {
    column: String,
    #[serde(rename = "$")]
    value: String,
}

/// Alert store backed by an HBase REST gateway
pub struct HbaseRestStore {
    client: Client,
    base_url: Url,
    schema_row_key: String,
    batch_size: usize,
}

impl HbaseRestStore {
    /// Create a client for the gateway at `base_url`
    pub fn new(base_url: &str, schema_row_key: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ArchiveError::ConfigError(format!("Invalid HBase REST URL {}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ArchiveError::ConfigError(format!(
                "HBase REST URL cannot be a base: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArchiveError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            schema_row_key: schema_row_key.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Override the number of rows fetched per scanner call
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn resource_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ArchiveError::ConfigError(format!(
                    "HBase REST URL cannot be a base: {}",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn scanner_spec(&self, request: &ScanRequest) -> ScannerSpec {
        let column = match &request.column_filter {
            ColumnFilter::All => Vec::new(),
            ColumnFilter::Columns(columns) => {
                columns.iter().map(|c| BASE64.encode(c.as_bytes())).collect()
            }
        };

        let (start_row, end_row, filter) = if request.range_scan {
            let stop = request.stop_key.clone().unwrap_or_default();
            if request.reversed {
                // Reversed scanners include their start row and exclude their
                // end row, so [start, stop) is cut while draining
                (stop, None, None)
            } else {
                (request.start_key.clone(), Some(stop), None)
            }
        } else {
            let filter = serde_json::json!({
                "type": "PrefixFilter",
                "value": BASE64.encode(request.start_key.as_bytes()),
            })
            .to_string();
            (request.start_key.clone(), None, Some(filter))
        };

        ScannerSpec {
            start_row: BASE64.encode(start_row.as_bytes()),
            end_row: end_row.map(|row| BASE64.encode(row.as_bytes())),
            column,
            batch: self.batch_size,
            filter,
            // one extra row for a stop key that may head a reversed scan
            limit: request
                .limit
                .map(|n| if reversed_range(request) { n.saturating_add(1) } else { n }),
            reversed: request.reversed,
        }
    }

    async fn open_scanner(&self, request: &ScanRequest) -> Result<String> {
        let url = self.resource_url(&[&request.table, "scanner"])?;
        let response = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&self.scanner_spec(request))
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(ArchiveError::UpstreamUnavailable(format!(
                "scanner creation on {} returned {}",
                request.table,
                response.status()
            )));
        }

        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ArchiveError::UpstreamUnavailable("scanner created without a Location".to_string())
            })
    }

    async fn drain_scanner(&self, scanner: &str, request: &ScanRequest) -> Result<Vec<RawRecord>> {
        let limit = request.limit.unwrap_or(usize::MAX);
        let mut records = Vec::new();
        let mut exhausted = false;

        while !exhausted && records.len() < limit {
            let response = self
                .client
                .get(scanner)
                .header(header::ACCEPT, "application/json")
                .send()
                .await?;

            match response.status() {
                StatusCode::NO_CONTENT => break,
                StatusCode::OK => {
                    let cell_set: CellSet = response.json().await?;
                    if cell_set.rows.is_empty() {
                        break;
                    }
                    for row in cell_set.rows {
                        let record = decode_row(row)?;
                        match admit(request, &record.key) {
                            Admit::Keep => records.push(record),
                            Admit::Skip => {}
                            Admit::Exhausted => {
                                exhausted = true;
                                break;
                            }
                        }
                    }
                }
                status => {
                    return Err(ArchiveError::UpstreamUnavailable(format!(
                        "scanner read returned {}",
                        status
                    )))
                }
            }
        }

        records.truncate(limit);
        Ok(records)
    }
}

fn reversed_range(request: &ScanRequest) -> bool {
    request.range_scan && request.reversed
}

#[derive(Debug, PartialEq, Eq)]
enum Admit {
    Keep,
    Skip,
    /// A reversed scan went below its start key
    Exhausted,
}

/// Hold every store to the `[start, stop)` window of the request
fn admit(request: &ScanRequest, key: &str) -> Admit {
    if request.matches_key(key) {
        Admit::Keep
    } else if reversed_range(request) && key < request.start_key.as_str() {
        Admit::Exhausted
    } else {
        Admit::Skip
    }
}

fn decode_text(field: &str, value: &str) -> Result<String> {
    let bytes = BASE64.decode(value).map_err(|e| {
        ArchiveError::UpstreamUnavailable(format!("undecodable {} from gateway: {}", field, e))
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn decode_row(row: RowModel) -> Result<RawRecord> {
    let mut record = RawRecord::new(decode_text("row key", &row.key)?);
    for cell in row.cells {
        record.cells.insert(
            decode_text("column", &cell.column)?,
            decode_text("cell", &cell.value)?,
        );
    }
    Ok(record)
}

#[async_trait]
impl AlertStore for HbaseRestStore {
    #[instrument(skip(self, request), fields(table = %request.table, start = %request.start_key))]
    async fn scan(&self, request: &ScanRequest) -> Result<Vec<RawRecord>> {
        request.validate()?;

        let scanner = self.open_scanner(request).await?;
        let result = self.drain_scanner(&scanner, request).await;

        if let Err(e) = self.client.delete(scanner.as_str()).send().await {
            warn!("Failed to release scanner {}: {}", scanner, e);
        }

        let records = result?;
        debug!("Scan returned {} rows", records.len());
        Ok(records)
    }

    #[instrument(skip(self))]
    async fn schema(&self, table: &str) -> Result<Vec<ColumnSchema>> {
        let url = self.resource_url(&[table, &self.schema_row_key])?;
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(Vec::new()),
            StatusCode::OK => {}
            status => {
                return Err(ArchiveError::UpstreamUnavailable(format!(
                    "schema read on {} returned {}",
                    table, status
                )))
            }
        }

        let cell_set: CellSet = response.json().await?;
        let mut columns = Vec::new();
        for row in cell_set.rows {
            let record = decode_row(row)?;
            for (column, type_name) in record.cells {
                let declared = DeclaredType::from_store_type(&type_name).ok_or_else(|| {
                    ArchiveError::SchemaMismatch(format!(
                        "column {} of {} has unsupported type '{}'",
                        column, table, type_name
                    ))
                })?;
                columns.push(ColumnSchema::new(column, declared));
            }
        }
        Ok(columns)
    }

    async fn close(&self) -> Result<()> {
        // reqwest pools are released on drop; scanners are deleted per scan
        Ok(())
    }
}
