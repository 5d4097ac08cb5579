//! In-memory alert store for tests and local development

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use super::AlertStore;
use crate::error::ArchiveError;
use crate::schemas::ColumnSchema;
use crate::types::{RawRecord, ScanRequest};
use crate::Result;

type TableRows = BTreeMap<String, BTreeMap<String, String>>;

/// Sorted-key tables held in memory, with failure and latency injection
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, TableRows>>,
    schemas: RwLock<HashMap<String, Vec<ColumnSchema>>>,
    failing: RwLock<HashSet<String>>,
    latency: RwLock<Option<Duration>>,
    scans: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a row
    pub fn insert(&self, table: &str, record: RawRecord) {
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(record.key, record.cells);
    }

    pub fn insert_all(&self, table: &str, records: impl IntoIterator<Item = RawRecord>) {
        for record in records {
            self.insert(table, record);
        }
    }

    /// Publish the declared columns of a table
    pub fn set_schema(&self, table: &str, columns: Vec<ColumnSchema>) {
        self.schemas.write().insert(table.to_string(), columns);
    }

    /// Make every scan of `table` fail
    pub fn fail_table(&self, table: &str) {
        self.failing.write().insert(table.to_string());
    }

    /// Delay every scan by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = Some(latency);
    }

    /// Number of scans issued so far
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn scan(&self, request: &ScanRequest) -> Result<Vec<RawRecord>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        request.validate()?;

        if self.closed.load(Ordering::SeqCst) {
            return Err(ArchiveError::UpstreamUnavailable(
                "store client is closed".to_string(),
            ));
        }
        if self.failing.read().contains(&request.table) {
            return Err(ArchiveError::UpstreamUnavailable(format!(
                "scan of {} failed",
                request.table
            )));
        }

        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let tables = self.tables.read();
        let Some(rows) = tables.get(&request.table) else {
            return Ok(Vec::new());
        };

        let matching = rows
            .iter()
            .filter(|(key, _)| request.matches_key(key));
        let ordered: Box<dyn Iterator<Item = (&String, &BTreeMap<String, String>)>> =
            if request.reversed {
                Box::new(matching.rev())
            } else {
                Box::new(matching)
            };

        let records: Vec<RawRecord> = ordered
            .take(request.limit.unwrap_or(usize::MAX))
            .map(|(key, cells)| {
                let mut record = RawRecord::new(key.clone()).with_cell("key:key", key.clone());
                for (column, value) in cells {
                    if request.column_filter.accepts(column) {
                        record.cells.insert(column.clone(), value.clone());
                    }
                }
                record
            })
            .collect();

        debug!(
            "Memory scan of {} from '{}' returned {} rows",
            request.table,
            request.start_key,
            records.len()
        );
        Ok(records)
    }

    async fn schema(&self, table: &str) -> Result<Vec<ColumnSchema>> {
        if self.failing.read().contains(table) {
            return Err(ArchiveError::UpstreamUnavailable(format!(
                "schema of {} unavailable",
                table
            )));
        }
        Ok(self.schemas.read().get(table).cloned().unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
