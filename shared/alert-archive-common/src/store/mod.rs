//! Store interface consumed by the scan planner and schema registry
//!
//! The core only needs three calls from the wide-column store: a bounded
//! scan, the published schema of a table, and close. Connection setup and
//! authentication stay with the concrete client.

use async_trait::async_trait;

use crate::schemas::ColumnSchema;
use crate::types::{RawRecord, ScanRequest};
use crate::Result;

pub mod hbase_rest;
pub mod memory;

pub use hbase_rest::HbaseRestStore;
pub use memory::MemoryStore;

/// Narrow read interface to the alert store
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Run one scan. Failures surface as `UpstreamUnavailable`.
    async fn scan(&self, request: &ScanRequest) -> Result<Vec<RawRecord>>;

    /// Declared columns of `table`
    async fn schema(&self, table: &str) -> Result<Vec<ColumnSchema>>;

    /// Release client resources
    async fn close(&self) -> Result<()>;
}
