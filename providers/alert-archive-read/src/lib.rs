//! Alert Archive Read Provider
//!
//! wasmCloud capability provider answering queries over the astronomical
//! alert archive held in a sorted wide-column store.
//!
//! This provider:
//! - Listens on NATS subjects: `archive.{objects|classes|conesearch|timeline}.query`
//! - Plans prefix and range scans over the row-keyed index tables
//! - Materializes typed rows with derived columns and trend filtering
//! - Returns results as Arrow IPC streams or JSON
//! - Provides schema discovery via `archive.schema.list` and `archive.schema.get`
//!
//! Configuration via HostData properties or environment variables:
//! - NATS_URL: NATS server URL
//! - ARCHIVE_HBASE_REST_URL: HBase REST gateway
//! - ARCHIVE_NSIDE, ARCHIVE_*_LIMIT, ARCHIVE_*_TABLE: index layout and limits

pub mod materializer;
pub mod nats_listener;
pub mod planner;
pub mod provider;
pub mod query_handler;
pub mod requests;
pub mod schema_handler;
pub mod service;
pub mod sky;
pub mod trend;

pub use materializer::{AlertTable, MaterializeOptions, Materializer};
pub use nats_listener::{NatsQueryListener, NatsQueryListenerConfig};
pub use planner::{QueryIntent, ScanPlan, ScanPlanner};
pub use provider::AlertArchiveReadProvider;
pub use query_handler::{OutputFormat, QueryHandler};
pub use requests::{ClassQuery, ConeQuery, ObjectQuery, TimelineQuery};
pub use schema_handler::SchemaHandler;
pub use service::AlertQueryService;
pub use trend::{Trend, TrendRules};

// Re-export common types
pub use alert_archive_common::{
    config::ArchiveConfig,
    error::ArchiveError,
    store::{AlertStore, HbaseRestStore, MemoryStore},
    subject_parser::SubjectInfo,
    Result,
};
