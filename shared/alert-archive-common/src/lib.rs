//! Alert Archive Common Library
//!
//! Shared row-key codec, table catalogue, schema registry, store clients and
//! configuration for the alert archive read provider. The store is a sparse
//! wide-column table set (HBase) whose rows are keyed by salted composite
//! keys and whose cells are untyped `family:qualifier` strings.

pub mod config;
pub mod error;
pub mod row_key;
pub mod schemas;
pub mod store;
pub mod subject_parser;
pub mod time;
pub mod types;

// Re-export commonly used types
pub use config::ArchiveConfig;
pub use error::ArchiveError;
pub use row_key::{format_jd, key_prefix, time_range, RowKey, SaltPolicy, TableShape};
pub use schemas::{
    builtin_column_defaults, ColumnSchema, DeclaredType, SchemaRegistry, TableCatalog,
    TableSchema, CLASS_TABLE, DIA_OBJECT_TABLE, LOW_STATE_TABLE, OBJECTS_TABLE, PIXEL_TABLE,
    SSO_SOURCE_TABLE, STATISTICS_TABLE, TAG_TABLE_PREFIX, TIMELINE_TABLE, TNS_RESOLVER_TABLE,
    TNS_TABLE,
};
pub use store::{AlertStore, HbaseRestStore, MemoryStore};
pub use subject_parser::{QueryKind, SubjectInfo, SubjectParseError};
pub use types::{CellValue, ColumnFilter, RawRecord, ScanRequest, INTERNAL_FAMILY};

/// Result type alias for alert archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;
