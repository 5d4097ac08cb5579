//! Table catalogue and schema registry for the alert archive
//!
//! The store publishes one schema row per table (qualifier = column name,
//! value = declared type). The registry resolves it lazily, caches it per
//! table and supplies the default-fill policy and type coercion used by the
//! materializer.

use arrow::datatypes::{DataType, Field, Schema};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::ArchiveError;
use crate::row_key::TableShape;
use crate::store::AlertStore;
use crate::types::CellValue;
use crate::Result;

// Default table names
pub const OBJECTS_TABLE: &str = "ztf";
pub const CLASS_TABLE: &str = "ztf.class";
pub const TNS_TABLE: &str = "ztf.tns";
pub const PIXEL_TABLE: &str = "ztf.pixel128";
pub const TIMELINE_TABLE: &str = "ztf.jd";
pub const LOW_STATE_TABLE: &str = "ztf.low_state_blazars";
pub const TNS_RESOLVER_TABLE: &str = "ztf.tns_resolver";
pub const DIA_OBJECT_TABLE: &str = "rubin.diaObject";
pub const SSO_SOURCE_TABLE: &str = "rubin.diaSource_sso";
pub const STATISTICS_TABLE: &str = "statistics_class";
pub const TAG_TABLE_PREFIX: &str = "rubin.";

/// Cell texts treated as missing for numeric columns
const NULL_TOKENS: &[&str] = &["", "None", "none", "null", "NULL"];

/// Column defaults applied when a declared column has no value
pub fn builtin_column_defaults() -> HashMap<String, String> {
    [
        ("d:tracklet", ""),
        ("d:tns", ""),
        ("d:blazar_stats_m0", "-1.0"),
        ("d:blazar_stats_m1", "-1.0"),
        ("d:blazar_stats_m2", "-1.0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Names of the index tables a deployment exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCatalog {
    pub objects: String,
    pub classes: String,
    pub tns: String,
    pub pixels: String,
    pub timeline: String,
    pub low_state: String,
    pub resolver: String,
    pub salted_objects: String,
    pub sso: String,
    pub statistics: String,
    /// Namespace of the per-tag timelines, `{tag_prefix}{tag}`
    pub tag_prefix: String,
    pub tags: Vec<String>,
}

impl Default for TableCatalog {
    fn default() -> Self {
        Self {
            objects: OBJECTS_TABLE.to_string(),
            classes: CLASS_TABLE.to_string(),
            tns: TNS_TABLE.to_string(),
            pixels: PIXEL_TABLE.to_string(),
            timeline: TIMELINE_TABLE.to_string(),
            low_state: LOW_STATE_TABLE.to_string(),
            resolver: TNS_RESOLVER_TABLE.to_string(),
            salted_objects: DIA_OBJECT_TABLE.to_string(),
            sso: SSO_SOURCE_TABLE.to_string(),
            statistics: STATISTICS_TABLE.to_string(),
            tag_prefix: TAG_TABLE_PREFIX.to_string(),
            tags: Vec::new(),
        }
    }
}

impl TableCatalog {
    /// Key shape of a catalogued table
    pub fn shape_of(&self, table: &str) -> Option<TableShape> {
        if table == self.objects
            || table == self.classes
            || table == self.tns
            || table == self.pixels
        {
            Some(TableShape::TIME_SUFFIXED)
        } else if table == self.timeline || table == self.low_state || self.is_tag_table(table) {
            Some(TableShape::TIMELINE)
        } else if table == self.resolver {
            Some(TableShape::NAME_RESOLVER)
        } else if table == self.salted_objects {
            Some(TableShape::SALTED_OBJECT)
        } else if table == self.sso {
            Some(TableShape::SSO_SOURCE)
        } else if table == self.statistics {
            Some(TableShape::SUMMARY)
        } else {
            None
        }
    }

    /// Table holding the timeline of a known tag
    pub fn tag_table(&self, tag: &str) -> Option<String> {
        self.tags
            .iter()
            .any(|t| t == tag)
            .then(|| format!("{}{}", self.tag_prefix, tag))
    }

    fn is_tag_table(&self, table: &str) -> bool {
        table
            .strip_prefix(self.tag_prefix.as_str())
            .map_or(false, |tag| self.tags.iter().any(|t| t == tag))
    }

    /// Tables whose rows are full ZTF alerts, the input of the derived
    /// classification, photometry and sky fields
    pub fn carries_alert_fields(&self, table: &str) -> bool {
        [
            &self.objects,
            &self.classes,
            &self.tns,
            &self.pixels,
            &self.timeline,
            &self.low_state,
        ]
        .iter()
        .any(|t| t.as_str() == table)
    }

    /// All catalogued table names, tag timelines last
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = [
            &self.objects,
            &self.classes,
            &self.tns,
            &self.pixels,
            &self.timeline,
            &self.low_state,
            &self.resolver,
            &self.salted_objects,
            &self.sso,
            &self.statistics,
        ]
        .iter()
        .map(|t| t.to_string())
        .collect();
        names.extend(self.tags.iter().map(|tag| format!("{}{}", self.tag_prefix, tag)));
        names
    }
}

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeclaredType {
    NullableInt64,
    Float64,
    String,
    Boolean,
}

impl DeclaredType {
    /// Map the store's type vocabulary
    pub fn from_store_type(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "long" | "short" => Some(DeclaredType::NullableInt64),
            "float" | "double" => Some(DeclaredType::Float64),
            "string" | "fits" | "fits/image" | "binary" => Some(DeclaredType::String),
            "boolean" | "bool" => Some(DeclaredType::Boolean),
            _ => None,
        }
    }

    pub fn arrow_type(&self) -> DataType {
        match self {
            DeclaredType::NullableInt64 => DataType::Int64,
            DeclaredType::Float64 => DataType::Float64,
            DeclaredType::String => DataType::Utf8,
            DeclaredType::Boolean => DataType::Boolean,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeclaredType::NullableInt64 => "nullableInt64",
            DeclaredType::Float64 => "float64",
            DeclaredType::String => "string",
            DeclaredType::Boolean => "boolean",
        }
    }
}

/// Declared column with its default-fill policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub declared_type: DeclaredType,
    pub has_default: bool,
    pub default_value: Option<String>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            has_default: false,
            default_value: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.has_default = true;
        self.default_value = Some(value.into());
        self
    }

    /// Cast a raw cell per the declared type.
    ///
    /// Booleans convert only the literal `"true"` / `"false"`; any other text
    /// is kept as a string.
    pub fn coerce(&self, raw: &str) -> Result<CellValue> {
        match self.declared_type {
            DeclaredType::String => Ok(CellValue::Str(raw.to_string())),
            DeclaredType::Boolean => Ok(match raw {
                "true" => CellValue::Bool(true),
                "false" => CellValue::Bool(false),
                other => CellValue::Str(other.to_string()),
            }),
            DeclaredType::Float64 => {
                let text = raw.trim();
                if NULL_TOKENS.contains(&text) {
                    return Ok(CellValue::Null);
                }
                if text.eq_ignore_ascii_case("nan") {
                    return Ok(CellValue::Float(f64::NAN));
                }
                text.parse::<f64>()
                    .map(CellValue::Float)
                    .map_err(|_| self.coercion_error(raw))
            }
            DeclaredType::NullableInt64 => {
                let text = raw.trim();
                if NULL_TOKENS.contains(&text) || text.eq_ignore_ascii_case("nan") {
                    return Ok(CellValue::Null);
                }
                if let Ok(v) = text.parse::<i64>() {
                    return Ok(CellValue::Int(v));
                }
                match text.parse::<f64>() {
                    Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(CellValue::Int(v as i64)),
                    _ => Err(self.coercion_error(raw)),
                }
            }
        }
    }

    /// Value used when the cell is absent: the coerced default or a null
    pub fn fill_value(&self) -> Result<CellValue> {
        match &self.default_value {
            Some(value) if self.has_default => self.coerce(value),
            _ => Ok(CellValue::Null),
        }
    }

    fn coercion_error(&self, raw: &str) -> ArchiveError {
        ArchiveError::SchemaMismatch(format!(
            "cannot coerce '{}' in column {} to {}",
            raw,
            self.name,
            self.declared_type.as_str()
        ))
    }
}

/// Ordered column list of one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: String,
    columns: Vec<ColumnSchema>,
    index: HashMap<String, usize>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self {
            table: table.into(),
            columns,
            index,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Arrow view of the declared columns (all nullable)
    pub fn to_arrow_schema(&self) -> Arc<Schema> {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|c| Field::new(c.name.as_str(), c.declared_type.arrow_type(), true))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

/// Lazily populated, explicitly invalidated schema cache in front of the store
pub struct SchemaRegistry {
    store: Arc<dyn AlertStore>,
    defaults: HashMap<String, String>,
    table_defaults: HashMap<String, HashMap<String, String>>,
    cache: RwLock<HashMap<String, Arc<TableSchema>>>,
}

impl SchemaRegistry {
    /// Create a registry with the built-in default fills
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self {
            store,
            defaults: builtin_column_defaults(),
            table_defaults: HashMap::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Override the default fill of one column for one table
    pub fn with_table_default(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.table_defaults
            .entry(table.into())
            .or_default()
            .insert(column.into(), value.into());
        self
    }

    /// Resolve the schema of `table`, from cache when possible
    #[instrument(skip(self))]
    pub async fn table_schema(&self, table: &str) -> Result<Arc<TableSchema>> {
        let cached = self.cache.read().get(table).cloned();
        if let Some(schema) = cached {
            return Ok(schema);
        }

        debug!("Schema cache miss for {}", table);
        let columns = self.store.schema(table).await?;
        if columns.is_empty() {
            return Err(ArchiveError::SchemaMismatch(format!(
                "no schema published for table {}",
                table
            )));
        }

        let overrides = self.table_defaults.get(table);
        let columns = columns
            .into_iter()
            .map(|column| {
                if column.has_default {
                    return column;
                }
                let default = overrides
                    .and_then(|o| o.get(&column.name))
                    .or_else(|| self.defaults.get(&column.name));
                match default {
                    Some(value) => column.with_default(value.clone()),
                    None => column,
                }
            })
            .collect();

        let schema = Arc::new(TableSchema::new(table, columns));
        info!("Loaded schema for {} ({} columns)", table, schema.len());
        self.cache
            .write()
            .insert(table.to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Declared type of a column
    pub async fn type_of(&self, table: &str, column: &str) -> Result<DeclaredType> {
        let schema = self.table_schema(table).await?;
        schema
            .column(column)
            .map(|c| c.declared_type)
            .ok_or_else(|| unknown_column(table, column))
    }

    /// Default fill value of a column, if it has one
    pub async fn default_for(&self, table: &str, column: &str) -> Result<Option<String>> {
        let schema = self.table_schema(table).await?;
        schema
            .column(column)
            .map(|c| c.default_value.clone())
            .ok_or_else(|| unknown_column(table, column))
    }

    /// Drop cached schemas: one table, or all when `table` is `None`
    pub fn invalidate(&self, table: Option<&str>) {
        let mut cache = self.cache.write();
        match table {
            Some(table) => {
                cache.remove(table);
            }
            None => cache.clear(),
        }
    }

    /// Whether a table's schema is currently cached
    pub fn is_cached(&self, table: &str) -> bool {
        self.cache.read().contains_key(table)
    }
}

fn unknown_column(table: &str, column: &str) -> ArchiveError {
    ArchiveError::SchemaMismatch(format!("column {} is not declared for table {}", column, table))
}
