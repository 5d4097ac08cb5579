//! Schema handler for NATS-based schema discovery
//!
//! Handles `archive.schema.list` and `archive.schema.get` requests with the
//! declared column types and default fills from the schema registry.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use alert_archive_common::TableSchema;

use crate::service::AlertQueryService;

/// Request body of `archive.schema.get`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaGetRequest {
    pub table_name: String,
}

/// Request body of `archive.schema.list`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaListRequest {
    #[serde(default)]
    pub table_filter: Option<String>,
    #[serde(default)]
    pub include_columns: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub data_type: String,
    pub has_default: bool,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescription {
    pub table_name: String,
    /// Row-key segments, e.g. `salt_primary` or `primary_jd`
    pub key_layout: String,
    pub columns: Vec<SchemaColumn>,
    pub column_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaGetResponse {
    pub success: bool,
    pub table: Option<TableDescription>,
    pub error: Option<String>,
}

impl SchemaGetResponse {
    pub fn success(table: TableDescription) -> Self {
        Self {
            success: true,
            table: Some(table),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            table: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaListResponse {
    pub success: bool,
    pub tables: Vec<TableDescription>,
    pub error: Option<String>,
}

impl SchemaListResponse {
    pub fn success(tables: Vec<TableDescription>) -> Self {
        Self {
            success: true,
            tables,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            tables: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Describes archive tables from the registry's declared schemas
pub struct SchemaHandler {
    service: Arc<AlertQueryService>,
}

impl SchemaHandler {
    pub fn new(service: Arc<AlertQueryService>) -> Self {
        Self { service }
    }

    /// Handle schema list request
    #[instrument(skip(self))]
    pub async fn handle_list(&self, request: &SchemaListRequest) -> SchemaListResponse {
        info!("Handling schema list request");

        let tables = &self.service.config().tables;
        let mut descriptions = Vec::new();
        for table_name in tables.table_names() {
            if let Some(filter) = &request.table_filter {
                if !table_name.contains(filter.as_str()) {
                    continue;
                }
            }

            let schema = if request.include_columns {
                match self.service.schema(&table_name).await {
                    Ok(schema) => Some(schema),
                    Err(e) => {
                        debug!("Failed to load schema for {}: {}", table_name, e);
                        continue;
                    }
                }
            } else {
                None
            };
            descriptions.push(self.describe(&table_name, schema.as_deref()));
        }

        info!("Returning {} table descriptions", descriptions.len());
        SchemaListResponse::success(descriptions)
    }

    /// Handle schema get request for a specific table
    #[instrument(skip(self))]
    pub async fn handle_get(&self, request: &SchemaGetRequest) -> SchemaGetResponse {
        info!(
            "Handling schema get request for table: {}",
            request.table_name
        );

        match self.service.schema(&request.table_name).await {
            Ok(schema) => {
                info!(
                    "Returning schema for {} with {} columns",
                    request.table_name,
                    schema.len()
                );
                SchemaGetResponse::success(self.describe(&request.table_name, Some(&schema)))
            }
            Err(e) => {
                info!("Schema unavailable for {}: {}", request.table_name, e);
                SchemaGetResponse::error(e.to_string())
            }
        }
    }

    fn describe(&self, table_name: &str, schema: Option<&TableSchema>) -> TableDescription {
        let key_layout = self
            .service
            .config()
            .tables
            .shape_of(table_name)
            .map(|shape| {
                let mut segments = Vec::new();
                if shape.salt.is_some() {
                    segments.push("salt");
                }
                segments.push("primary");
                if shape.secondary {
                    segments.push("secondary");
                }
                if shape.timestamp {
                    segments.push("jd");
                }
                segments.join("_")
            })
            .unwrap_or_default();

        let columns: Vec<SchemaColumn> = schema
            .map(|schema| {
                schema
                    .columns()
                    .iter()
                    .map(|c| SchemaColumn {
                        name: c.name.clone(),
                        data_type: c.declared_type.as_str().to_string(),
                        has_default: c.has_default,
                        default_value: c.default_value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        TableDescription {
            table_name: table_name.to_string(),
            key_layout,
            column_count: columns.len(),
            columns,
        }
    }
}
