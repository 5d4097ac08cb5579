//! NATS listener for alert archive query and schema operations
//!
//! Listens to:
//! - `archive.{intent}.query` - object, class, cone and timeline queries
//! - `archive.schema.list` - List catalogued tables
//! - `archive.schema.get` - Get one table's declared schema

use anyhow::{Context, Result};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

use crate::query_handler::QueryHandler;
use crate::schema_handler::{
    SchemaGetRequest, SchemaGetResponse, SchemaHandler, SchemaListRequest, SchemaListResponse,
};

const DEFAULT_NATS_URL: &str = "nats://localhost:4222";
const DEFAULT_QUERY_SUBJECT: &str = "archive.*.query";
const DEFAULT_SCHEMA_LIST_SUBJECT: &str = "archive.schema.list";
const DEFAULT_SCHEMA_GET_SUBJECT: &str = "archive.schema.get";

/// NATS listener configuration
#[derive(Debug, Clone, PartialEq)]
pub struct NatsQueryListenerConfig {
    /// NATS server URL
    pub nats_url: String,
    /// Subject pattern for queries
    pub query_subject_pattern: String,
    /// Subject for schema list requests
    pub schema_list_subject: String,
    /// Subject for schema get requests
    pub schema_get_subject: String,
}

impl Default for NatsQueryListenerConfig {
    fn default() -> Self {
        Self {
            nats_url: DEFAULT_NATS_URL.to_string(),
            query_subject_pattern: DEFAULT_QUERY_SUBJECT.to_string(),
            schema_list_subject: DEFAULT_SCHEMA_LIST_SUBJECT.to_string(),
            schema_get_subject: DEFAULT_SCHEMA_GET_SUBJECT.to_string(),
        }
    }
}

impl NatsQueryListenerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());

        Self {
            nats_url: env("NATS_URL", DEFAULT_NATS_URL),
            query_subject_pattern: env("ARCHIVE_QUERY_SUBJECT", DEFAULT_QUERY_SUBJECT),
            schema_list_subject: env("ARCHIVE_SCHEMA_LIST_SUBJECT", DEFAULT_SCHEMA_LIST_SUBJECT),
            schema_get_subject: env("ARCHIVE_SCHEMA_GET_SUBJECT", DEFAULT_SCHEMA_GET_SUBJECT),
        }
    }

    /// Load configuration from wasmCloud HostData properties.
    ///
    /// Lowercase keys win over their uppercase environment-style spelling.
    pub fn from_properties(props: &HashMap<String, String>) -> Self {
        let prop = |keys: &[&str], default: &str| {
            keys.iter()
                .find_map(|k| props.get(*k))
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            nats_url: prop(&["nats_url", "NATS_URL"], DEFAULT_NATS_URL),
            query_subject_pattern: prop(
                &[
                    "archive_query_subject",
                    "archive_query_subject_pattern",
                    "ARCHIVE_QUERY_SUBJECT",
                ],
                DEFAULT_QUERY_SUBJECT,
            ),
            schema_list_subject: prop(
                &["archive_schema_list_subject", "ARCHIVE_SCHEMA_LIST_SUBJECT"],
                DEFAULT_SCHEMA_LIST_SUBJECT,
            ),
            schema_get_subject: prop(
                &["archive_schema_get_subject", "ARCHIVE_SCHEMA_GET_SUBJECT"],
                DEFAULT_SCHEMA_GET_SUBJECT,
            ),
        }
    }
}

/// NATS listener for alert archive query and schema operations
pub struct NatsQueryListener {
    config: NatsQueryListenerConfig,
    queries: Arc<QueryHandler>,
    schema_handler: SchemaHandler,
    shutdown: CancellationToken,
}

impl NatsQueryListener {
    pub fn new(
        config: NatsQueryListenerConfig,
        queries: Arc<QueryHandler>,
        shutdown: CancellationToken,
    ) -> Self {
        let schema_handler = SchemaHandler::new(Arc::clone(queries.service()));
        Self {
            config,
            queries,
            schema_handler,
            shutdown,
        }
    }

    /// Start listening for query and schema requests.
    ///
    /// Each query runs in its own task with a child of the shutdown token, so
    /// closing the provider abandons in-flight scans.
    #[instrument(skip(self))]
    pub async fn start(self) -> Result<()> {
        info!("Connecting to NATS at {}", self.config.nats_url);

        let client = async_nats::connect(&self.config.nats_url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        let mut query_subscriber = client
            .subscribe(self.config.query_subject_pattern.clone())
            .await
            .context("Failed to subscribe to query subject pattern")?;
        let mut schema_list_subscriber = client
            .subscribe(self.config.schema_list_subject.clone())
            .await
            .context("Failed to subscribe to schema list subject")?;
        let mut schema_get_subscriber = client
            .subscribe(self.config.schema_get_subject.clone())
            .await
            .context("Failed to subscribe to schema get subject")?;

        info!("Alert Archive Query & Schema Listener is ready");
        info!("  Query: {}", self.config.query_subject_pattern);
        info!("  Schema List: {}", self.config.schema_list_subject);
        info!("  Schema Get: {}", self.config.schema_get_subject);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, leaving NATS loop");
                    break;
                }

                Some(message) = query_subscriber.next() => {
                    let Some(reply_subject) = message.reply.clone() else {
                        warn!("Dropping query on {} without a reply subject", message.subject);
                        continue;
                    };
                    let client = client.clone();
                    let queries = Arc::clone(&self.queries);
                    let cancel = self.shutdown.child_token();
                    let subject = message.subject.to_string();
                    let span = info_span!("query", query_id = %Uuid::new_v4(), subject = %subject);

                    tokio::spawn(async move {
                        let bytes = queries.handle(&subject, &message.payload, &cancel).await;
                        if let Err(e) = client.publish(reply_subject, bytes.into()).await {
                            error!("Failed to send query response: {}", e);
                        }
                    }.instrument(span));
                }

                Some(message) = schema_list_subscriber.next() => {
                    let response = self.process_schema_list(&message.payload).await;
                    if let Some(reply_subject) = message.reply.clone() {
                        let response_bytes = serde_json::to_vec(&response)
                            .unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e).into_bytes());
                        if let Err(e) = client.publish(reply_subject, response_bytes.into()).await {
                            error!("Failed to send schema list response: {}", e);
                        }
                    }
                }

                Some(message) = schema_get_subscriber.next() => {
                    let response = self.process_schema_get(&message.payload).await;
                    if let Some(reply_subject) = message.reply.clone() {
                        let response_bytes = serde_json::to_vec(&response)
                            .unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e).into_bytes());
                        if let Err(e) = client.publish(reply_subject, response_bytes.into()).await {
                            error!("Failed to send schema get response: {}", e);
                        }
                    }
                }

                else => {
                    warn!("All NATS subscriptions ended");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Process schema list request
    #[instrument(skip(self, payload))]
    async fn process_schema_list(&self, payload: &[u8]) -> SchemaListResponse {
        match parse_schema_list(payload) {
            Ok(request) => self.schema_handler.handle_list(&request).await,
            Err(e) => {
                error!("Failed to parse schema list request: {}", e);
                SchemaListResponse::error(format!("Invalid request: {}", e))
            }
        }
    }

    /// Process schema get request
    #[instrument(skip(self, payload))]
    async fn process_schema_get(&self, payload: &[u8]) -> SchemaGetResponse {
        match serde_json::from_slice::<SchemaGetRequest>(payload) {
            Ok(request) => self.schema_handler.handle_get(&request).await,
            Err(e) => {
                error!("Failed to parse schema get request: {}", e);
                SchemaGetResponse::error(format!("Invalid request: {}", e))
            }
        }
    }
}

/// Empty payload means the default list request
fn parse_schema_list(payload: &[u8]) -> serde_json::Result<SchemaListRequest> {
    if payload.is_empty() {
        Ok(SchemaListRequest::default())
    } else {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_defaults() {
        let config = NatsQueryListenerConfig::from_properties(&HashMap::new());
        assert_eq!(config, NatsQueryListenerConfig::default());
        assert_eq!(config.query_subject_pattern, "archive.*.query");
    }

    #[test]
    fn test_config_from_properties() {
        let props: HashMap<String, String> = [
            ("NATS_URL", "nats://upper:4222"),
            ("nats_url", "nats://lower:4222"),
            ("ARCHIVE_QUERY_SUBJECT", "archive.conesearch.query"),
            ("archive_schema_get_subject", "alerts.schema.get"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = NatsQueryListenerConfig::from_properties(&props);
        assert_eq!(config.nats_url, "nats://lower:4222");
        assert_eq!(config.query_subject_pattern, "archive.conesearch.query");
        assert_eq!(config.schema_list_subject, "archive.schema.list");
        assert_eq!(config.schema_get_subject, "alerts.schema.get");
    }

    #[test]
    fn test_schema_list_request_parsing() {
        assert_eq!(parse_schema_list(b"").unwrap(), SchemaListRequest::default());

        let request = parse_schema_list(br#"{"include_columns": true, "table_filter": "pixel"}"#)
            .unwrap();
        assert!(request.include_columns);
        assert_eq!(request.table_filter, Some("pixel".to_string()));

        assert!(parse_schema_list(b"{").is_err());
    }
}
