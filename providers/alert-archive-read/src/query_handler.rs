//! Query handler: decodes request bodies, runs them on the service under a
//! timeout and encodes the reply

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use alert_archive_common::{ArchiveError, QueryKind, Result, SubjectInfo};

use crate::materializer::AlertTable;
use crate::service::AlertQueryService;

/// Reply encoding requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Arrow IPC stream
    #[default]
    Arrow,
    /// JSON array of row objects
    Json,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    format: OutputFormat,
}

/// Runs decoded queries against the service
pub struct QueryHandler {
    service: Arc<AlertQueryService>,
    timeout: Duration,
}

impl QueryHandler {
    pub fn new(service: Arc<AlertQueryService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    pub fn service(&self) -> &Arc<AlertQueryService> {
        &self.service
    }

    /// Handle one request and always produce reply bytes
    pub async fn handle(&self, subject: &str, payload: &[u8], cancel: &CancellationToken) -> Vec<u8> {
        match self.process(subject, payload, cancel).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.is_user_error() {
                    info!("Rejected query on {}: {}", subject, e);
                } else {
                    warn!("Query on {} failed: {}", subject, e);
                }
                error_reply(&e)
            }
        }
    }

    /// Decode, execute and encode a query request
    #[instrument(skip(self, payload, cancel), fields(subject = %subject))]
    pub async fn process(
        &self,
        subject: &str,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let info = SubjectInfo::parse(subject)
            .map_err(|e| ArchiveError::InvalidRequest(e.to_string()))?;
        let envelope: Envelope = decode(payload)?;
        debug!("Processing {} query ({:?})", info.intent, envelope.format);

        let table = match tokio::time::timeout(
            self.timeout,
            self.execute(info.intent, payload, cancel),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                cancel.cancel();
                warn!("Query on {} timed out after {:?}", subject, self.timeout);
                return Err(ArchiveError::Cancelled);
            }
        };

        encode(&table, envelope.format)
    }

    async fn execute(
        &self,
        intent: QueryKind,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<AlertTable> {
        match intent {
            QueryKind::Objects => self.service.by_identifier(&decode(payload)?, cancel).await,
            QueryKind::Classes => {
                self.service
                    .by_class_and_time(&decode(payload)?, cancel)
                    .await
            }
            QueryKind::Conesearch => self.service.by_cone(&decode(payload)?, cancel).await,
            QueryKind::Timeline => self.service.by_time_range(&decode(payload)?, cancel).await,
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T> {
    serde_json::from_slice(payload)
        .map_err(|e| ArchiveError::InvalidRequest(format!("invalid request body: {}", e)))
}

/// Serialize a table in the requested format
pub fn encode(table: &AlertTable, format: OutputFormat) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Arrow => table.encode_ipc(),
        OutputFormat::Json => Ok(serde_json::to_vec(&table.to_json_rows())?),
    }
}

/// `{"error": message, "code": code}` reply body
pub fn error_reply(err: &ArchiveError) -> Vec<u8> {
    let body = serde_json::json!({
        "error": err.to_string(),
        "code": err.code(),
    });
    body.to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_archive_common::{ArchiveConfig, MemoryStore};
    use pretty_assertions::assert_eq;

    fn handler() -> QueryHandler {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(AlertQueryService::new(store, ArchiveConfig::default()));
        QueryHandler::new(service, Duration::from_secs(5))
    }

    fn reply(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_bad_subject_and_body() {
        let handler = handler();
        let cancel = CancellationToken::new();

        let body = reply(&handler.handle("archive.nope.query", b"{}", &cancel).await);
        assert_eq!(body["code"], "invalid_request");

        let body = reply(
            &handler
                .handle("archive.conesearch.query", b"not json", &cancel)
                .await,
        );
        assert_eq!(body["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_validation_errors_carry_codes() {
        let handler = handler();
        let cancel = CancellationToken::new();
        let payload = br#"{"ra": 10.0, "dec": 10.0, "radius": 20000, "format": "json"}"#;
        let body = reply(&handler.handle("archive.conesearch.query", payload, &cancel).await);
        assert_eq!(body["code"], "radius_too_large");
        assert!(body["error"].as_str().unwrap().contains("20000"));

        let payload = br#"{"class": "SN candidate", "trend": "low_state"}"#;
        let body = reply(&handler.handle("archive.classes.query", payload, &cancel).await);
        assert_eq!(body["code"], "invalid_trend");
    }

    #[test]
    fn test_format_defaults_to_arrow() {
        let envelope: Envelope = serde_json::from_str(r#"{"class": "x"}"#).unwrap();
        assert_eq!(envelope.format, OutputFormat::Arrow);
        let envelope: Envelope = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(envelope.format, OutputFormat::Json);
    }
}
