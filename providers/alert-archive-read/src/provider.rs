//! wasmCloud provider implementation for Alert Archive Read
//!
//! Implements the wasmCloud provider lifecycle.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use wasmcloud_provider_sdk::Provider;

use alert_archive_common::{AlertStore, ArchiveConfig, HbaseRestStore};

use crate::nats_listener::{NatsQueryListener, NatsQueryListenerConfig};
use crate::query_handler::QueryHandler;
use crate::service::AlertQueryService;

/// Alert Archive Read Provider
#[derive(Clone)]
pub struct AlertArchiveReadProvider {
    store: Arc<dyn AlertStore>,
    queries: Arc<QueryHandler>,
    nats_config: NatsQueryListenerConfig,
    shutdown: CancellationToken,
}

impl AlertArchiveReadProvider {
    /// Create a new provider with configuration from wasmCloud HostData.
    #[instrument(skip(config))]
    pub fn with_config(config: HashMap<String, String>) -> Result<Self> {
        info!("Creating Alert Archive Read Provider with config from HostData");

        let archive_config = if !config.is_empty() {
            ArchiveConfig::from_properties(&config)?
        } else {
            ArchiveConfig::from_env()?
        };

        let nats_config = if !config.is_empty() {
            NatsQueryListenerConfig::from_properties(&config)
        } else {
            NatsQueryListenerConfig::from_env()
        };

        let store: Arc<dyn AlertStore> = Arc::new(HbaseRestStore::new(
            &archive_config.hbase_rest_url,
            &archive_config.schema_row_key,
            archive_config.request_timeout(),
        )?);

        Ok(Self::with_store(store, archive_config, nats_config))
    }

    /// Build the provider over an existing store handle
    pub fn with_store(
        store: Arc<dyn AlertStore>,
        archive_config: ArchiveConfig,
        nats_config: NatsQueryListenerConfig,
    ) -> Self {
        info!(
            "Alert archive instance {} reading {}",
            archive_config.instance_id, archive_config.hbase_rest_url
        );
        let timeout = archive_config.request_timeout();
        let service = Arc::new(AlertQueryService::new(Arc::clone(&store), archive_config));

        Self {
            store,
            queries: Arc::new(QueryHandler::new(service, timeout)),
            nats_config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a new Alert Archive Read Provider
    #[instrument]
    pub fn new() -> Result<Self> {
        Self::with_config(HashMap::new())
    }

    /// Start the provider
    #[instrument(skip(self))]
    pub async fn start(self: Arc<Self>) -> Result<()> {
        info!("Starting Alert Archive Read Provider");

        // Warm the objects schema so the first query does not pay for it
        let service = self.queries.service();
        let objects = service.config().tables.objects.clone();
        match service.schema(&objects).await {
            Ok(schema) => info!("Alert store reachable, {} has {} columns", objects, schema.len()),
            Err(e) => warn!("Could not load schema of {}: {}", objects, e),
        }

        let listener = NatsQueryListener::new(
            self.nats_config.clone(),
            Arc::clone(&self.queries),
            self.shutdown.clone(),
        );

        // This blocks until the NATS connection is lost or close() is called
        listener.start().await?;

        info!("Alert Archive Read Provider stopped");
        Ok(())
    }

    /// Cancel in-flight queries and release the store
    pub async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        self.store.close().await?;
        Ok(())
    }

    pub fn service(&self) -> &Arc<AlertQueryService> {
        self.queries.service()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Default for AlertArchiveReadProvider {
    fn default() -> Self {
        Self::new().expect("Failed to create default AlertArchiveReadProvider")
    }
}

impl Provider for AlertArchiveReadProvider {}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_archive_common::MemoryStore;
    use wasmcloud_provider_sdk::Provider;

    #[test]
    fn test_provider_traits() {
        fn assert_provider<T: Provider + Clone>() {}
        assert_provider::<AlertArchiveReadProvider>();
    }

    #[tokio::test]
    async fn test_close_cancels_and_closes_store() {
        let store = Arc::new(MemoryStore::new());
        let provider = AlertArchiveReadProvider::with_store(
            store.clone(),
            ArchiveConfig::default(),
            NatsQueryListenerConfig::default(),
        );
        let clone = provider.clone();

        provider.close().await.unwrap();
        assert!(clone.is_shutting_down());
        assert!(store.is_closed());
    }

    #[test]
    fn test_with_config_rejects_bad_url() {
        let props: HashMap<String, String> =
            [("archive_hbase_rest_url".to_string(), "not a url".to_string())]
                .into_iter()
                .collect();
        assert!(AlertArchiveReadProvider::with_config(props).is_err());
    }
}
