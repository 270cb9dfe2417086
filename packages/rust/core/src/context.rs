//! Backends and settings shared by every service handler.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info};

use refinery_shared::{
    AppConfig, ObjectsBackend, PubSubBackend, RefineryError, Result, RetryPolicy,
    WarehouseBackend,
};
use refinery_storage::{
    BigQueryWarehouse, GcsObjectStore, LocalObjectStore, LocalWarehouse, MemoryPublisher,
    ObjectStore, PubSubPublisher, Publisher, TokenSource, Warehouse,
};

/// Base of the `2^n`-second backoff between insert attempts.
const INSERT_BACKOFF_BASE: Duration = Duration::from_secs(1);

pub struct ServiceContext {
    pub config: AppConfig,
    pub http: Client,
    pub tokens: Arc<TokenSource>,
    pub warehouse: Arc<dyn Warehouse>,
    pub objects: Arc<dyn ObjectStore>,
    pub publisher: Arc<dyn Publisher>,
}

impl ServiceContext {
    pub fn new(
        config: AppConfig,
        http: Client,
        tokens: Arc<TokenSource>,
        warehouse: Arc<dyn Warehouse>,
        objects: Arc<dyn ObjectStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config,
            http,
            tokens,
            warehouse,
            objects,
            publisher,
        }
    }

    /// Build the backends named in `[warehouse]`, `[objects]` and `[pubsub]`.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let http = build_client()?;
        let tokens = Arc::new(TokenSource::from_config(&config.gcp, http.clone()));

        let warehouse: Arc<dyn Warehouse> = match config.warehouse.backend {
            WarehouseBackend::BigQuery => Arc::new(BigQueryWarehouse::new(
                http.clone(),
                &config.warehouse.endpoint,
                &config.gcp.project_id,
                &config.warehouse.dataset,
                tokens.clone(),
            )),
            WarehouseBackend::Local => {
                Arc::new(LocalWarehouse::open(Path::new(&config.warehouse.local_path)).await?)
            }
        };

        let objects: Arc<dyn ObjectStore> = match config.objects.backend {
            ObjectsBackend::Gcs => Arc::new(GcsObjectStore::new(
                http.clone(),
                &config.objects.endpoint,
                tokens.clone(),
            )),
            ObjectsBackend::Local => Arc::new(LocalObjectStore::new(&config.objects.local_root)),
        };

        let publisher: Arc<dyn Publisher> = match config.pubsub.backend {
            PubSubBackend::PubSub => Arc::new(PubSubPublisher::new(
                http.clone(),
                &config.pubsub.endpoint,
                &config.gcp.project_id,
                tokens.clone(),
            )),
            PubSubBackend::Memory => Arc::new(MemoryPublisher::new()),
        };

        info!(
            warehouse = ?config.warehouse.backend,
            objects = ?config.objects.backend,
            pubsub = ?config.pubsub.backend,
            "service context ready"
        );

        Ok(Self::new(config, http, tokens, warehouse, objects, publisher))
    }

    /// Local warehouse, local object store, and an in-memory publisher whose
    /// messages the caller can inspect afterwards.
    pub async fn dry_run(config: AppConfig) -> Result<(Self, Arc<MemoryPublisher>)> {
        let http = build_client()?;
        let tokens = Arc::new(TokenSource::from_config(&config.gcp, http.clone()));
        let warehouse = Arc::new(LocalWarehouse::open(Path::new(&config.warehouse.local_path)).await?);
        let objects = Arc::new(LocalObjectStore::new(&config.objects.local_root));
        let publisher = Arc::new(MemoryPublisher::new());

        debug!(
            warehouse = %config.warehouse.local_path,
            objects = %config.objects.local_root,
            "dry run backends"
        );

        let ctx = Self::new(config, http, tokens, warehouse, objects, publisher.clone());
        Ok((ctx, publisher))
    }

    /// Attempts and pause for external API calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.config.retry)
    }

    /// Attempts and backoff for analytics-store inserts.
    pub fn insert_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.config.retry.max_retries.max(1), INSERT_BACKOFF_BASE)
    }
}

fn build_client() -> Result<Client> {
    Client::builder()
        .build()
        .map_err(|e| RefineryError::Network(format!("failed to build HTTP client: {e}")))
}
