//! The ingester: the process-wide tenant registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tributary_chunk::{mem_chunk_factory, ChunkFactory};
use tributary_core::{PushRequest, TenantId};

use crate::config::IngesterConfig;
use crate::error::{IngestError, IngestResult};
use crate::instance::{FlushCandidate, Instance};
use crate::limiter::{Limiter, LimitsSource, ReplicaCount};
use crate::stream::{CutReason, Stream};

/// Owns one [`Instance`] per tenant.
///
/// Instances are created on a tenant's first push and live until
/// [`Ingester::evict_instance`]. Share the ingester by `Arc`.
pub struct Ingester {
    config: IngesterConfig,
    limiter: Limiter,
    factory: ChunkFactory,
    instances: RwLock<HashMap<TenantId, Arc<Instance>>>,
}

impl std::fmt::Debug for Ingester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingester")
            .field("config", &self.config)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl Ingester {
    /// Creates an ingester that builds [`MemChunk`](tributary_chunk::MemChunk)s
    /// from `config.chunk`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the configuration is invalid.
    pub fn new(
        config: IngesterConfig,
        limits: Arc<dyn LimitsSource>,
        ring: Arc<dyn ReplicaCount>,
    ) -> IngestResult<Self> {
        config.validate()?;

        let limiter = Limiter::new(limits, ring, config.replication_factor);
        info!(
            sync_period = ?config.sync_period,
            sync_min_utilization = config.sync_min_utilization,
            encoding = ?config.chunk.encoding,
            replication_factor = config.replication_factor,
            "Created ingester"
        );
        Ok(Self {
            factory: mem_chunk_factory(config.chunk),
            config,
            limiter,
            instances: RwLock::new(HashMap::new()),
        })
    }

    /// Replaces the chunk factory used for instances created from now on.
    #[must_use]
    pub fn with_chunk_factory(mut self, factory: ChunkFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &IngesterConfig {
        &self.config
    }

    /// Returns the stream limiter.
    #[must_use]
    pub const fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    /// Returns the instance of `tenant`, if it exists.
    pub async fn instance(&self, tenant: &TenantId) -> Option<Arc<Instance>> {
        self.instances.read().await.get(tenant).cloned()
    }

    /// Returns the instance of `tenant`, creating it on first contact.
    pub async fn get_or_create_instance(&self, tenant: &TenantId) -> Arc<Instance> {
        if let Some(instance) = self.instance(tenant).await {
            return instance;
        }

        let mut instances = self.instances.write().await;
        instances
            .entry(tenant.clone())
            .or_insert_with(|| {
                info!(tenant = %tenant, "Created tenant instance");
                Arc::new(Instance::new(
                    tenant.clone(),
                    self.config.clone(),
                    self.limiter.clone(),
                    self.factory.clone(),
                ))
            })
            .clone()
    }

    /// Removes the instance of `tenant`, returning it.
    ///
    /// Callers still holding the instance or its streams keep them alive;
    /// the next push for the tenant starts from an empty instance.
    pub async fn evict_instance(&self, tenant: &TenantId) -> Option<Arc<Instance>> {
        let removed = self.instances.write().await.remove(tenant);
        if removed.is_some() {
            info!(tenant = %tenant, "Evicted tenant instance");
        }
        removed
    }

    /// Returns the tenants with a live instance, sorted.
    pub async fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<_> = self.instances.read().await.keys().cloned().collect();
        tenants.sort();
        tenants
    }

    /// Pushes a batch for `tenant`. See [`Instance::push`].
    ///
    /// # Errors
    /// Returns `Cancelled` if `cancel` fired before any work, otherwise the
    /// first error of the batch.
    pub async fn push(
        &self,
        cancel: &CancellationToken,
        tenant: &TenantId,
        request: &PushRequest,
    ) -> IngestResult<()> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        self.get_or_create_instance(tenant)
            .await
            .push(cancel, request)
            .await
    }

    /// Resolves a stream of `tenant`, creating tenant and stream as needed.
    ///
    /// # Errors
    /// See [`Instance::get_or_create_stream`].
    pub async fn get_or_create_stream(
        &self,
        tenant: &TenantId,
        labels: &str,
    ) -> IngestResult<Arc<Stream>> {
        self.get_or_create_instance(tenant)
            .await
            .get_or_create_stream(labels)
            .await
    }

    async fn snapshot(&self) -> Vec<Arc<Instance>> {
        let mut instances: Vec<_> = self.instances.read().await.values().cloned().collect();
        instances.sort_by(|a, b| a.tenant().cmp(b.tenant()));
        instances
    }

    /// Returns every closed chunk across all tenants.
    pub async fn collect_closed_chunks(&self) -> Vec<FlushCandidate> {
        let mut candidates = Vec::new();
        for instance in self.snapshot().await {
            candidates.extend(instance.collect_closed_chunks().await);
        }
        candidates
    }

    /// Force-cuts every active chunk so the flush path can drain them.
    ///
    /// Returns the number of chunks closed.
    pub async fn shutdown(&self) -> usize {
        let mut cut = 0;
        for instance in self.snapshot().await {
            cut += instance.cut_all(CutReason::Forced).await;
        }
        info!(chunks = cut, "Ingester shut down");
        cut
    }
}
