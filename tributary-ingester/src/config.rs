//! Ingester configuration.

use std::time::Duration;

use tributary_chunk::MemChunkConfig;
use tributary_core::FingerprintAlgorithm;

use crate::error::{IngestError, IngestResult};
use crate::stream::CutPolicy;

/// What a stream does with an entry older than the newest one it accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutOfOrderPolicy {
    /// Append it anyway, in arrival order.
    #[default]
    Accept,
    /// Reject it with `OutOfOrder`; later entries of the batch still apply.
    Reject,
}

/// Configuration for an ingester and every tenant instance it creates.
#[derive(Debug, Clone, PartialEq)]
pub struct IngesterConfig {
    /// Span after which an active chunk is cut, measured in entry time.
    /// `Duration::ZERO` disables time-based cutting.
    pub sync_period: Duration,
    /// Minimum utilization a chunk must reach before a time-based cut.
    pub sync_min_utilization: f64,
    /// Chunk configuration for the default chunk factory.
    pub chunk: MemChunkConfig,
    /// Fingerprint algorithm for the stream table.
    pub fingerprint: FingerprintAlgorithm,
    /// Out-of-order entry handling.
    pub out_of_order: OutOfOrderPolicy,
    /// Number of replicas each stream is written to.
    pub replication_factor: u32,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            sync_period: Duration::ZERO,
            sync_min_utilization: 0.0,
            chunk: MemChunkConfig::default(),
            fingerprint: FingerprintAlgorithm::default(),
            out_of_order: OutOfOrderPolicy::default(),
            replication_factor: 1,
        }
    }
}

impl IngesterConfig {
    /// Sets the chunk sync period and the utilization required to honor it.
    #[must_use]
    pub const fn with_sync(mut self, period: Duration, min_utilization: f64) -> Self {
        self.sync_period = period;
        self.sync_min_utilization = min_utilization;
        self
    }

    /// Sets the chunk configuration.
    #[must_use]
    pub const fn with_chunk(mut self, chunk: MemChunkConfig) -> Self {
        self.chunk = chunk;
        self
    }

    /// Sets the fingerprint algorithm.
    #[must_use]
    pub const fn with_fingerprint(mut self, fingerprint: FingerprintAlgorithm) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Sets the out-of-order policy.
    #[must_use]
    pub const fn with_out_of_order(mut self, policy: OutOfOrderPolicy) -> Self {
        self.out_of_order = policy;
        self
    }

    /// Sets the replication factor.
    #[must_use]
    pub const fn with_replication_factor(mut self, replication_factor: u32) -> Self {
        self.replication_factor = replication_factor;
        self
    }

    /// Returns the chunk-cut policy derived from this configuration.
    #[must_use]
    pub const fn cut_policy(&self) -> CutPolicy {
        CutPolicy {
            sync_period: self.sync_period,
            min_utilization: self.sync_min_utilization,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfig` describing the first invalid setting.
    pub fn validate(&self) -> IngestResult<()> {
        if !(0.0..=1.0).contains(&self.sync_min_utilization) {
            return Err(IngestError::InvalidConfig {
                message: format!(
                    "sync_min_utilization must be within [0, 1], got {}",
                    self.sync_min_utilization
                ),
            });
        }
        if self.replication_factor == 0 {
            return Err(IngestError::InvalidConfig {
                message: "replication_factor must be positive".to_string(),
            });
        }
        self.chunk
            .validate()
            .map_err(|e| IngestError::InvalidConfig {
                message: e.to_string(),
            })
    }
}
