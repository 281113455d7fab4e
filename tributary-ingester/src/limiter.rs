//! Per-tenant stream limits scaled by replica share.
//!
//! A tenant's global stream budget is split across the healthy replicas of
//! the ring. Each ingester enforces only its local share:
//!
//! ```text
//! effective = ceil(max_local_streams_per_user * replication_factor / healthy_replicas)
//! ```
//!
//! clamped to `[1, max_local_streams_per_user]`. A configured maximum of `0`
//! disables the limit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tributary_core::{TenantId, TenantLimits};

use crate::error::{IngestError, IngestResult};

// -----------------------------------------------------------------------------
// Limit sources
// -----------------------------------------------------------------------------

/// Supplies per-tenant limits.
pub trait LimitsSource: Send + Sync {
    /// Returns the limits that apply to `tenant`.
    fn tenant_limits(&self, tenant: &TenantId) -> TenantLimits;

    /// Returns the configured (pre-replication) stream maximum for `tenant`.
    fn max_local_streams_per_user(&self, tenant: &TenantId) -> u32 {
        self.tenant_limits(tenant).max_local_streams_per_user
    }
}

/// Default limits with optional per-tenant overrides.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    defaults: TenantLimits,
    tenants: HashMap<TenantId, TenantLimits>,
}

impl Overrides {
    /// Creates a source that returns `defaults` for every tenant.
    #[must_use]
    pub fn new(defaults: TenantLimits) -> Self {
        Self {
            defaults,
            tenants: HashMap::new(),
        }
    }

    /// Overrides the limits of a single tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<TenantId>, limits: TenantLimits) -> Self {
        self.tenants.insert(tenant.into(), limits);
        self
    }

    /// Validates the defaults and every override.
    ///
    /// # Errors
    /// Returns the first invalid limit found.
    pub fn validate(&self) -> IngestResult<()> {
        self.defaults.validate()?;
        for limits in self.tenants.values() {
            limits.validate()?;
        }
        Ok(())
    }
}

impl LimitsSource for Overrides {
    fn tenant_limits(&self, tenant: &TenantId) -> TenantLimits {
        self.tenants
            .get(tenant)
            .copied()
            .unwrap_or(self.defaults)
    }
}

// -----------------------------------------------------------------------------
// Replica count
// -----------------------------------------------------------------------------

/// Reports how many ingester replicas are currently healthy.
pub trait ReplicaCount: Send + Sync {
    /// Returns the number of healthy replicas. `0` is treated as `1`.
    fn healthy_replica_count(&self) -> u32;
}

/// A replica count set by the caller.
#[derive(Debug)]
pub struct StaticReplicaCount(AtomicU32);

impl StaticReplicaCount {
    /// Creates a replica count.
    #[must_use]
    pub const fn new(count: u32) -> Self {
        Self(AtomicU32::new(count))
    }

    /// Updates the replica count, for example after a ring change.
    pub fn set(&self, count: u32) {
        self.0.store(count, Ordering::Relaxed);
    }
}

impl ReplicaCount for StaticReplicaCount {
    fn healthy_replica_count(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

// -----------------------------------------------------------------------------
// Limiter
// -----------------------------------------------------------------------------

/// Decides whether a tenant may create another stream on this ingester.
///
/// Shared by every tenant instance; holds no per-tenant state of its own.
#[derive(Clone)]
pub struct Limiter {
    limits: Arc<dyn LimitsSource>,
    ring: Arc<dyn ReplicaCount>,
    replication_factor: u32,
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("healthy_replicas", &self.ring.healthy_replica_count())
            .field("replication_factor", &self.replication_factor)
            .finish_non_exhaustive()
    }
}

impl Limiter {
    /// Creates a limiter.
    #[must_use]
    pub fn new(
        limits: Arc<dyn LimitsSource>,
        ring: Arc<dyn ReplicaCount>,
        replication_factor: u32,
    ) -> Self {
        Self {
            limits,
            ring,
            replication_factor,
        }
    }

    /// Returns the limits that apply to `tenant`.
    #[must_use]
    pub fn tenant_limits(&self, tenant: &TenantId) -> TenantLimits {
        self.limits.tenant_limits(tenant)
    }

    /// Returns the local stream limit for `tenant`, or `None` when unlimited.
    #[must_use]
    pub fn effective_limit(&self, tenant: &TenantId) -> Option<u32> {
        let max = self.limits.max_local_streams_per_user(tenant);
        if max == 0 {
            return None;
        }
        let replicas = u64::from(self.ring.healthy_replica_count().max(1));
        let scaled = (u64::from(max) * u64::from(self.replication_factor)).div_ceil(replicas);
        let clamped = scaled.clamp(1, u64::from(max));
        // Clamped to `max`, which is a u32.
        #[allow(clippy::cast_possible_truncation)]
        Some(clamped as u32)
    }

    /// Returns true if a tenant holding `current` streams may create one more.
    #[must_use]
    pub fn allows(&self, tenant: &TenantId, current: usize) -> bool {
        self.effective_limit(tenant)
            .map_or(true, |limit| current < limit as usize)
    }

    /// Fails with `StreamLimitExceeded` unless one more stream is allowed.
    ///
    /// # Errors
    /// Returns `StreamLimitExceeded` when `current` has reached the limit.
    pub fn assert_max_streams(&self, tenant: &TenantId, current: usize) -> IngestResult<()> {
        match self.effective_limit(tenant) {
            Some(limit) if current >= limit as usize => Err(IngestError::StreamLimitExceeded {
                tenant: tenant.clone(),
                streams: current,
                limit,
            }),
            _ => Ok(()),
        }
    }
}
