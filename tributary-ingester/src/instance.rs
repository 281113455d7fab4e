//! Per-tenant stream table.
//!
//! Streams are indexed by fingerprint. Because distinct label sets can share
//! a fingerprint, each fingerprint maps to a bucket of streams and lookups
//! compare the full canonical label set. The table lock covers only lookup
//! and insertion; appends happen under each stream's own lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tributary_chunk::ChunkFactory;
use tributary_core::{parse_canonical, Canonical, Fingerprint, PushRequest, StreamId, TenantId};

use crate::config::IngesterConfig;
use crate::error::{IngestError, IngestResult};
use crate::limiter::Limiter;
use crate::stream::{ClosedChunk, CutPolicy, CutReason, Stream};

/// A closed chunk together with the stream it belongs to.
#[derive(Debug, Clone)]
pub struct FlushCandidate {
    /// Owning tenant.
    pub tenant: TenantId,
    /// Owning stream.
    pub stream: Arc<Stream>,
    /// The closed chunk.
    pub chunk: ClosedChunk,
}

struct StreamTable {
    buckets: HashMap<Fingerprint, Vec<Arc<Stream>>>,
    count: usize,
    next_id: StreamId,
}

impl StreamTable {
    fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            count: 0,
            next_id: StreamId::new(1),
        }
    }

    fn find(&self, canonical: &Canonical) -> Option<Arc<Stream>> {
        self.buckets
            .get(&canonical.fingerprint)?
            .iter()
            .find(|s| s.labels() == &canonical.labels)
            .cloned()
    }
}

/// All streams of one tenant on this ingester.
pub struct Instance {
    tenant: TenantId,
    config: IngesterConfig,
    cut_policy: CutPolicy,
    limiter: Limiter,
    factory: ChunkFactory,
    table: Mutex<StreamTable>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("tenant", &self.tenant)
            .field("cut_policy", &self.cut_policy)
            .finish_non_exhaustive()
    }
}

impl Instance {
    /// Creates an empty instance for `tenant`.
    #[must_use]
    pub fn new(
        tenant: TenantId,
        config: IngesterConfig,
        limiter: Limiter,
        factory: ChunkFactory,
    ) -> Self {
        Self {
            tenant,
            cut_policy: config.cut_policy(),
            config,
            limiter,
            factory,
            table: Mutex::new(StreamTable::new()),
        }
    }

    /// Returns the tenant.
    #[must_use]
    pub const fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    fn canonicalize(&self, labels: &str) -> IngestResult<Canonical> {
        let canonical = parse_canonical(labels, self.config.fingerprint)?;
        self.limiter
            .tenant_limits(&self.tenant)
            .check_labels(&canonical.labels)?;
        Ok(canonical)
    }

    /// Resolves `labels` to a stream, creating it if needed.
    ///
    /// Creation is subject to the stream limit; resolving an existing
    /// stream never is. A new stream whose fingerprint collides with an
    /// existing one joins the same bucket.
    ///
    /// # Errors
    /// Returns `InvalidLabelSet` for malformed labels and
    /// `StreamLimitExceeded` when a new stream is not allowed.
    pub async fn get_or_create_stream(&self, labels: &str) -> IngestResult<Arc<Stream>> {
        let canonical = self.canonicalize(labels)?;
        let mut table = self.table.lock().await;

        if let Some(stream) = table.find(&canonical) {
            return Ok(stream);
        }

        if let Err(e) = self.limiter.assert_max_streams(&self.tenant, table.count) {
            warn!(tenant = %self.tenant, streams = table.count, "Stream limit reached");
            return Err(e);
        }

        let id = table.next_id;
        table.next_id = id.next();
        let fingerprint = canonical.fingerprint;
        let stream = Arc::new(Stream::new(
            id,
            self.tenant.clone(),
            canonical,
            self.factory.clone(),
            self.config.out_of_order,
        ));

        let bucket = table.buckets.entry(fingerprint).or_default();
        let collided = !bucket.is_empty();
        bucket.push(stream.clone());
        table.count += 1;

        debug!(
            tenant = %self.tenant,
            stream = %id,
            fingerprint = %fingerprint,
            collided,
            "Created stream"
        );
        Ok(stream)
    }

    /// Resolves `labels` to an existing stream without creating one.
    ///
    /// # Errors
    /// Returns `InvalidLabelSet` for malformed labels.
    pub async fn lookup(&self, labels: &str) -> IngestResult<Option<Arc<Stream>>> {
        let canonical = parse_canonical(labels, self.config.fingerprint)?;
        Ok(self.table.lock().await.find(&canonical))
    }

    /// Appends every group of `request` to its stream.
    ///
    /// A failing group does not stop later groups and nothing is rolled
    /// back. Cancellation is checked before the first group and between
    /// groups, never during a stream append.
    ///
    /// # Errors
    /// Returns the first error encountered, or `Cancelled`.
    pub async fn push(&self, cancel: &CancellationToken, request: &PushRequest) -> IngestResult<()> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        let mut first_error = None;
        for group in &request.streams {
            if cancel.is_cancelled() {
                first_error.get_or_insert(IngestError::Cancelled);
                break;
            }
            let result = match self.get_or_create_stream(&group.labels).await {
                Ok(stream) => stream.push(&group.entries, &self.cut_policy).await.map(|_| ()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                debug!(tenant = %self.tenant, labels = %group.labels, error = %e, "Push group failed");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Returns the number of live streams.
    pub async fn stream_count(&self) -> usize {
        self.table.lock().await.count
    }

    /// Returns a snapshot of all streams, ordered by ID.
    pub async fn streams(&self) -> Vec<Arc<Stream>> {
        let table = self.table.lock().await;
        let mut streams: Vec<_> = table.buckets.values().flatten().cloned().collect();
        streams.sort_by_key(|s| s.id());
        streams
    }

    /// Returns how many streams share `fingerprint`.
    pub async fn bucket_len(&self, fingerprint: Fingerprint) -> usize {
        self.table
            .lock()
            .await
            .buckets
            .get(&fingerprint)
            .map_or(0, Vec::len)
    }

    /// Removes `stream` from the table. Returns false if it was not present.
    ///
    /// Chunks still referenced by a caller stay alive until dropped.
    pub async fn remove_stream(&self, stream: &Stream) -> bool {
        let mut table = self.table.lock().await;
        let fingerprint = stream.fingerprint();
        let Some(bucket) = table.buckets.get_mut(&fingerprint) else {
            return false;
        };
        let Some(pos) = bucket
            .iter()
            .position(|s| std::ptr::eq(Arc::as_ptr(s), stream))
        else {
            return false;
        };

        bucket.remove(pos);
        if bucket.is_empty() {
            table.buckets.remove(&fingerprint);
        }
        table.count -= 1;

        debug!(tenant = %self.tenant, stream = %stream.id(), "Removed stream");
        true
    }

    /// Returns every closed chunk of every stream.
    pub async fn collect_closed_chunks(&self) -> Vec<FlushCandidate> {
        let mut candidates = Vec::new();
        for stream in self.streams().await {
            for chunk in stream.closed_chunks().await {
                candidates.push(FlushCandidate {
                    tenant: self.tenant.clone(),
                    stream: stream.clone(),
                    chunk,
                });
            }
        }
        candidates
    }

    /// Cuts the active chunk of every stream. Returns how many were closed.
    pub async fn cut_all(&self, reason: CutReason) -> usize {
        let mut cut = 0;
        for stream in self.streams().await {
            if stream.cut_active(reason).await.is_some() {
                cut += 1;
            }
        }
        cut
    }
}

#[cfg(test)]
mod tests {
    use tributary_chunk::{mem_chunk_factory, MemChunkConfig};
    use tributary_core::{Entry, StreamPush, TenantLimits, Timestamp};

    use super::*;
    use crate::limiter::{Overrides, StaticReplicaCount};

    fn instance(max_streams: u32) -> Instance {
        let limits = Overrides::new(TenantLimits::new().with_max_local_streams_per_user(max_streams));
        let limiter = Limiter::new(Arc::new(limits), Arc::new(StaticReplicaCount::new(1)), 1);
        Instance::new(
            TenantId::new("test"),
            IngesterConfig::default(),
            limiter,
            mem_chunk_factory(MemChunkConfig::default()),
        )
    }

    fn group(labels: &str, n: i64) -> StreamPush {
        let entries = (0..n)
            .map(|i| Entry::new(Timestamp::from_nanos(i), format!("line {i}")))
            .collect();
        StreamPush::new(labels, entries)
    }

    #[tokio::test]
    async fn test_label_order_resolves_same_stream() {
        let instance = instance(10);
        let a = instance
            .get_or_create_stream("{a=\"1\", b=\"2\"}")
            .await
            .unwrap();
        let b = instance
            .get_or_create_stream("{b=\"2\", a=\"1\"}")
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(instance.stream_count().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_labels_rejected() {
        let instance = instance(10);
        let err = instance.get_or_create_stream("{a=1}").await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidLabelSet { .. }));
        assert_eq!(instance.stream_count().await, 0);
    }

    #[tokio::test]
    async fn test_label_limits_enforced() {
        let limits = Overrides::new(TenantLimits {
            max_label_names_per_series: 1,
            ..TenantLimits::new()
        });
        let limiter = Limiter::new(Arc::new(limits), Arc::new(StaticReplicaCount::new(1)), 1);
        let instance = Instance::new(
            TenantId::new("test"),
            IngesterConfig::default(),
            limiter,
            mem_chunk_factory(MemChunkConfig::default()),
        );

        let err = instance
            .get_or_create_stream("{a=\"1\", b=\"2\"}")
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidLabelSet { .. }));
    }

    #[tokio::test]
    async fn test_limit_only_applies_to_new_streams() {
        let instance = instance(1);
        instance.get_or_create_stream("{a=\"1\"}").await.unwrap();

        let err = instance.get_or_create_stream("{a=\"2\"}").await.unwrap_err();
        assert!(matches!(err, IngestError::StreamLimitExceeded { limit: 1, .. }));
        assert!(instance.get_or_create_stream("{a=\"1\"}").await.is_ok());
    }

    #[tokio::test]
    async fn test_push_continues_after_failed_group() {
        let instance = instance(1);
        let request = PushRequest::new(vec![
            group("{a=\"1\"}", 2),
            group("{a=\"2\"}", 2),
            group("{a=\"1\"}", 3),
        ]);

        let err = instance
            .push(&CancellationToken::new(), &request)
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::StreamLimitExceeded { .. }));
        let stream = instance.lookup("{a=\"1\"}").await.unwrap().unwrap();
        assert_eq!(stream.stats().await.entries_appended, 5);
    }

    #[tokio::test]
    async fn test_cancelled_push_does_nothing() {
        let instance = instance(10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = instance
            .push(&cancel, &PushRequest::new(vec![group("{a=\"1\"}", 1)]))
            .await
            .unwrap_err();

        assert_eq!(err, IngestError::Cancelled);
        assert_eq!(instance.stream_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_stream() {
        let instance = instance(10);
        let stream = instance.get_or_create_stream("{a=\"1\"}").await.unwrap();

        assert!(instance.remove_stream(&stream).await);
        assert!(!instance.remove_stream(&stream).await);
        assert_eq!(instance.stream_count().await, 0);
        assert_eq!(instance.bucket_len(stream.fingerprint()).await, 0);
        assert!(instance.lookup("{a=\"1\"}").await.unwrap().is_none());

        // Recreated with a fresh ID.
        let again = instance.get_or_create_stream("{a=\"1\"}").await.unwrap();
        assert_ne!(again.id(), stream.id());
    }

    #[tokio::test]
    async fn test_collect_closed_chunks_after_cut_all() {
        let instance = instance(10);
        let request = PushRequest::new(vec![group("{a=\"1\"}", 3), group("{a=\"2\"}", 4)]);
        instance
            .push(&CancellationToken::new(), &request)
            .await
            .unwrap();

        assert!(instance.collect_closed_chunks().await.is_empty());
        assert_eq!(instance.cut_all(CutReason::Forced).await, 2);

        let candidates = instance.collect_closed_chunks().await;
        assert_eq!(candidates.len(), 2);
        let total: u64 = candidates.iter().map(|c| c.chunk.chunk.entry_count()).sum();
        assert_eq!(total, 7);
        assert!(candidates.iter().all(|c| c.tenant.as_str() == "test"));
    }
}
