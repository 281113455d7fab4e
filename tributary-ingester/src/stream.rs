//! A single log stream and its chunk-cut policy.
//!
//! A stream owns an ordered list of chunks: zero or more closed chunks
//! waiting for the flush path, and at most one active chunk receiving
//! appends. All chunk state sits behind one per-stream lock so appends to
//! different streams never contend.
//!
//! # Cutting
//!
//! Before each append the active chunk is checked against the [`CutPolicy`]:
//! an entry at least `sync_period` past the first entry of the chunk cuts it
//! (**Synced**) once the chunk has reached `min_utilization`. Replicas that
//! receive the same entries therefore cut at the same boundaries.
//!
//! After each append a chunk that reached its capacity is cut regardless of
//! time (**Full**). A full chunk is at utilization 1, so every closed chunk
//! either spans less than `sync_period` or reached `min_utilization`.
//!
//! An empty chunk is never cut, so an entry that alone exceeds the capacity
//! still lands somewhere.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use tributary_chunk::{Chunk, ChunkFactory};
use tributary_core::{Canonical, Entry, Fingerprint, LabelSet, StreamId, TenantId, Timestamp};

use crate::config::OutOfOrderPolicy;
use crate::error::{IngestError, IngestResult};

// -----------------------------------------------------------------------------
// Cut policy
// -----------------------------------------------------------------------------

/// When an active chunk is closed in favor of a fresh one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPolicy {
    /// Span of entry time after which the chunk is cut. Zero disables.
    pub sync_period: Duration,
    /// Utilization the chunk must reach before a time-based cut.
    pub min_utilization: f64,
}

impl CutPolicy {
    /// A policy that only cuts full chunks.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            sync_period: Duration::ZERO,
            min_utilization: 0.0,
        }
    }

    /// Decides whether `chunk`, whose first entry is at `last_cut`, must be
    /// cut before `next` is appended.
    #[must_use]
    pub fn should_cut(
        &self,
        chunk: &dyn Chunk,
        last_cut: Timestamp,
        next: &Entry,
    ) -> Option<CutReason> {
        if chunk.is_empty() {
            return None;
        }
        if chunk.is_full() {
            return Some(CutReason::Full);
        }
        if !self.sync_period.is_zero()
            && next.timestamp.duration_since(last_cut) >= self.sync_period
            && chunk.utilization() >= self.min_utilization
        {
            return Some(CutReason::Synced);
        }
        None
    }
}

impl Default for CutPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Why a chunk was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutReason {
    /// The sync period elapsed with enough utilization.
    Synced,
    /// The chunk reached its capacity.
    Full,
    /// Closed on request, e.g. at shutdown.
    Forced,
}

// -----------------------------------------------------------------------------
// Chunk views
// -----------------------------------------------------------------------------

/// A closed, immutable chunk waiting to be flushed.
#[derive(Debug, Clone)]
pub struct ClosedChunk {
    /// Per-stream sequence number; increases with every chunk opened.
    pub seq: u64,
    /// Why the chunk was cut.
    pub reason: CutReason,
    /// Utilization at the moment of the cut.
    pub utilization: f64,
    /// Timestamp bounds of the entries.
    pub bounds: Option<(Timestamp, Timestamp)>,
    /// The chunk itself.
    pub chunk: Arc<dyn Chunk>,
}

impl ClosedChunk {
    /// Returns `max - min` of the entry timestamps.
    #[must_use]
    pub fn span(&self) -> Duration {
        self.bounds
            .map_or(Duration::ZERO, |(min, max)| max.duration_since(min))
    }
}

/// Snapshot of one chunk of a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSummary {
    /// Per-stream sequence number.
    pub seq: u64,
    /// `None` for the active chunk.
    pub reason: Option<CutReason>,
    /// Entries in the chunk.
    pub entries: u64,
    /// Timestamp bounds.
    pub bounds: Option<(Timestamp, Timestamp)>,
    /// Utilization (at cut time for closed chunks).
    pub utilization: f64,
    /// Compressed size in bytes.
    pub compressed_size: usize,
}

/// Counters for one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Entries accepted since the stream was created.
    pub entries_appended: u64,
    /// Closed chunks still held.
    pub closed_chunks: usize,
    /// Entries in the active chunk.
    pub active_entries: u64,
    /// Highest entry timestamp accepted.
    pub highest_seen: Option<Timestamp>,
}

// -----------------------------------------------------------------------------
// Stream
// -----------------------------------------------------------------------------

struct ActiveChunk {
    seq: u64,
    chunk: Box<dyn Chunk>,
    /// Timestamp of the first entry appended to this chunk.
    last_cut: Option<Timestamp>,
}

#[derive(Default)]
struct StreamState {
    active: Option<ActiveChunk>,
    closed: Vec<ClosedChunk>,
    next_seq: u64,
    highest_seen: Option<Timestamp>,
    entries_appended: u64,
}

impl StreamState {
    fn active_mut(&mut self, factory: &ChunkFactory) -> &mut ActiveChunk {
        let next_seq = &mut self.next_seq;
        self.active.get_or_insert_with(|| {
            let seq = *next_seq;
            *next_seq += 1;
            ActiveChunk {
                seq,
                chunk: factory(),
                last_cut: None,
            }
        })
    }
}

/// A tenant's stream: one canonical label set and its chunks.
pub struct Stream {
    id: StreamId,
    tenant: TenantId,
    labels: LabelSet,
    rendered: String,
    fingerprint: Fingerprint,
    factory: ChunkFactory,
    out_of_order: OutOfOrderPolicy,
    state: Mutex<StreamState>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("tenant", &self.tenant)
            .field("labels", &self.rendered)
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

impl Stream {
    /// Creates an empty stream. No chunk is opened until the first append.
    #[must_use]
    pub fn new(
        id: StreamId,
        tenant: TenantId,
        canonical: Canonical,
        factory: ChunkFactory,
        out_of_order: OutOfOrderPolicy,
    ) -> Self {
        let rendered = canonical.labels.to_string();
        Self {
            id,
            tenant,
            labels: canonical.labels,
            rendered,
            fingerprint: canonical.fingerprint,
            factory,
            out_of_order,
            state: Mutex::new(StreamState::default()),
        }
    }

    /// Returns the instance-local stream ID.
    #[must_use]
    pub const fn id(&self) -> StreamId {
        self.id
    }

    /// Returns the owning tenant.
    #[must_use]
    pub const fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Returns the canonical label set.
    #[must_use]
    pub const fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Returns the fingerprint of the label set.
    #[must_use]
    pub const fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Appends `entries` in order, cutting chunks as `policy` dictates.
    ///
    /// A rejected entry does not stop the batch. Returns the number of
    /// entries appended, or the first error once the whole batch has been
    /// processed; entries accepted before and after it stay appended.
    ///
    /// # Errors
    /// Returns `OutOfOrder` or `ChunkAppend` for the first rejected entry.
    pub async fn push(&self, entries: &[Entry], policy: &CutPolicy) -> IngestResult<usize> {
        let mut state = self.state.lock().await;
        let mut appended = 0usize;
        let mut first_error = None;

        for entry in entries {
            match self.append(&mut state, entry, policy) {
                Ok(()) => appended += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        state.entries_appended += appended as u64;

        first_error.map_or(Ok(appended), Err)
    }

    fn append(
        &self,
        state: &mut StreamState,
        entry: &Entry,
        policy: &CutPolicy,
    ) -> IngestResult<()> {
        if self.out_of_order == OutOfOrderPolicy::Reject {
            if let Some(highest) = state.highest_seen {
                if entry.timestamp < highest {
                    return Err(IngestError::OutOfOrder {
                        labels: self.rendered.clone(),
                        timestamp: entry.timestamp,
                        highest,
                    });
                }
            }
        }

        let reason = state.active.as_ref().and_then(|active| {
            active
                .last_cut
                .and_then(|last_cut| policy.should_cut(active.chunk.as_ref(), last_cut, entry))
        });
        if let Some(reason) = reason {
            self.cut(state, reason);
        }

        let active = state.active_mut(&self.factory);
        active
            .chunk
            .append(entry)
            .map_err(|source| IngestError::ChunkAppend {
                labels: self.rendered.clone(),
                source,
            })?;
        if active.last_cut.is_none() {
            active.last_cut = Some(entry.timestamp);
        }
        let full = active.chunk.is_full();

        state.highest_seen = Some(
            state
                .highest_seen
                .map_or(entry.timestamp, |h| h.max(entry.timestamp)),
        );
        if full {
            self.cut(state, CutReason::Full);
        }
        Ok(())
    }

    /// Closes the active chunk and queues it for flushing.
    ///
    /// Returns the sequence number of the closed chunk. An empty active
    /// chunk is discarded instead.
    fn cut(&self, state: &mut StreamState, reason: CutReason) -> Option<u64> {
        let mut active = state.active.take()?;
        if active.chunk.is_empty() {
            return None;
        }

        let utilization = active.chunk.utilization();
        if let Err(e) = active.chunk.close() {
            warn!(
                tenant = %self.tenant,
                stream = %self.id,
                error = %e,
                "Failed to seal final block, keeping entries unsealed"
            );
        }
        let bounds = active.chunk.bounds();

        debug!(
            tenant = %self.tenant,
            stream = %self.id,
            fingerprint = %self.fingerprint,
            seq = active.seq,
            ?reason,
            utilization,
            entries = active.chunk.entry_count(),
            "Cut chunk"
        );

        state.closed.push(ClosedChunk {
            seq: active.seq,
            reason,
            utilization,
            bounds,
            chunk: Arc::from(active.chunk),
        });
        Some(active.seq)
    }

    /// Closes the active chunk, if it holds any entries.
    pub async fn cut_active(&self, reason: CutReason) -> Option<u64> {
        let mut state = self.state.lock().await;
        self.cut(&mut state, reason)
    }

    /// Returns the closed chunks not yet released, oldest first.
    pub async fn closed_chunks(&self) -> Vec<ClosedChunk> {
        self.state.lock().await.closed.clone()
    }

    /// Drops closed chunks with `seq <= through_seq`, returning how many.
    pub async fn release_closed(&self, through_seq: u64) -> usize {
        let mut state = self.state.lock().await;
        let before = state.closed.len();
        state.closed.retain(|c| c.seq > through_seq);
        before - state.closed.len()
    }

    /// Summarizes every chunk, closed ones first.
    pub async fn chunks(&self) -> Vec<ChunkSummary> {
        let state = self.state.lock().await;
        let mut summaries: Vec<ChunkSummary> = state
            .closed
            .iter()
            .map(|c| ChunkSummary {
                seq: c.seq,
                reason: Some(c.reason),
                entries: c.chunk.entry_count(),
                bounds: c.bounds,
                utilization: c.utilization,
                compressed_size: c.chunk.compressed_size(),
            })
            .collect();
        if let Some(active) = &state.active {
            summaries.push(ChunkSummary {
                seq: active.seq,
                reason: None,
                entries: active.chunk.entry_count(),
                bounds: active.chunk.bounds(),
                utilization: active.chunk.utilization(),
                compressed_size: active.chunk.compressed_size(),
            });
        }
        summaries
    }

    /// Returns every held entry in chunk order.
    ///
    /// # Errors
    /// Returns `ChunkRead` if a sealed block cannot be decoded.
    pub async fn entries(&self) -> IngestResult<Vec<Entry>> {
        let state = self.state.lock().await;
        let read_error = |source| IngestError::ChunkRead {
            labels: self.rendered.clone(),
            source,
        };

        let mut entries = Vec::new();
        for closed in &state.closed {
            entries.extend(closed.chunk.entries().map_err(&read_error)?);
        }
        if let Some(active) = &state.active {
            entries.extend(active.chunk.entries().map_err(&read_error)?);
        }
        Ok(entries)
    }

    /// Returns the stream counters.
    pub async fn stats(&self) -> StreamStats {
        let state = self.state.lock().await;
        StreamStats {
            entries_appended: state.entries_appended,
            closed_chunks: state.closed.len(),
            active_entries: state.active.as_ref().map_or(0, |a| a.chunk.entry_count()),
            highest_seen: state.highest_seen,
        }
    }
}
