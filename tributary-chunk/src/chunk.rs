//! The chunk capability and its factory.

use std::fmt;
use std::sync::Arc;

use tributary_core::{Entry, Timestamp};

use crate::encoding::Encoding;
use crate::error::ChunkResult;
use crate::memchunk::{MemChunk, MemChunkConfig};

/// An append-only, eventually immutable buffer of timestamped lines.
///
/// A chunk is owned by exactly one stream while open. Once closed it is
/// immutable and may be shared read-only with the flush path.
pub trait Chunk: Send + Sync + fmt::Debug {
    /// Returns the block encoding of this chunk.
    fn encoding(&self) -> Encoding;

    /// Returns true once the chunk takes no further entries: it is closed or
    /// has reached its hard capacity.
    ///
    /// A full chunk reports a utilization of 1. An empty open chunk is never
    /// full, so a single oversized entry still lands in a chunk.
    fn is_full(&self) -> bool;

    /// Appends an entry.
    ///
    /// A failed append leaves the chunk as it was.
    ///
    /// # Errors
    /// Returns an error if the chunk is closed or the entry is rejected.
    fn append(&mut self, entry: &Entry) -> ChunkResult<()>;

    /// Returns the minimum and maximum entry timestamps, `None` while empty.
    fn bounds(&self) -> Option<(Timestamp, Timestamp)>;

    /// Returns how full the chunk is relative to its target size, in `[0, 1]`.
    fn utilization(&self) -> f64;

    /// Closes the chunk. Idempotent.
    ///
    /// The chunk is closed even when an error is returned; entries that could
    /// not be sealed into a block stay readable.
    ///
    /// # Errors
    /// Returns an error if sealing the final block fails.
    fn close(&mut self) -> ChunkResult<()>;

    /// Returns true once the chunk has been closed.
    fn is_closed(&self) -> bool;

    /// Returns the number of entries appended.
    fn entry_count(&self) -> u64;

    /// Returns true if no entries have been appended.
    fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Returns the size of sealed blocks plus the open head block, in bytes.
    fn compressed_size(&self) -> usize;

    /// Returns the size of all entries before compression, in bytes.
    fn uncompressed_size(&self) -> usize;

    /// Decodes every entry in append order.
    ///
    /// # Errors
    /// Returns an error if a sealed block is corrupt.
    fn entries(&self) -> ChunkResult<Vec<Entry>>;
}

/// Builds a fresh chunk each time a stream cuts.
pub type ChunkFactory = Arc<dyn Fn() -> Box<dyn Chunk> + Send + Sync>;

/// Returns a factory producing [`MemChunk`]s with the given configuration.
#[must_use]
pub fn mem_chunk_factory(config: MemChunkConfig) -> ChunkFactory {
    Arc::new(move || Box::new(MemChunk::new(config)) as Box<dyn Chunk>)
}
