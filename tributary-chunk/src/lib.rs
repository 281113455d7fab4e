//! Tributary Chunk - append-only compressed buffers of log entries.
//!
//! A chunk holds the entries of one stream for a bounded time span and size.
//! Streams only ever talk to the [`Chunk`] trait; the concrete variant is
//! chosen by a [`ChunkFactory`] when the stream opens a new chunk.
//!
//! # Design
//!
//! [`MemChunk`] keeps an uncompressed head block. Once the head reaches the
//! configured block size it is encoded, checksummed, compressed and sealed
//! into an immutable block. A chunk is "full" either when its compressed size
//! approaches the target size or, without a target, when it holds the
//! maximum number of blocks.
//!
//! # Lifecycle
//!
//! `Empty -> Active -> Closed`. A closed chunk rejects appends and never
//! reopens.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod chunk;
mod encoding;
mod error;
mod memchunk;

pub use chunk::{mem_chunk_factory, Chunk, ChunkFactory};
pub use encoding::Encoding;
pub use error::{ChunkError, ChunkResult};
pub use memchunk::{MemChunk, MemChunkConfig};
