//! Tributary Ingester - the multi-tenant write path.
//!
//! An [`Ingester`] owns one [`Instance`] per tenant. Each instance maps
//! label sets to [`Stream`]s through a fingerprint-indexed table that
//! tolerates hash collisions, and enforces the tenant's stream limit via the
//! shared [`Limiter`]. Each stream appends entries to its active chunk and
//! cuts it when full or when the sync period elapses.
//!
//! # Locking
//!
//! - Registry: `RwLock` over the tenant map
//! - Instance: `Mutex` over the stream table, held for lookup and insert only
//! - Stream: `Mutex` over its chunks, held for the duration of one append batch
//!
//! No lock is ever held across two streams.
//!
//! # Example
//!
//! ```ignore
//! let ingester = Ingester::new(config, limits, ring)?;
//! ingester.push(&cancel, &tenant, &request).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod ingester;
mod instance;
mod limiter;
mod stream;

pub use config::{IngesterConfig, OutOfOrderPolicy};
pub use error::{IngestError, IngestResult};
pub use ingester::Ingester;
pub use instance::{FlushCandidate, Instance};
pub use limiter::{Limiter, LimitsSource, Overrides, ReplicaCount, StaticReplicaCount};
pub use stream::{ChunkSummary, ClosedChunk, CutPolicy, CutReason, Stream, StreamStats};
