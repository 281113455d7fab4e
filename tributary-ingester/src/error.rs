//! Ingester error types.

use thiserror::Error;
use tributary_chunk::ChunkError;
use tributary_core::{TenantId, Timestamp};

/// Result type for ingester operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors returned synchronously from pushes and stream resolution.
///
/// A push that fails may still have applied other groups of the same batch;
/// nothing is rolled back and nothing is retried internally.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Creating a new stream would exceed the tenant's per-replica share.
    #[error("tenant {tenant} has {streams} streams, limit is {limit}")]
    StreamLimitExceeded {
        /// The tenant that hit the limit.
        tenant: TenantId,
        /// Streams the tenant currently holds on this ingester.
        streams: usize,
        /// Effective per-replica limit.
        limit: u32,
    },

    /// The chunk rejected an entry.
    #[error("append to stream {labels} failed: {source}")]
    ChunkAppend {
        /// Canonical labels of the stream.
        labels: String,
        /// The chunk error.
        #[source]
        source: ChunkError,
    },

    /// A sealed chunk could not be read back.
    #[error("read from stream {labels} failed: {source}")]
    ChunkRead {
        /// Canonical labels of the stream.
        labels: String,
        /// The chunk error.
        #[source]
        source: ChunkError,
    },

    /// The label string was malformed or violates the tenant's label limits.
    #[error("invalid label set: {source}")]
    InvalidLabelSet {
        /// The parse or validation error.
        #[from]
        source: tributary_core::Error,
    },

    /// An entry is older than the newest entry already accepted for the stream.
    #[error("entry at {timestamp:?} for stream {labels} is older than {highest:?}")]
    OutOfOrder {
        /// Canonical labels of the stream.
        labels: String,
        /// Timestamp of the rejected entry.
        timestamp: Timestamp,
        /// Highest timestamp already accepted.
        highest: Timestamp,
    },

    /// The push was cancelled before (or between) stream appends.
    #[error("push cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("invalid config: {message}")]
    InvalidConfig {
        /// Configuration error description.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestError::StreamLimitExceeded {
            tenant: TenantId::new("team-a"),
            streams: 1000,
            limit: 1000,
        };
        assert_eq!(
            err.to_string(),
            "tenant team-a has 1000 streams, limit is 1000"
        );

        let err = IngestError::ChunkAppend {
            labels: "{app=\"x\"}".to_string(),
            source: ChunkError::Closed,
        };
        assert!(err.to_string().contains("chunk is closed"));
    }

    #[test]
    fn test_invalid_labels_converts() {
        let core_err = tributary_core::parse_labels("{oops").unwrap_err();
        let err: IngestError = core_err.clone().into();
        assert_eq!(err, IngestError::InvalidLabelSet { source: core_err });
    }
}
