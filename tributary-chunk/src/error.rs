//! Chunk error types.

use thiserror::Error;

use crate::encoding::Encoding;

/// Result type for chunk operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Chunk operation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// The chunk is closed and immutable.
    #[error("chunk is closed")]
    Closed,

    /// A line exceeds the per-line size bound.
    #[error("line too long: {size} > {max} bytes")]
    LineTooLong {
        /// Actual size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Data corruption detected while decoding a block.
    #[error("data corruption: {message}")]
    Corruption {
        /// Description of corruption.
        message: String,
    },

    /// The block codec failed.
    #[error("{encoding:?} codec failed: {message}")]
    Codec {
        /// The encoding in use.
        encoding: Encoding,
        /// Codec error description.
        message: String,
    },

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
        let err = ChunkError::LineTooLong {
            size: 4096,
            max: 1024,
        };
        assert_eq!(format!("{err}"), "line too long: 4096 > 1024 bytes");

        let err = ChunkError::Codec {
            encoding: Encoding::Zstd,
            message: "boom".to_string(),
        };
        assert!(format!("{err}").contains("Zstd"));
    }
}
