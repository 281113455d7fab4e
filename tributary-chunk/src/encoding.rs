//! Block compression codecs.

use bytes::Bytes;

use crate::error::{ChunkError, ChunkResult};

/// Zstd level used for sealed blocks.
const ZSTD_LEVEL: i32 = 3;

/// Compression codec for sealed chunk blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Encoding {
    /// No compression.
    None = 0,
    /// LZ4 block compression.
    #[default]
    Lz4 = 1,
    /// Zstd compression.
    Zstd = 2,
}

impl Encoding {
    /// Creates an encoding from a raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::None),
            1 => Some(Self::Lz4),
            2 => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Parses an encoding name (`none`, `lz4`, `zstd`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "lz4" => Some(Self::Lz4),
            "zstd" => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Compresses a raw block.
    ///
    /// # Errors
    /// Returns `Codec` if the underlying compressor fails.
    pub fn compress(self, raw: &[u8]) -> ChunkResult<Bytes> {
        match self {
            Self::None => Ok(Bytes::copy_from_slice(raw)),
            Self::Lz4 => Ok(Bytes::from(lz4_flex::compress_prepend_size(raw))),
            Self::Zstd => zstd::encode_all(raw, ZSTD_LEVEL)
                .map(Bytes::from)
                .map_err(|e| self.codec_error(&e)),
        }
    }

    /// Decompresses a sealed block.
    ///
    /// # Errors
    /// Returns `Codec` if the data cannot be decompressed.
    pub fn decompress(self, data: &[u8]) -> ChunkResult<Bytes> {
        match self {
            Self::None => Ok(Bytes::copy_from_slice(data)),
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map(Bytes::from)
                .map_err(|e| self.codec_error(&e)),
            Self::Zstd => zstd::decode_all(data)
                .map(Bytes::from)
                .map_err(|e| self.codec_error(&e)),
        }
    }

    fn codec_error(self, err: &impl std::fmt::Display) -> ChunkError {
        ChunkError::Codec {
            encoding: self,
            message: err.to_string(),
        }
    }
}
