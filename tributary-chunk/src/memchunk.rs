//! In-memory chunk built from compressed blocks.
//!
//! Entries accumulate in an uncompressed head block. When the head reaches
//! `block_size` bytes it is encoded (`i64 ts | u32 len | line` per entry),
//! checksummed with CRC32 over the raw bytes, compressed and sealed as an
//! immutable block.

use bytes::{Buf, Bytes, BytesMut};
use tributary_core::{Entry, Timestamp};

use crate::chunk::Chunk;
use crate::encoding::Encoding;
use crate::error::{ChunkError, ChunkResult};

/// Configuration for memory chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemChunkConfig {
    /// Codec for sealed blocks.
    pub encoding: Encoding,
    /// Uncompressed size at which the head block is sealed, in bytes.
    pub block_size: usize,
    /// Target compressed size of a chunk in bytes; `0` caps by block count.
    pub target_size: usize,
    /// Maximum number of blocks when `target_size` is `0`.
    pub max_blocks: usize,
    /// Maximum size of a single line in bytes.
    pub max_line_bytes: usize,
}

impl Default for MemChunkConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Lz4,
            block_size: 256 * 1024,         // 256 KB
            target_size: 1536 * 1024,       // 1.5 MB
            max_blocks: 10,
            max_line_bytes: 256 * 1024,     // 256 KB
        }
    }
}

impl MemChunkConfig {
    /// Sets the block encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the block size.
    #[must_use]
    pub const fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the target compressed size (`0` caps by block count instead).
    #[must_use]
    pub const fn with_target_size(mut self, target_size: usize) -> Self {
        self.target_size = target_size;
        self
    }

    /// Sets the block count cap used without a target size.
    #[must_use]
    pub const fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    /// Sets the per-line size bound.
    #[must_use]
    pub const fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if a size is zero or the target is smaller
    /// than one block.
    pub fn validate(&self) -> ChunkResult<()> {
        if self.block_size == 0 {
            return Err(invalid_config("block_size must be positive"));
        }
        if self.max_blocks == 0 {
            return Err(invalid_config("max_blocks must be positive"));
        }
        if self.max_line_bytes == 0 {
            return Err(invalid_config("max_line_bytes must be positive"));
        }
        if self.target_size != 0 && self.target_size < self.block_size {
            return Err(invalid_config("target_size must be 0 or >= block_size"));
        }
        Ok(())
    }
}

fn invalid_config(message: &str) -> ChunkError {
    ChunkError::InvalidConfig {
        message: message.to_string(),
    }
}

/// A sealed, compressed block of entries.
#[derive(Debug, Clone)]
struct Block {
    /// Number of entries in the block.
    entry_count: u32,
    /// Size of the raw encoded entries.
    raw_size: usize,
    /// CRC32 of the raw encoded entries.
    crc: u32,
    /// Compressed payload.
    data: Bytes,
}

/// Uncompressed entries not yet sealed into a block.
#[derive(Debug, Default)]
struct HeadBlock {
    entries: Vec<Entry>,
    /// Encoded size of `entries`.
    size: usize,
}

/// A chunk of compressed blocks plus an open head block.
#[derive(Debug)]
pub struct MemChunk {
    /// Configuration.
    config: MemChunkConfig,
    /// Sealed blocks, in append order.
    blocks: Vec<Block>,
    /// Open head block.
    head: HeadBlock,
    /// Sum of compressed block sizes.
    blocks_size: usize,
    /// Sum of raw block sizes.
    blocks_raw_size: usize,
    /// Entries appended so far.
    entry_count: u64,
    /// Minimum and maximum timestamps seen.
    bounds: Option<(Timestamp, Timestamp)>,
    /// Whether the chunk is closed (read-only).
    closed: bool,
    /// Fails the next block seal (for testing).
    #[cfg(test)]
    seal_fault: bool,
}

impl MemChunk {
    /// Creates an empty chunk.
    #[must_use]
    pub fn new(config: MemChunkConfig) -> Self {
        Self {
            config,
            blocks: Vec::new(),
            head: HeadBlock::default(),
            blocks_size: 0,
            blocks_raw_size: 0,
            entry_count: 0,
            bounds: None,
            closed: false,
            #[cfg(test)]
            seal_fault: false,
        }
    }

    /// Returns the number of sealed blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Seals the head block into a compressed block.
    ///
    /// The head is only cleared once the block is sealed, so a codec failure
    /// loses nothing.
    fn cut_block(&mut self) -> ChunkResult<()> {
        if self.head.entries.is_empty() {
            return Ok(());
        }

        #[cfg(test)]
        if self.seal_fault {
            return Err(ChunkError::Codec {
                encoding: self.config.encoding,
                message: "injected seal failure".to_string(),
            });
        }

        let mut raw = BytesMut::with_capacity(self.head.size);
        for entry in &self.head.entries {
            entry.encode(&mut raw);
        }
        debug_assert_eq!(raw.len(), self.head.size);

        let crc = crc32fast::hash(&raw);
        let data = self.config.encoding.compress(&raw)?;

        #[allow(clippy::cast_possible_truncation)] // Bounded by block_size.
        let entry_count = self.head.entries.len() as u32;

        self.blocks_size += data.len();
        self.blocks_raw_size += raw.len();
        self.blocks.push(Block {
            entry_count,
            raw_size: raw.len(),
            crc,
            data,
        });
        self.head = HeadBlock::default();
        Ok(())
    }

    /// Decodes a sealed block.
    fn decode_block(&self, block: &Block) -> ChunkResult<Vec<Entry>> {
        let raw = self.config.encoding.decompress(&block.data)?;

        if raw.len() != block.raw_size {
            return Err(ChunkError::Corruption {
                message: format!(
                    "block size mismatch: expected {}, got {}",
                    block.raw_size,
                    raw.len()
                ),
            });
        }

        let actual_crc = crc32fast::hash(&raw);
        if actual_crc != block.crc {
            return Err(ChunkError::Corruption {
                message: format!(
                    "CRC mismatch: expected {:08x}, got {:08x}",
                    block.crc, actual_crc
                ),
            });
        }

        let mut buf = raw;
        let mut entries = Vec::with_capacity(block.entry_count as usize);
        for _ in 0..block.entry_count {
            let entry = Entry::decode(&mut buf).ok_or_else(|| ChunkError::Corruption {
                message: "failed to decode entry".to_string(),
            })?;
            entries.push(entry);
        }

        if buf.has_remaining() {
            return Err(ChunkError::Corruption {
                message: format!("{} trailing bytes after block entries", buf.remaining()),
            });
        }

        Ok(entries)
    }
}

impl Chunk for MemChunk {
    fn encoding(&self) -> Encoding {
        self.config.encoding
    }

    fn is_full(&self) -> bool {
        if self.closed {
            return true;
        }
        if self.entry_count == 0 {
            return false;
        }

        if self.config.target_size > 0 {
            self.compressed_size() >= self.config.target_size
        } else {
            self.blocks.len() >= self.config.max_blocks
                || self.uncompressed_size() >= self.config.block_size * self.config.max_blocks
        }
    }

    fn append(&mut self, entry: &Entry) -> ChunkResult<()> {
        if self.closed {
            return Err(ChunkError::Closed);
        }
        if entry.line.len() > self.config.max_line_bytes {
            return Err(ChunkError::LineTooLong {
                size: entry.line.len(),
                max: self.config.max_line_bytes,
            });
        }

        let prev_bounds = self.bounds;
        let ts = entry.timestamp;
        self.bounds = Some(match self.bounds {
            Some((min, max)) => (min.min(ts), max.max(ts)),
            None => (ts, ts),
        });

        self.head.size += entry.encoded_size();
        self.head.entries.push(entry.clone());
        self.entry_count += 1;

        if self.head.size >= self.config.block_size {
            if let Err(e) = self.cut_block() {
                // An error means the entry was not stored.
                self.head.entries.pop();
                self.head.size -= entry.encoded_size();
                self.entry_count -= 1;
                self.bounds = prev_bounds;
                return Err(e);
            }
        }
        Ok(())
    }

    fn bounds(&self) -> Option<(Timestamp, Timestamp)> {
        self.bounds
    }

    #[allow(clippy::cast_precision_loss)] // Sizes are far below 2^52.
    fn utilization(&self) -> f64 {
        let ratio = if self.config.target_size > 0 {
            self.compressed_size() as f64 / self.config.target_size as f64
        } else {
            let capacity = self.config.block_size * self.config.max_blocks;
            self.uncompressed_size() as f64 / capacity as f64
        };
        ratio.clamp(0.0, 1.0)
    }

    fn close(&mut self) -> ChunkResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.cut_block();
        self.closed = true;
        result
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn entry_count(&self) -> u64 {
        self.entry_count
    }

    fn compressed_size(&self) -> usize {
        self.blocks_size + self.head.size
    }

    fn uncompressed_size(&self) -> usize {
        self.blocks_raw_size + self.head.size
    }

    fn entries(&self) -> ChunkResult<Vec<Entry>> {
        let mut entries = Vec::new();
        for block in &self.blocks {
            entries.extend(self.decode_block(block)?);
        }
        entries.extend(self.head.entries.iter().cloned());
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ts: i64, line: &str) -> Entry {
        Entry::new(Timestamp::from_nanos(ts), line.to_string())
    }

    fn small_config() -> MemChunkConfig {
        MemChunkConfig::default()
            .with_block_size(256)
            .with_target_size(0)
            .with_max_blocks(4)
    }

    #[test]
    fn test_chunk_creation() {
        let chunk = MemChunk::new(MemChunkConfig::default());
        assert!(chunk.is_empty());
        assert!(chunk.bounds().is_none());
        assert!(!chunk.is_closed());
        assert!(chunk.utilization().abs() < f64::EPSILON);
    }

    #[test]
    fn test_chunk_append_tracks_bounds() {
        let mut chunk = MemChunk::new(MemChunkConfig::default());
        chunk.append(&entry(20, "b")).unwrap();
        chunk.append(&entry(10, "a")).unwrap();
        chunk.append(&entry(30, "c")).unwrap();

        assert_eq!(chunk.entry_count(), 3);
        assert_eq!(
            chunk.bounds(),
            Some((Timestamp::from_nanos(10), Timestamp::from_nanos(30)))
        );
    }

    #[test]
    fn test_chunk_entries_preserve_append_order_across_blocks() {
        for encoding in [Encoding::None, Encoding::Lz4, Encoding::Zstd] {
            let mut chunk = MemChunk::new(small_config().with_encoding(encoding));
            let expected: Vec<Entry> = (0..50).map(|i| entry(i, &format!("hello {i}"))).collect();
            for e in &expected {
                chunk.append(e).unwrap();
            }
            assert!(chunk.block_count() > 0, "{encoding:?} should have sealed blocks");
            assert_eq!(chunk.entries().unwrap(), expected, "{encoding:?}");
        }
    }

    #[test]
    fn test_closed_chunk_rejects_append() {
        let mut chunk = MemChunk::new(MemChunkConfig::default());
        chunk.append(&entry(1, "x")).unwrap();
        chunk.close().unwrap();
        chunk.close().unwrap();

        assert!(chunk.is_closed());
        assert_eq!(chunk.append(&entry(2, "y")), Err(ChunkError::Closed));
        assert!(chunk.is_full());
        // Closing seals the head into a block.
        assert_eq!(chunk.block_count(), 1);
        assert_eq!(chunk.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_line_too_long() {
        let mut chunk = MemChunk::new(MemChunkConfig::default().with_max_line_bytes(4));
        let err = chunk.append(&entry(1, "too long")).unwrap_err();
        assert_eq!(err, ChunkError::LineTooLong { size: 8, max: 4 });
        assert!(chunk.is_empty());
    }

    #[test]
    fn test_block_count_capacity() {
        let mut chunk = MemChunk::new(small_config().with_encoding(Encoding::None));
        let line = "x".repeat(244); // 12-byte header + 244 = one block per entry.
        for i in 0..4 {
            assert!(!chunk.is_full());
            chunk.append(&entry(i, &line)).unwrap();
        }
        assert_eq!(chunk.block_count(), 4);
        assert!(chunk.is_full());
        assert!((chunk.utilization() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_target_size_capacity() {
        let config = MemChunkConfig::default()
            .with_encoding(Encoding::None)
            .with_block_size(64)
            .with_target_size(128);
        let mut chunk = MemChunk::new(config);
        let e = entry(0, "0123456789abcdef0123"); // 32 bytes encoded

        let mut appended = 0;
        while !chunk.is_full() {
            chunk.append(&e).unwrap();
            appended += 1;
        }
        // Full exactly at the target, never below it.
        assert_eq!(appended, 4);
        assert_eq!(chunk.compressed_size(), 128);
        assert!((chunk.utilization() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_oversized_entry_fills_empty_chunk() {
        let config = MemChunkConfig::default()
            .with_block_size(16)
            .with_target_size(16);
        let mut chunk = MemChunk::new(config);
        assert!(!chunk.is_full());

        chunk.append(&entry(0, &"x".repeat(100))).unwrap();
        assert!(chunk.is_full());
        assert!((chunk.utilization() - 1.0).abs() < f64::EPSILON);
        assert_eq!(chunk.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_seal_leaves_chunk_unchanged() {
        let mut chunk = MemChunk::new(small_config().with_encoding(Encoding::None));
        chunk.append(&entry(5, &"a".repeat(100))).unwrap();
        let before = chunk.entries().unwrap();

        // The second entry crosses the block size and triggers a seal.
        chunk.seal_fault = true;
        let err = chunk.append(&entry(1, &"b".repeat(200))).unwrap_err();
        assert!(matches!(err, ChunkError::Codec { .. }));

        assert_eq!(chunk.entry_count(), 1);
        assert_eq!(chunk.block_count(), 0);
        assert_eq!(chunk.uncompressed_size(), 112);
        assert_eq!(
            chunk.bounds(),
            Some((Timestamp::from_nanos(5), Timestamp::from_nanos(5)))
        );
        assert_eq!(chunk.entries().unwrap(), before);

        chunk.seal_fault = false;
        chunk.append(&entry(1, &"b".repeat(200))).unwrap();
        assert_eq!(chunk.entry_count(), 2);
        assert_eq!(chunk.block_count(), 1);
        assert_eq!(chunk.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_corrupt_block_detected() {
        let mut chunk = MemChunk::new(small_config().with_encoding(Encoding::None));
        chunk.append(&entry(1, &"y".repeat(300))).unwrap();
        assert_eq!(chunk.block_count(), 1);

        let mut data = chunk.blocks[0].data.to_vec();
        data[20] ^= 0xff;
        chunk.blocks[0].data = Bytes::from(data);

        let err = chunk.entries().unwrap_err();
        assert!(matches!(err, ChunkError::Corruption { .. }));
    }

    #[test]
    fn test_config_validation() {
        assert!(MemChunkConfig::default().validate().is_ok());
        assert!(MemChunkConfig::default().with_block_size(0).validate().is_err());
        assert!(MemChunkConfig::default()
            .with_block_size(1024)
            .with_target_size(512)
            .validate()
            .is_err());
        assert!(MemChunkConfig::default().with_target_size(0).validate().is_ok());
    }
}
