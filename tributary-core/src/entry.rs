//! Log entries and push requests.
//!
//! A push request is a sequence of groups; each group carries a label string
//! in display form (`{name="value", ...}`, pairs in any order) and the entries
//! for that stream. Entries keep the order in which they were received.

use std::ops::Add;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Timestamp of a log entry, in nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from nanoseconds since Unix epoch.
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a timestamp from milliseconds since Unix epoch.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Returns the timestamp as nanoseconds since Unix epoch.
    #[must_use]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Returns the current time as a timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // Nanosecond timestamps fit i64 until 2262.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_nanos() as i64)
    }

    /// Returns the time elapsed from `earlier` to `self`.
    ///
    /// Saturates to zero when `earlier` is after `self`.
    #[must_use]
    #[allow(clippy::cast_sign_loss)] // Guarded by the positivity check.
    pub const fn duration_since(self, earlier: Self) -> Duration {
        let delta = self.0.saturating_sub(earlier.0);
        if delta <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(delta as u64)
        }
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn add(self, rhs: Duration) -> Self {
        let nanos = rhs.as_nanos().min(i64::MAX as u128) as i64;
        Self(self.0.saturating_add(nanos))
    }
}

/// A single timestamped log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// When the line was produced.
    pub timestamp: Timestamp,
    /// The raw line.
    pub line: Bytes,
}

impl Entry {
    /// Size of the fixed per-entry header: timestamp + line length.
    pub const HEADER_SIZE: usize = 8 + 4;

    /// Creates a new entry.
    #[must_use]
    pub fn new(timestamp: Timestamp, line: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            line: line.into(),
        }
    }

    /// Returns the encoded size of this entry.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.line.len()
    }

    /// Encodes the entry to bytes.
    #[allow(clippy::cast_possible_truncation)] // Line length bounded by chunk config.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.timestamp.as_nanos());
        buf.put_u32_le(self.line.len() as u32);
        buf.put_slice(&self.line);
    }

    /// Decodes an entry from bytes.
    ///
    /// Returns `None` if the buffer is too small.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < Self::HEADER_SIZE {
            return None;
        }
        let timestamp = Timestamp::from_nanos(buf.get_i64_le());
        let len = buf.get_u32_le() as usize;
        if buf.remaining() < len {
            return None;
        }
        let line = buf.copy_to_bytes(len);
        Some(Self { timestamp, line })
    }
}

/// Entries destined for one stream, keyed by the declared label string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPush {
    /// Label set in display form; pair order is not significant.
    pub labels: String,
    /// Entries in the order they were received.
    pub entries: Vec<Entry>,
}

impl StreamPush {
    /// Creates a new group.
    #[must_use]
    pub fn new(labels: impl Into<String>, entries: Vec<Entry>) -> Self {
        Self {
            labels: labels.into(),
            entries,
        }
    }
}

/// A batch of entry groups delivered by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushRequest {
    /// Groups in the order they were received.
    pub streams: Vec<StreamPush>,
}

impl PushRequest {
    /// Creates a push request from groups.
    #[must_use]
    pub const fn new(streams: Vec<StreamPush>) -> Self {
        Self { streams }
    }

    /// Returns the total number of entries across all groups.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.streams.iter().map(|s| s.entries.len()).sum()
    }
}
