//! Reusable fixtures for ingest tests.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tributary_core::{Entry, PushRequest, StreamPush, TenantLimits, Timestamp};
use tributary_ingester::{IngestResult, Ingester, IngesterConfig, Overrides, StaticReplicaCount};

/// Seeds for reproducible randomized tests.
pub mod seeds {
    /// Seeds run by every randomized test.
    pub const REGRESSION_SEEDS: &[u64] = &[42, 12345, 0xDEAD_BEEF, 999, 7777, 0x1337, 1, 0];
}

/// Label fixtures.
pub mod labels {
    /// Pairs of distinct label sets whose label-pair XOR fingerprints collide.
    pub const COLLIDING_PAIRS: &[(&str, &str)] = &[
        (
            r#"{app="l",uniq0="0",uniq1="1"}"#,
            r#"{uniq0="1",app="m",uniq1="1"}"#,
        ),
        (
            r#"{app="l",uniq0="1",uniq1="0"}"#,
            r#"{uniq1="0",app="m",uniq0="0"}"#,
        ),
        (
            r#"{app="l",uniq0="0",uniq1="0"}"#,
            r#"{uniq0="1",uniq1="0",app="m"}"#,
        ),
    ];

    /// Returns a distinct label string for stream `i`.
    #[must_use]
    pub fn numbered(i: usize) -> String {
        format!(r#"{{app="test", stream="{i}"}}"#)
    }
}

/// Builds an ingester with a single healthy replica and the given stream limit.
///
/// # Errors
/// Returns an error if `config` is invalid.
pub fn ingester(config: IngesterConfig, max_streams: u32) -> IngestResult<Ingester> {
    let limits = Overrides::new(TenantLimits::new().with_max_local_streams_per_user(max_streams));
    Ingester::new(config, Arc::new(limits), Arc::new(StaticReplicaCount::new(1)))
}

/// Returns `n` entries starting at `start`, `step` apart, with lines tagged by `tag`.
#[must_use]
pub fn entries(tag: &str, start: Timestamp, n: usize, step: Duration) -> Vec<Entry> {
    let mut ts = start;
    (0..n)
        .map(|i| {
            let entry = Entry::new(ts, format!("{tag} entry {i}"));
            ts = ts + step;
            entry
        })
        .collect()
}

/// Returns `n` entries with random gaps of up to `max_step` and random line
/// lengths in `1..=max_line`.
#[must_use]
pub fn random_entries<R: Rng>(
    rng: &mut R,
    start: Timestamp,
    n: usize,
    max_step: Duration,
    max_line: usize,
) -> Vec<Entry> {
    let max_step_nanos = u64::try_from(max_step.as_nanos()).unwrap_or(u64::MAX);
    let mut ts = start;
    (0..n)
        .map(|_| {
            ts = ts + Duration::from_nanos(rng.gen_range(0..=max_step_nanos));
            let len = rng.gen_range(1..=max_line);
            let line: String = (0..len)
                .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
                .collect();
            Entry::new(ts, line)
        })
        .collect()
}

/// Wraps one stream's entries in a push request.
#[must_use]
pub fn push_request(labels: &str, entries: Vec<Entry>) -> PushRequest {
    PushRequest::new(vec![StreamPush::new(labels, entries)])
}
