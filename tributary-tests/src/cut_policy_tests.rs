//! Chunk cutting over randomized entry streams.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;
use tributary_chunk::{Encoding, MemChunkConfig};
use tributary_core::{Entry, TenantId, Timestamp};
use tributary_ingester::{ClosedChunk, CutReason, IngesterConfig, Stream};

use crate::scenarios::seeds::REGRESSION_SEEDS;
use crate::scenarios::{entries, ingester, push_request, random_entries};

const SYNC_PERIOD: Duration = Duration::from_secs(60);
const LABELS: &str = r#"{app="cut"}"#;

/// Chunks of 16 KiB uncompressed so a few hundred entries fill one.
fn small_chunks() -> MemChunkConfig {
    MemChunkConfig::default()
        .with_encoding(Encoding::None)
        .with_block_size(1024)
        .with_target_size(16 * 1024)
}

fn assert_cut_invariant(chunks: &[ClosedChunk], min_utilization: f64) {
    for chunk in chunks {
        assert!(
            chunk.span() < SYNC_PERIOD || chunk.utilization >= min_utilization,
            "chunk {} ({:?}) spans {:?} at utilization {:.3}",
            chunk.seq,
            chunk.reason,
            chunk.span(),
            chunk.utilization,
        );
        if chunk.reason == CutReason::Synced {
            assert!(chunk.utilization >= min_utilization);
        }
    }
}

/// Pushes `input` in batches of 50 into one stream and returns the stream.
async fn push_in_batches(input: &[Entry], min_utilization: f64) -> Arc<Stream> {
    let config = IngesterConfig::default()
        .with_chunk(small_chunks())
        .with_sync(SYNC_PERIOD, min_utilization);
    let ingester = ingester(config, 0).unwrap();
    let tenant = TenantId::new("test");

    for batch in input.chunks(50) {
        ingester
            .push(
                &CancellationToken::new(),
                &tenant,
                &push_request(LABELS, batch.to_vec()),
            )
            .await
            .unwrap();
    }

    ingester
        .get_or_create_stream(&tenant, LABELS)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_cut_invariant_holds_for_random_input() {
    for &min_utilization in &[0.2, 0.9] {
        for &seed in REGRESSION_SEEDS {
            let mut rng = StdRng::seed_from_u64(seed);
            let input = random_entries(
                &mut rng,
                Timestamp::from_nanos(0),
                1000,
                Duration::from_secs(1),
                100,
            );
            let stream = push_in_batches(&input, min_utilization).await;

            let closed = stream.closed_chunks().await;
            assert!(!closed.is_empty(), "seed {seed}");
            assert_cut_invariant(&closed, min_utilization);
            if min_utilization < 0.5 {
                // A minute of short lines passes 0.2 well before the target.
                assert!(
                    closed.iter().any(|c| c.reason == CutReason::Synced),
                    "seed {seed}: no time-based cut"
                );
            }

            // Cutting never loses or reorders entries.
            assert_eq!(stream.entries().await.unwrap(), input, "seed {seed}");
        }
    }
}

#[tokio::test]
async fn test_cut_invariant_holds_for_random_large_lines() {
    for &seed in REGRESSION_SEEDS {
        let mut rng = StdRng::seed_from_u64(seed);
        let input = random_entries(
            &mut rng,
            Timestamp::from_nanos(0),
            1000,
            Duration::from_secs(1),
            4000,
        );
        let stream = push_in_batches(&input, 0.9).await;

        let closed = stream.closed_chunks().await;
        assert!(
            closed.iter().any(|c| c.reason == CutReason::Full),
            "seed {seed}"
        );
        assert_cut_invariant(&closed, 0.9);
        assert_eq!(stream.entries().await.unwrap(), input, "seed {seed}");
    }
}

#[tokio::test]
async fn test_large_line_fills_sparse_chunk() {
    // A minute and a half of short lines stays far below 0.9 utilization.
    let mut input = entries("x", Timestamp::from_nanos(0), 100, Duration::from_secs(1));
    input.push(Entry::new(
        Timestamp::from_millis(100_000),
        "z".repeat(15_000),
    ));
    let stream = push_in_batches(&input, 0.9).await;

    // The large line joins the sparse chunk and tips it over the target.
    let closed = stream.closed_chunks().await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].reason, CutReason::Full);
    assert_eq!(closed[0].chunk.entry_count(), 101);
    assert_eq!(closed[0].span(), Duration::from_secs(100));
    assert!((closed[0].utilization - 1.0).abs() < f64::EPSILON);
    assert_cut_invariant(&closed, 0.9);

    assert_eq!(stream.stats().await.active_entries, 0);
    assert_eq!(stream.entries().await.unwrap(), input);
}

#[tokio::test]
async fn test_sync_cuts_align_across_replicas() {
    // Two ingesters fed the same entries cut at the same boundaries.
    let config = IngesterConfig::default().with_sync(SYNC_PERIOD, 0.0);
    let tenant = TenantId::new("test");
    let input = entries("x", Timestamp::from_nanos(0), 300, Duration::from_secs(1));

    let mut boundaries = Vec::new();
    for batch_size in [7, 100] {
        let ingester = ingester(config.clone(), 0).unwrap();
        for batch in input.chunks(batch_size) {
            ingester
                .push(
                    &CancellationToken::new(),
                    &tenant,
                    &push_request(LABELS, batch.to_vec()),
                )
                .await
                .unwrap();
        }
        let stream = ingester
            .get_or_create_stream(&tenant, LABELS)
            .await
            .unwrap();
        let bounds: Vec<_> = stream
            .closed_chunks()
            .await
            .iter()
            .map(|c| c.bounds)
            .collect();
        boundaries.push(bounds);
    }

    assert_eq!(boundaries[0].len(), 4);
    assert_eq!(boundaries[0], boundaries[1]);
}

#[tokio::test]
async fn test_capacity_cuts_without_sync_period() {
    let config = IngesterConfig::default().with_chunk(small_chunks());
    let ingester = ingester(config, 0).unwrap();
    let tenant = TenantId::new("test");
    let line = "y".repeat(500);

    let input: Vec<_> = (0..100)
        .map(|i| Entry::new(Timestamp::from_nanos(i), line.clone()))
        .collect();
    ingester
        .push(&CancellationToken::new(), &tenant, &push_request(LABELS, input))
        .await
        .unwrap();

    let stream = ingester
        .get_or_create_stream(&tenant, LABELS)
        .await
        .unwrap();
    let closed = stream.closed_chunks().await;

    // 512 bytes per entry, 16 KiB target: a chunk is full after 32 entries.
    assert_eq!(closed.len(), 3);
    assert!(closed.iter().all(|c| c.reason == CutReason::Full));
    assert!(closed.iter().all(|c| c.chunk.entry_count() == 32));
    assert!(closed.iter().all(|c| c.chunk.compressed_size() == 16 * 1024));
    assert!(closed
        .iter()
        .all(|c| (c.utilization - 1.0).abs() < f64::EPSILON));
    assert_eq!(stream.stats().await.active_entries, 4);
}
