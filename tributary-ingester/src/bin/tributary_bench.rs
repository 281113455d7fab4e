//! Tributary ingest benchmark.
//!
//! Drives an in-process [`Ingester`] with concurrent pushes from many
//! tenants and streams, then reports push latency and the resulting chunks.
//!
//! # Usage
//!
//! ```bash
//! # 4 tenants x 100 streams, 100 batches of 100 entries per stream
//! tributary-bench --tenants 4 --streams 100 --batches 100 --entries 100
//!
//! # Time-based cutting with zstd blocks
//! tributary-bench --encoding zstd --sync-period-ms 60000 --sync-min-utilization 0.2
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::cast_precision_loss)] // f64 precision loss acceptable in benchmark stats
#![allow(clippy::cast_possible_truncation)] // Safe casts in benchmark context
#![allow(clippy::cast_possible_wrap)] // Safe wrapping in benchmark context

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use hdrhistogram::Histogram;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tributary_chunk::{Encoding, MemChunkConfig};
use tributary_core::{Entry, PushRequest, StreamPush, TenantId, TenantLimits, Timestamp};
use tributary_ingester::{Ingester, IngesterConfig, Overrides, StaticReplicaCount};

/// Tributary ingest benchmark.
#[derive(Parser, Debug)]
#[command(name = "tributary-bench")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of tenants pushing concurrently.
    #[arg(long, default_value = "4")]
    tenants: u32,

    /// Streams per tenant; one push task per stream.
    #[arg(long, default_value = "100")]
    streams: u32,

    /// Batches pushed by each task.
    #[arg(long, default_value = "100")]
    batches: u32,

    /// Entries per batch.
    #[arg(long, default_value = "100")]
    entries: u32,

    /// Size of each log line in bytes.
    #[arg(long, default_value = "128")]
    line_size: usize,

    /// Milliseconds of entry time between consecutive entries.
    #[arg(long, default_value = "10")]
    step_ms: u64,

    /// Block encoding (none, lz4, zstd).
    #[arg(long, default_value = "lz4")]
    encoding: String,

    /// Sync period in milliseconds; 0 disables time-based cuts.
    #[arg(long, default_value = "0")]
    sync_period_ms: u64,

    /// Minimum utilization for time-based cuts.
    #[arg(long, default_value = "0.0")]
    sync_min_utilization: f64,

    /// Per-tenant stream limit; 0 disables it.
    #[arg(long, default_value = "10000")]
    max_streams: u32,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Log to stderr so results on stdout stay clean.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let encoding = Encoding::from_name(&args.encoding)
        .ok_or_else(|| format!("unknown encoding '{}'", args.encoding))?;
    let config = IngesterConfig::default()
        .with_chunk(MemChunkConfig::default().with_encoding(encoding))
        .with_sync(
            Duration::from_millis(args.sync_period_ms),
            args.sync_min_utilization,
        );
    let limits = Overrides::new(
        TenantLimits::new().with_max_local_streams_per_user(args.max_streams),
    );
    let ingester = Arc::new(Ingester::new(
        config,
        Arc::new(limits),
        Arc::new(StaticReplicaCount::new(1)),
    )?);

    println!("=== Tributary Ingest Benchmark ===");
    println!("Tenants:      {}", args.tenants);
    println!("Streams:      {} per tenant", args.streams);
    println!("Batches:      {} x {} entries", args.batches, args.entries);
    println!("Line size:    {} bytes", args.line_size);
    println!("Encoding:     {encoding:?}");
    println!("Sync period:  {} ms", args.sync_period_ms);
    println!();

    info!(tenants = args.tenants, streams = args.streams, "Starting benchmark");

    let total_entries = Arc::new(AtomicU64::new(0));
    let total_errors = Arc::new(AtomicU64::new(0));
    let latencies = Arc::new(Mutex::new(Histogram::<u64>::new(3)?));
    let cancel = CancellationToken::new();
    let line = "x".repeat(args.line_size);

    let start = Instant::now();
    let mut join_set = JoinSet::new();

    for tenant_idx in 0..args.tenants {
        for stream_idx in 0..args.streams {
            let ingester = ingester.clone();
            let total_entries = total_entries.clone();
            let total_errors = total_errors.clone();
            let latencies = latencies.clone();
            let cancel = cancel.clone();
            let line = line.clone();
            let tenant = TenantId::new(format!("tenant-{tenant_idx}"));
            let labels = format!("{{job=\"bench\", stream=\"{stream_idx}\"}}");
            let (batches, entries, step_ms) = (args.batches, args.entries, args.step_ms);

            join_set.spawn(async move {
                let mut ts = 0i64;
                for _ in 0..batches {
                    let batch: Vec<Entry> = (0..entries)
                        .map(|_| {
                            ts += (step_ms * 1_000_000) as i64;
                            Entry::new(Timestamp::from_nanos(ts), line.clone())
                        })
                        .collect();
                    let request = PushRequest::new(vec![StreamPush::new(labels.clone(), batch)]);

                    let op_start = Instant::now();
                    let result = ingester.push(&cancel, &tenant, &request).await;
                    let duration = op_start.elapsed();

                    match result {
                        Ok(()) => {
                            total_entries.fetch_add(u64::from(entries), Ordering::Relaxed);
                        }
                        Err(e) => {
                            total_errors.fetch_add(1, Ordering::Relaxed);
                            eprintln!("Push error: {e}");
                        }
                    }
                    latencies
                        .lock()
                        .await
                        .record(duration.as_micros() as u64)
                        .ok();
                }
            });
        }
    }

    while let Some(result) = join_set.join_next().await {
        if let Err(e) = result {
            eprintln!("Join error: {e}");
        }
    }

    let elapsed = start.elapsed();
    let total = total_entries.load(Ordering::Relaxed);
    let throughput = total as f64 / elapsed.as_secs_f64();
    let mb_per_sec = (total as f64 * args.line_size as f64) / elapsed.as_secs_f64() / 1_000_000.0;

    println!("=== Results ===");
    println!("Total entries:    {total}");
    println!("Failed pushes:    {}", total_errors.load(Ordering::Relaxed));
    println!("Total time:       {elapsed:.2?}");
    println!("Throughput:       {throughput:.0} entries/sec");
    println!("Throughput:       {mb_per_sec:.2} MB/sec");
    println!();

    let hist = latencies.lock().await;
    println!("=== Latency (per push) ===");
    println!("  p50:   {} us", hist.value_at_quantile(0.50));
    println!("  p90:   {} us", hist.value_at_quantile(0.90));
    println!("  p99:   {} us", hist.value_at_quantile(0.99));
    println!("  max:   {} us", hist.max());
    println!();
    drop(hist);

    let synced_or_full = ingester.collect_closed_chunks().await.len();
    let forced = ingester.shutdown().await;
    let chunks = ingester.collect_closed_chunks().await;
    let compressed: usize = chunks.iter().map(|c| c.chunk.chunk.compressed_size()).sum();
    let uncompressed: usize = chunks.iter().map(|c| c.chunk.chunk.uncompressed_size()).sum();
    let avg_utilization = if chunks.is_empty() {
        0.0
    } else {
        chunks.iter().map(|c| c.chunk.utilization).sum::<f64>() / chunks.len() as f64
    };

    println!("=== Chunks ===");
    println!("  cut by policy:   {synced_or_full}");
    println!("  cut at shutdown: {forced}");
    println!("  avg utilization: {avg_utilization:.3}");
    println!("  uncompressed:    {uncompressed} bytes");
    println!("  compressed:      {compressed} bytes");

    Ok(())
}
