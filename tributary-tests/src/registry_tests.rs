//! Tenant registry, cancellation and partial-success pushes.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tributary_chunk::MemChunkConfig;
use tributary_core::{Entry, PushRequest, StreamPush, TenantId, Timestamp};
use tributary_ingester::{IngestError, IngesterConfig, OutOfOrderPolicy};

use crate::scenarios::{entries, ingester, push_request};

#[tokio::test]
async fn test_registry_creates_instances_lazily() {
    let ingester = ingester(IngesterConfig::default(), 0).unwrap();
    assert!(ingester.tenants().await.is_empty());

    let tenant = TenantId::new("lazy");
    let lookup = ingester.instance(&tenant).await;
    assert!(lookup.is_none());
    assert!(ingester.tenants().await.is_empty());

    ingester
        .get_or_create_stream(&tenant, r#"{app="x"}"#)
        .await
        .unwrap();
    assert_eq!(ingester.tenants().await, vec![tenant]);
}

#[tokio::test]
async fn test_registry_eviction_drops_streams() {
    let ingester = ingester(IngesterConfig::default(), 0).unwrap();
    let tenant = TenantId::new("gone");
    let cancel = CancellationToken::new();
    let request = push_request(
        r#"{app="x"}"#,
        entries("x", Timestamp::from_nanos(0), 3, Duration::from_secs(1)),
    );

    ingester.push(&cancel, &tenant, &request).await.unwrap();
    let evicted = ingester.evict_instance(&tenant).await.unwrap();
    assert_eq!(evicted.stream_count().await, 1);

    ingester.push(&cancel, &tenant, &request).await.unwrap();
    let fresh = ingester.instance(&tenant).await.unwrap();
    let stream = fresh.lookup(r#"{app="x"}"#).await.unwrap().unwrap();
    assert_eq!(stream.stats().await.entries_appended, 3);
}

#[tokio::test]
async fn test_push_cancelled_before_work() {
    let ingester = ingester(IngesterConfig::default(), 0).unwrap();
    let tenant = TenantId::new("cancelled");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ingester
        .push(
            &cancel,
            &tenant,
            &push_request(r#"{app="x"}"#, entries("x", Timestamp::from_nanos(0), 1, Duration::ZERO)),
        )
        .await
        .unwrap_err();

    assert_eq!(err, IngestError::Cancelled);
    assert!(ingester.instance(&tenant).await.is_none());
}

#[tokio::test]
async fn test_push_partial_success_across_groups() {
    let config = IngesterConfig::default()
        .with_chunk(MemChunkConfig::default().with_max_line_bytes(16))
        .with_out_of_order(OutOfOrderPolicy::Reject);
    let ingester = ingester(config, 0).unwrap();
    let tenant = TenantId::new("partial");

    let request = PushRequest::new(vec![
        StreamPush::new(r#"{app="bad"}"#, vec![]),
        StreamPush::new(
            r#"{app="a"}"#,
            vec![
                Entry::new(Timestamp::from_nanos(2), "ok"),
                Entry::new(Timestamp::from_nanos(1), "late"),
                Entry::new(Timestamp::from_nanos(3), "also ok"),
            ],
        ),
        StreamPush::new("{app=bad}", vec![Entry::new(Timestamp::from_nanos(1), "lost")]),
        StreamPush::new(
            r#"{app="b"}"#,
            vec![Entry::new(Timestamp::from_nanos(1), "x".repeat(64))],
        ),
        StreamPush::new(r#"{app="c"}"#, vec![Entry::new(Timestamp::from_nanos(1), "fine")]),
    ]);
    assert_eq!(request.entry_count(), 6);

    let err = ingester
        .push(&CancellationToken::new(), &tenant, &request)
        .await
        .unwrap_err();

    // First failure wins: the out-of-order entry in the second group.
    assert!(matches!(err, IngestError::OutOfOrder { .. }), "{err}");

    let instance = ingester.instance(&tenant).await.unwrap();
    let count = |labels: &'static str| {
        let instance = instance.clone();
        async move {
            match instance.lookup(labels).await.unwrap() {
                Some(stream) => stream.stats().await.entries_appended,
                None => 0,
            }
        }
    };
    assert_eq!(count(r#"{app="a"}"#).await, 2);
    assert_eq!(count(r#"{app="b"}"#).await, 0);
    assert_eq!(count(r#"{app="c"}"#).await, 1);
    // The empty group still resolved its stream; the malformed one did not.
    assert_eq!(instance.stream_count().await, 4);
}
