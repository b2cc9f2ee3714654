//! End-to-end runs against an in-memory object store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use common::config::{ConfigError, ExcludeConfig, ResourceConfig};
use common::partition::values::{ColumnSpec, ColumnType};
use common::provider::{DiscoveryError, Provider};
use common::resource::Resource;
use sweeper::exclude::build_filters;
use sweeper::execution::{
    check_operation_targets, collect_partitions, create_execution_locks,
    execute_armed_actions_with_timeout, filter_kept_partitions, EngineError,
};
use sweeper::operations::{Operation, OperationKind};
use sweeper::providers::ObjectStoreProvider;
use sweeper::runtime::Runtime;

fn day_spec() -> Vec<ColumnSpec> {
    vec![ColumnSpec {
        name: "day".to_string(),
        kind: ColumnType::Date,
    }]
}

fn resource_config(name: &str, prefix: &str, regex: Option<&str>) -> ResourceConfig {
    ResourceConfig {
        name: name.to_string(),
        provider: "store".to_string(),
        columns: day_spec(),
        prefix: Some(prefix.to_string()),
        regex: regex.map(str::to_string),
        table: None,
    }
}

async fn put(store: &Arc<InMemory>, key: &str, bytes: &'static [u8]) {
    store
        .put(&Path::from(key), PutPayload::from_static(bytes))
        .await
        .unwrap();
}

async fn object_count(store: &Arc<InMemory>, prefix: &str) -> usize {
    store
        .list(Some(&Path::from(prefix)))
        .collect::<Vec<_>>()
        .await
        .len()
}

fn provider_with_store(store: &Arc<InMemory>) -> Arc<ObjectStoreProvider> {
    Arc::new(ObjectStoreProvider::with_store(
        "store",
        store.clone() as Arc<dyn ObjectStore>,
        2,
    ))
}

fn remove_runtime(
    provider: &Arc<ObjectStoreProvider>,
    source: &Arc<Resource>,
    excludes: &[ExcludeConfig],
    armed: bool,
) -> Runtime {
    let operation = Arc::new(Operation::new(
        "expire",
        OperationKind::Remove,
        source.clone(),
        provider.clone() as Arc<dyn Provider>,
        build_filters("expire", excludes).unwrap(),
        Vec::new(),
    ));

    Runtime::from_parts(
        vec![provider.clone() as Arc<dyn Provider>],
        vec![operation],
        1,
        armed,
    )
    .unwrap()
}

async fn run_phases(runtime: &Runtime) -> Result<(), EngineError> {
    collect_partitions(runtime).await?;
    create_execution_locks(runtime).await?;
    filter_kept_partitions(runtime).await?;
    check_operation_targets(runtime).await?;
    execute_armed_actions_with_timeout(runtime, Duration::from_secs(5)).await
}

#[tokio::test]
async fn test_discovery_merges_objects_of_one_partition() {
    let store = Arc::new(InMemory::new());
    put(&store, "data/events/day=2024-01-01/a.parquet", b"aaaa").await;
    put(&store, "data/events/day=2024-01-01/b.parquet", b"bb").await;
    put(&store, "data/events/day=2024-01-02/c.parquet", b"c").await;

    let provider = provider_with_store(&store);
    let events = provider
        .make_resource(&resource_config("events", "data/events", None))
        .unwrap();
    let runtime = remove_runtime(&provider, &events, &[], false);

    collect_partitions(&runtime).await.unwrap();

    assert_eq!(events.partition_count(), 2);
    let merged = events.partition("2024-01-01").unwrap().stats().unwrap();
    assert_eq!(merged.object_count, 2);
    assert_eq!(merged.size_bytes, 6);
}

#[tokio::test]
async fn test_dry_run_leaves_the_store_untouched() {
    let store = Arc::new(InMemory::new());
    put(&store, "data/events/day=2024-01-01/a.parquet", b"aaaa").await;
    put(&store, "data/events/day=2024-01-02/b.parquet", b"bb").await;

    let provider = provider_with_store(&store);
    let events = provider
        .make_resource(&resource_config("events", "data/events", None))
        .unwrap();
    let runtime = remove_runtime(&provider, &events, &[], false);

    run_phases(&runtime).await.unwrap();

    assert_eq!(object_count(&store, "data/events").await, 2);
}

#[tokio::test]
async fn test_armed_remove_empties_the_kept_partitions() {
    let store = Arc::new(InMemory::new());
    put(&store, "data/events/day=2024-01-01/a.parquet", b"aaaa").await;
    put(&store, "data/events/day=2024-01-02/b.parquet", b"bb").await;

    let provider = provider_with_store(&store);
    let events = provider
        .make_resource(&resource_config("events", "data/events", None))
        .unwrap();
    let runtime = remove_runtime(&provider, &events, &[], true);

    run_phases(&runtime).await.unwrap();

    assert_eq!(object_count(&store, "data/events").await, 0);
}

#[tokio::test]
async fn test_all_past_window_keeps_nothing_and_acts_on_nothing() {
    let store = Arc::new(InMemory::new());
    put(&store, "data/metrics/bucket=10/a.parquet", b"aaaa").await;
    put(&store, "data/metrics/bucket=20/b.parquet", b"bb").await;
    put(&store, "data/metrics/bucket=30/c.parquet", b"c").await;

    // every already-written object falls inside [epoch, now)
    let excludes = [ExcludeConfig::AbsoluteTimestamp {
        from: None,
        to: Some(Utc::now().to_rfc3339()),
    }];

    for armed in [false, true] {
        let provider = provider_with_store(&store);
        let metrics = provider
            .make_resource(&ResourceConfig {
                name: "metrics".to_string(),
                provider: "store".to_string(),
                columns: vec![ColumnSpec {
                    name: "bucket".to_string(),
                    kind: ColumnType::Int,
                }],
                prefix: Some("data/metrics".to_string()),
                regex: None,
                table: None,
            })
            .unwrap();
        let runtime = remove_runtime(&provider, &metrics, &excludes, armed);

        run_phases(&runtime).await.unwrap();

        let operation = runtime.operation("expire").unwrap();
        assert!(operation.kept_partitions().unwrap().is_empty());
        assert_eq!(object_count(&store, "data/metrics").await, 3);
    }
}

#[tokio::test]
async fn test_armed_replicate_copies_partition_objects() {
    let store = Arc::new(InMemory::new());
    put(&store, "data/events/day=2024-01-01/a.parquet", b"aaaa").await;

    let provider = provider_with_store(&store);
    let events = provider
        .make_resource(&resource_config("events", "data/events", None))
        .unwrap();
    let archive = provider
        .make_resource(&resource_config("archive", "data/archive", None))
        .unwrap();

    let operation = Arc::new(Operation::new(
        "mirror",
        OperationKind::Replicate {
            target: archive.clone(),
        },
        events.clone(),
        provider.clone() as Arc<dyn Provider>,
        Vec::new(),
        Vec::new(),
    ));
    let runtime = Runtime::from_parts(
        vec![provider.clone() as Arc<dyn Provider>],
        vec![operation],
        1,
        true,
    )
    .unwrap();

    run_phases(&runtime).await.unwrap();

    assert_eq!(object_count(&store, "data/events").await, 1);
    assert_eq!(object_count(&store, "data/archive/day=2024-01-01").await, 1);
}

#[tokio::test]
async fn test_empty_source_listing_fails_discovery() {
    let store = Arc::new(InMemory::new());

    let provider = provider_with_store(&store);
    let events = provider
        .make_resource(&resource_config("events", "data/events", None))
        .unwrap();
    let runtime = remove_runtime(&provider, &events, &[], false);

    let result = collect_partitions(&runtime).await;
    assert!(matches!(
        result,
        Err(EngineError::Discovery(DiscoveryError::EmptyResource { .. }))
    ));
}

#[tokio::test]
async fn test_delta_log_aborts_discovery() {
    let store = Arc::new(InMemory::new());
    put(&store, "data/events/_delta_log/000.json", b"{}").await;
    put(&store, "data/events/day=2024-01-01/a.parquet", b"aaaa").await;

    let provider = provider_with_store(&store);
    let events = provider
        .make_resource(&resource_config("events", "data/events", None))
        .unwrap();
    let runtime = remove_runtime(&provider, &events, &[], false);

    let result = collect_partitions(&runtime).await;
    assert!(matches!(
        result,
        Err(EngineError::Discovery(DiscoveryError::DeltaTable { .. }))
    ));
}

#[tokio::test]
async fn test_keyed_discovery_extracts_capture_groups() {
    let store = Arc::new(InMemory::new());
    put(&store, "backups/2024-01-01.tar", b"aaaa").await;
    put(&store, "backups/2024-01-02.tar", b"bb").await;

    let provider = provider_with_store(&store);
    let backups = provider
        .make_resource(&resource_config(
            "backups",
            "backups",
            Some(r"^backups/(\d{4}-\d{2}-\d{2})\.tar$"),
        ))
        .unwrap();
    let runtime = remove_runtime(&provider, &backups, &[], false);

    collect_partitions(&runtime).await.unwrap();

    assert_eq!(backups.partition_count(), 2);
    assert!(backups.contains("2024-01-01"));
}

#[tokio::test]
async fn test_repeated_key_of_keyed_resource_is_ambiguous() {
    let store = Arc::new(InMemory::new());
    put(&store, "backups/2024-01-01/a.tar", b"aaaa").await;
    put(&store, "backups/2024-01-01/b.tar", b"bb").await;

    let provider = provider_with_store(&store);
    let backups = provider
        .make_resource(&resource_config(
            "backups",
            "backups",
            Some(r"^backups/(\d{4}-\d{2}-\d{2})/.*$"),
        ))
        .unwrap();
    let runtime = remove_runtime(&provider, &backups, &[], false);

    let result = collect_partitions(&runtime).await;
    assert!(matches!(
        result,
        Err(EngineError::Discovery(DiscoveryError::AmbiguousKey { .. }))
    ));
}

#[tokio::test]
async fn test_hive_key_must_match_spec_columns() {
    let store = Arc::new(InMemory::new());
    put(&store, "data/events/month=2024-01/a.parquet", b"aaaa").await;

    let provider = provider_with_store(&store);
    let events = provider
        .make_resource(&resource_config("events", "data/events", None))
        .unwrap();
    let runtime = remove_runtime(&provider, &events, &[], false);

    let result = collect_partitions(&runtime).await;
    assert!(matches!(
        result,
        Err(EngineError::Discovery(DiscoveryError::KeyMismatch { .. }))
    ));
}

#[tokio::test]
async fn test_misconfigured_resource_location_is_rejected() {
    let store = Arc::new(InMemory::new());
    let provider = provider_with_store(&store);

    let mut config = resource_config("events", "data/events", None);
    config.table = Some("events".to_string());

    let result = provider.make_resource(&config);
    assert!(matches!(result, Err(ConfigError::MisplacedField { .. })));
}
