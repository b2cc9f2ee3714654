//! SQL provider behavior against a temp-file SQLite database.

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;
use tempfile::TempDir;

use common::config::{ProviderConfig, ProviderKind, ResourceConfig};
use common::partition::values::{ColumnSpec, ColumnType};
use common::provider::Provider;
use sweeper::exclude::CurrentTimestampExclude;
use sweeper::execution::{
    check_operation_targets, collect_partitions, create_execution_locks,
    execute_armed_actions_with_timeout, filter_kept_partitions,
};
use sweeper::operations::{Operation, OperationError, OperationKind};
use sweeper::providers::SqlProvider;
use sweeper::runtime::Runtime;

struct SqliteFixture {
    _dir: TempDir,
    dsn: String,
}

impl SqliteFixture {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let dsn = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("curator.db").display()
        );

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&dsn)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE events (day TEXT NOT NULL, payload INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        for (day, payload) in [
            ("2024-01-01", 1),
            ("2024-01-01", 2),
            ("2024-01-02", 3),
        ] {
            sqlx::query("INSERT INTO events (day, payload) VALUES (?, ?)")
                .bind(day)
                .bind(payload)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool.close().await;

        Self { _dir: dir, dsn }
    }

    async fn row_count(&self) -> i64 {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&self.dsn)
            .await
            .unwrap();
        let row = sqlx::query("SELECT COUNT(*) FROM events")
            .fetch_one(&pool)
            .await
            .unwrap();
        let count: i64 = row.get(0);
        pool.close().await;
        count
    }
}

fn sql_provider(dsn: &str) -> Arc<SqlProvider> {
    Arc::new(SqlProvider::new(&ProviderConfig {
        name: "warehouse".to_string(),
        kind: ProviderKind::Sql,
        dsn: dsn.to_string(),
        resource_concurrency: 1,
    }))
}

fn events_resource_config() -> ResourceConfig {
    ResourceConfig {
        name: "events".to_string(),
        provider: "warehouse".to_string(),
        columns: vec![ColumnSpec {
            name: "day".to_string(),
            kind: ColumnType::Date,
        }],
        prefix: None,
        regex: None,
        table: Some("events".to_string()),
    }
}

#[tokio::test]
async fn test_sql_discovery_enumerates_distinct_partitions() {
    let fixture = SqliteFixture::new().await;
    let provider = sql_provider(&fixture.dsn);
    let events = provider.make_resource(&events_resource_config()).unwrap();

    provider.check_access().await.unwrap();
    let rows = provider.discover(&events).await.unwrap();

    assert_eq!(rows, 2);
    assert_eq!(events.partition_count(), 2);
    assert!(events.contains("2024-01-01"));
    assert!(events.contains("2024-01-02"));

    // query-engine partitions carry no aggregates
    assert!(events.partition("2024-01-01").unwrap().stats().is_none());
}

#[tokio::test]
async fn test_time_excludes_fail_for_sql_partitions() {
    let fixture = SqliteFixture::new().await;
    let provider = sql_provider(&fixture.dsn);
    let events = provider.make_resource(&events_resource_config()).unwrap();
    provider.discover(&events).await.unwrap();

    let operation = Operation::new(
        "expire",
        OperationKind::Remove,
        events,
        provider.clone() as Arc<dyn Provider>,
        vec![Box::new(CurrentTimestampExclude::new(
            chrono::TimeDelta::MIN,
            chrono::TimeDelta::zero(),
        ))],
        Vec::new(),
    );

    let result = operation.kept_partitions();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_armed_remove_deletes_partition_rows() {
    let fixture = SqliteFixture::new().await;
    let provider = sql_provider(&fixture.dsn);
    let events = provider.make_resource(&events_resource_config()).unwrap();

    let operation = Arc::new(Operation::new(
        "expire",
        OperationKind::Remove,
        events,
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

    collect_partitions(&runtime).await.unwrap();
    create_execution_locks(&runtime).await.unwrap();
    filter_kept_partitions(&runtime).await.unwrap();
    check_operation_targets(&runtime).await.unwrap();
    execute_armed_actions_with_timeout(&runtime, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(fixture.row_count().await, 0);
}

#[tokio::test]
async fn test_replicate_is_unsupported_for_sql_providers() {
    let fixture = SqliteFixture::new().await;
    let provider = sql_provider(&fixture.dsn);
    let events = provider.make_resource(&events_resource_config()).unwrap();

    let mut archive_config = events_resource_config();
    archive_config.name = "archive".to_string();
    archive_config.table = Some("archive".to_string());
    let archive = provider.make_resource(&archive_config).unwrap();

    let operation = Operation::new(
        "mirror",
        OperationKind::Replicate { target: archive },
        events,
        provider.clone() as Arc<dyn Provider>,
        Vec::new(),
        Vec::new(),
    );

    let result = operation.prepare_actions().await;
    assert!(matches!(
        result,
        Err(OperationError::UnsupportedCapability {
            capability: "copy",
            ..
        })
    ));
}
