use std::time::Duration;

use sea_orm::{ConnectionTrait, DbBackend, Statement};
use tempfile::TempDir;
use trackmon_common::{Metric, MetricKind};

use crate::{DbStorage, MemStorage, Repository, StorageError};

fn mem() -> std::sync::Arc<MemStorage> {
    MemStorage::open(false, None, None).unwrap()
}

async fn sqlite(dir: &TempDir) -> DbStorage {
    let dsn = format!("sqlite://{}/metrics.sqlite?mode=rwc", dir.path().display());
    DbStorage::open(&dsn).await.unwrap()
}

#[tokio::test]
async fn counters_accumulate_across_calls() {
    let store = mem();
    for delta in [1i64, 2, 3] {
        store
            .update_metric("1.1.1.1", vec![Metric::counter("PollCount", delta)])
            .await
            .unwrap();
    }
    let got = store
        .get_metric("1.1.1.1", MetricKind::Counter, "PollCount")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.delta, Some(6));
}

#[tokio::test]
async fn gauges_replace_previous_value() {
    let store = mem();
    store
        .update_metric("1.1.1.1", vec![Metric::gauge("Alloc", 1.0)])
        .await
        .unwrap();
    store
        .update_metric("1.1.1.1", vec![Metric::gauge("Alloc", 2.5)])
        .await
        .unwrap();
    let got = store
        .get_metric("1.1.1.1", MetricKind::Gauge, "Alloc")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.value, Some(2.5));
}

#[tokio::test]
async fn batch_applies_every_record() {
    let store = mem();
    store
        .update_metric(
            "1.1.1.1",
            vec![
                Metric::counter("a", 1),
                Metric::gauge("b", 2.0),
                Metric::counter("a", 2),
            ],
        )
        .await
        .unwrap();
    let all = store.metrics("1.1.1.1").await.unwrap();
    let mm = &all["1.1.1.1"];
    assert_eq!(mm.len(), 2);
    assert_eq!(
        store
            .get_metric("1.1.1.1", MetricKind::Counter, "a")
            .await
            .unwrap()
            .unwrap()
            .delta,
        Some(3)
    );
}

#[tokio::test]
async fn update_validation_errors() {
    let store = mem();
    assert!(matches!(
        store
            .update_metric("", vec![Metric::counter("a", 1)])
            .await,
        Err(StorageError::WrongTarget)
    ));
    assert!(matches!(
        store
            .update_metric("1.1.1.1", vec![Metric::counter("", 1)])
            .await,
        Err(StorageError::WrongMetricId)
    ));
    let mut hollow = Metric::counter("a", 1);
    hollow.delta = None;
    assert!(matches!(
        store.update_metric("1.1.1.1", vec![hollow]).await,
        Err(StorageError::WrongMetricValue)
    ));
}

#[tokio::test]
async fn absent_metric_is_none() {
    let store = mem();
    let got = store
        .get_metric("1.1.1.1", MetricKind::Counter, "nope")
        .await
        .unwrap();
    assert!(got.is_none());
}

#[tokio::test]
async fn listing_is_sorted_per_target() {
    let store = mem();
    store
        .update_metric(
            "1.1.1.1",
            vec![Metric::gauge("zzz", 1.0), Metric::counter("aaa", 1)],
        )
        .await
        .unwrap();
    let list = store.list().await.unwrap();
    let lines = &list["1.1.1.1"];
    assert_eq!(lines[0], "counter - aaa - 1");
    assert_eq!(lines[1], "gauge - zzz - 1");
}

#[tokio::test]
async fn metrics_filters_by_target() {
    let store = mem();
    store
        .update_metric("1.1.1.1", vec![Metric::counter("a", 1)])
        .await
        .unwrap();
    store
        .update_metric("2.2.2.2", vec![Metric::counter("a", 1)])
        .await
        .unwrap();
    assert_eq!(store.metrics("").await.unwrap().len(), 2);
    let one = store.metrics("1.1.1.1").await.unwrap();
    assert_eq!(one.len(), 1);
    assert!(one.contains_key("1.1.1.1"));
}

#[tokio::test]
async fn snapshot_restores_full_map() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("snapshot.json");

    let store = MemStorage::open(false, None, Some(path.clone())).unwrap();
    store
        .update_metric(
            "1.1.1.1",
            vec![Metric::counter("PollCount", 5), Metric::gauge("Alloc", 1.25)],
        )
        .await
        .unwrap();
    store
        .update_metric("2.2.2.2", vec![Metric::gauge("Free", 9.0)])
        .await
        .unwrap();
    store.save().unwrap();

    let restored = MemStorage::open(true, None, Some(path)).unwrap();
    assert_eq!(
        restored.metrics("").await.unwrap(),
        store.metrics("").await.unwrap()
    );
}

#[tokio::test]
async fn snapshot_missing_file_is_tolerated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.json");
    let store = MemStorage::open(true, None, Some(path)).unwrap();
    assert!(store.metrics("").await.unwrap().is_empty());
}

#[tokio::test]
async fn interval_ticker_flushes_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticker.json");
    let store = MemStorage::open(
        false,
        Some(Duration::from_millis(50)),
        Some(path.clone()),
    )
    .unwrap();
    store
        .update_metric("1.1.1.1", vec![Metric::counter("a", 1)])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(path.exists());
}

// -- relational impl ------------------------------------------------------

#[tokio::test]
async fn db_batch_accumulates_into_single_row() {
    let dir = TempDir::new().unwrap();
    let store = sqlite(&dir).await;
    store
        .update_metric(
            "1.1.1.1",
            vec![
                Metric::counter("A", 1),
                Metric::counter("A", 2),
                Metric::counter("A", 3),
            ],
        )
        .await
        .unwrap();
    let got = store
        .get_metric("1.1.1.1", MetricKind::Counter, "A")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.delta, Some(6));

    let all = store.metrics("1.1.1.1").await.unwrap();
    assert_eq!(all["1.1.1.1"].len(), 1);
}

#[tokio::test]
async fn db_counters_accumulate_and_gauges_replace() {
    let dir = TempDir::new().unwrap();
    let store = sqlite(&dir).await;
    store
        .update_metric("1.1.1.1", vec![Metric::counter("c", 4)])
        .await
        .unwrap();
    store
        .update_metric("1.1.1.1", vec![Metric::counter("c", 5)])
        .await
        .unwrap();
    store
        .update_metric("1.1.1.1", vec![Metric::gauge("g", 1.0)])
        .await
        .unwrap();
    store
        .update_metric("1.1.1.1", vec![Metric::gauge("g", 7.5)])
        .await
        .unwrap();

    let c = store
        .get_metric("1.1.1.1", MetricKind::Counter, "c")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.delta, Some(9));
    let g = store
        .get_metric("1.1.1.1", MetricKind::Gauge, "g")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(g.value, Some(7.5));
}

#[tokio::test]
async fn db_absent_metric_is_no_rows() {
    let dir = TempDir::new().unwrap();
    let store = sqlite(&dir).await;
    assert!(matches!(
        store
            .get_metric("1.1.1.1", MetricKind::Counter, "nope")
            .await,
        Err(StorageError::NoRows)
    ));
}

#[tokio::test]
async fn db_ping_is_alive() {
    let dir = TempDir::new().unwrap();
    let store = sqlite(&dir).await;
    store.ping().await.unwrap();
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let dsn = format!("sqlite://{}/metrics.sqlite?mode=rwc", dir.path().display());

    let first = DbStorage::open(&dsn).await.unwrap();
    first
        .update_metric("1.1.1.1", vec![Metric::counter("a", 1)])
        .await
        .unwrap();
    first.close().await.unwrap();

    // a second open replays the migrator against the same file
    let second = DbStorage::open(&dsn).await.unwrap();
    let got = second
        .get_metric("1.1.1.1", MetricKind::Counter, "a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.delta, Some(1));

    let row = second
        .db()
        .query_one(Statement::from_string(
            DbBackend::Sqlite,
            "SELECT COUNT(*) AS cnt FROM seaql_migrations".to_string(),
        ))
        .await
        .unwrap()
        .unwrap();
    let applied: i64 = row.try_get("", "cnt").unwrap();
    assert_eq!(applied, 1);
}
