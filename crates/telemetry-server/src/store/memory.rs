// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! RAM-backed store: two maps keyed by id (one per kind) behind a single
//! read-write lock, with snapshot-to-file persistence.
//!
//! Snapshot modes: a positive interval runs a background ticker that
//! rewrites the file periodically (a crash loses at most one interval of
//! updates); a zero interval rewrites the file synchronously on every
//! accept. On startup, when the restore flag is set, the file is replayed
//! through the normal accept path, so restored counters accumulate onto a
//! freshly zeroed map.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use telemetry_core::validate::{check_batch, check_point};
use telemetry_core::{MetricBatch, MetricKind, MetricPoint};

use super::snapshot::SnapshotFile;
use super::StoreError;
use crate::config::ServerConfig;

#[derive(Default)]
struct Tables {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

impl Tables {
    /// Applies one already-validated point: gauge overwrite, counter
    /// accumulation with the key created at zero when absent.
    fn apply(&mut self, point: &MetricPoint) {
        match point.kind {
            MetricKind::Gauge => {
                if let Some(value) = point.value {
                    self.gauges.insert(point.id.clone(), value);
                }
            }
            MetricKind::Counter => {
                if let Some(delta) = point.delta {
                    let sum = self.counters.entry(point.id.clone()).or_insert(0);
                    // saturate rather than wrap on extreme deltas
                    *sum = sum.saturating_add(delta);
                }
            }
        }
    }
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
    snapshot: SnapshotFile,
    snapshot_interval: Duration,
}

impl MemoryStore {
    /// Builds the store and, when configured, restores the previous snapshot
    /// by replaying it through the accept path. Restore failures are logged
    /// and the store starts empty.
    pub async fn open(config: &ServerConfig) -> Self {
        let store = MemoryStore {
            tables: RwLock::new(Tables::default()),
            snapshot: SnapshotFile::new(config.snapshot_path.clone()),
            snapshot_interval: config.snapshot_interval,
        };

        if config.restore {
            match store.snapshot.load().await {
                Ok(batch) => match store.replay(&batch) {
                    Ok(()) => info!(points = batch.len(), "store restored from snapshot"),
                    Err(err) => warn!(%err, "snapshot rejected, starting from an empty table"),
                },
                Err(err) => {
                    warn!(%err, "cannot restore snapshot, starting from an empty table");
                }
            }
        }

        store
    }

    pub async fn accept(&self, point: &MetricPoint) -> Result<(), StoreError> {
        check_point(point)?;
        self.with_tables_mut(|tables| tables.apply(point));
        self.persist_if_synchronous().await;
        Ok(())
    }

    pub async fn accept_batch(&self, batch: &MetricBatch) -> Result<(), StoreError> {
        check_batch(batch)?;
        self.with_tables_mut(|tables| {
            for point in batch {
                tables.apply(point);
            }
        });
        self.persist_if_synchronous().await;
        Ok(())
    }

    pub fn get(&self, id: &str, kind: MetricKind) -> Result<MetricPoint, StoreError> {
        let tables = self.read_tables();
        let point = match kind {
            MetricKind::Gauge => tables.gauges.get(id).map(|v| MetricPoint::gauge(id, *v)),
            MetricKind::Counter => tables.counters.get(id).map(|d| MetricPoint::counter(id, *d)),
        };
        point.ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
            kind,
        })
    }

    pub fn get_all(&self) -> MetricBatch {
        let tables = self.read_tables();
        let mut out = Vec::with_capacity(tables.gauges.len() + tables.counters.len());
        out.extend(
            tables
                .gauges
                .iter()
                .map(|(id, value)| MetricPoint::gauge(id.clone(), *value)),
        );
        out.extend(
            tables
                .counters
                .iter()
                .map(|(id, delta)| MetricPoint::counter(id.clone(), *delta)),
        );
        out
    }

    /// Interval snapshot loop; always flushes a final snapshot on
    /// cancellation so shutdown never loses the tail interval.
    pub async fn run(&self, cancel: CancellationToken) {
        if self.snapshot_interval.is_zero() {
            // Synchronous mode persists on every accept; just wait for
            // shutdown and write the final state once more.
            cancel.cancelled().await;
            self.persist().await;
            return;
        }

        let mut ticker = interval(self.snapshot_interval);
        ticker.tick().await; // discard the immediate first tick

        loop {
            tokio::select! {
                _ = ticker.tick() => self.persist().await,
                _ = cancel.cancelled() => {
                    self.persist().await;
                    info!("final snapshot flushed");
                    return;
                }
            }
        }
    }

    async fn persist(&self) {
        let batch = self.get_all();
        if let Err(err) = self.snapshot.save(&batch).await {
            error!(%err, "snapshot not written");
        }
    }

    async fn persist_if_synchronous(&self) {
        if self.snapshot_interval.is_zero() {
            self.persist().await;
        }
    }

    /// Replays a restored batch through validation and the normal apply
    /// path, without re-triggering synchronous persistence.
    fn replay(&self, batch: &MetricBatch) -> Result<(), StoreError> {
        check_batch(batch)?;
        self.with_tables_mut(|tables| {
            for point in batch {
                tables.apply(point);
            }
        });
        Ok(())
    }

    fn with_tables_mut<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut tables = match self.tables.write() {
            Ok(tables) => tables,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut tables)
    }

    fn read_tables(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        match self.tables.read() {
            Ok(tables) => tables,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use telemetry_core::ValidationError;

    fn config(dir: &tempfile::TempDir, interval_secs: u64, restore: bool) -> ServerConfig {
        ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            secret_key: None,
            database_dsn: None,
            snapshot_path: dir.path().join("snapshot.json"),
            snapshot_interval: Duration::from_secs(interval_secs),
            restore,
        }
    }

    fn detached_config() -> ServerConfig {
        ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            secret_key: None,
            database_dsn: None,
            snapshot_path: PathBuf::from("/nonexistent/never.json"),
            snapshot_interval: Duration::from_secs(300),
            restore: false,
        }
    }

    #[tokio::test]
    async fn gauge_accept_then_get_returns_written_value() {
        let store = MemoryStore::open(&detached_config()).await;
        store.accept(&MetricPoint::gauge("Temp", 36.6)).await.unwrap();
        store.accept(&MetricPoint::gauge("Temp", 35.1)).await.unwrap();

        let got = store.get("Temp", MetricKind::Gauge).unwrap();
        assert_eq!(got.value, Some(35.1));
        assert_eq!(got.text_value().unwrap(), "35.1");
    }

    #[tokio::test]
    async fn counter_accumulates_running_sum() {
        let store = MemoryStore::open(&detached_config()).await;
        store.accept(&MetricPoint::counter("Requests", 5)).await.unwrap();
        store.accept(&MetricPoint::counter("Requests", 3)).await.unwrap();

        let got = store.get("Requests", MetricKind::Counter).unwrap();
        assert_eq!(got.delta, Some(8));
    }

    #[tokio::test]
    async fn same_delta_twice_doubles_not_dedupes() {
        let store = MemoryStore::open(&detached_config()).await;
        let point = MetricPoint::counter("Hits", 7);
        store.accept(&point).await.unwrap();
        store.accept(&point).await.unwrap();

        let got = store.get("Hits", MetricKind::Counter).unwrap();
        assert_eq!(got.delta, Some(14));
    }

    #[tokio::test]
    async fn counter_saturates_instead_of_overflowing() {
        let store = MemoryStore::open(&detached_config()).await;
        store
            .accept(&MetricPoint::counter("Huge", i64::MAX))
            .await
            .unwrap();
        store.accept(&MetricPoint::counter("Huge", 1)).await.unwrap();

        let got = store.get("Huge", MetricKind::Counter).unwrap();
        assert_eq!(got.delta, Some(i64::MAX));
    }

    #[tokio::test]
    async fn miss_is_not_found() {
        let store = MemoryStore::open(&detached_config()).await;
        let err = store.get("Absent", MetricKind::Gauge).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn same_id_different_kind_are_distinct_keys() {
        let store = MemoryStore::open(&detached_config()).await;
        store.accept(&MetricPoint::gauge("X", 1.5)).await.unwrap();
        store.accept(&MetricPoint::counter("X", 2)).await.unwrap();

        assert_eq!(store.get("X", MetricKind::Gauge).unwrap().value, Some(1.5));
        assert_eq!(store.get("X", MetricKind::Counter).unwrap().delta, Some(2));
    }

    #[tokio::test]
    async fn invalid_point_in_batch_changes_nothing() {
        let store = MemoryStore::open(&detached_config()).await;
        store.accept(&MetricPoint::gauge("Kept", 1.0)).await.unwrap();

        let batch = vec![
            MetricPoint::gauge("A", 1.0),
            MetricPoint::counter("B", 2),
            MetricPoint::gauge("", 3.0),
        ];
        let err = store.accept_batch(&batch).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::EmptyId)
        ));

        // zero state change: only the pre-existing point remains
        assert_eq!(store.get_all().len(), 1);
        assert!(store.get("A", MetricKind::Gauge).is_err());
        assert!(store.get("B", MetricKind::Counter).is_err());
    }

    #[tokio::test]
    async fn get_all_returns_every_unique_key() {
        let store = MemoryStore::open(&detached_config()).await;
        let batch = vec![
            MetricPoint::gauge("G1", 1.0),
            MetricPoint::gauge("G2", 2.0),
            MetricPoint::counter("C1", 3),
        ];
        store.accept_batch(&batch).await.unwrap();

        let mut all = store.get_all();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].value, Some(1.0));
        assert_eq!(all[2].delta, Some(3));
    }

    #[tokio::test]
    async fn concurrent_accepts_on_distinct_keys_all_land() {
        let store = Arc::new(MemoryStore::open(&detached_config()).await);
        let mut tasks = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store
                    .accept(&MetricPoint::gauge(format!("G{i}"), i as f64))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(store.get_all().len(), 32);
    }

    #[tokio::test]
    async fn concurrent_accepts_on_one_counter_sum_deterministically() {
        let store = Arc::new(MemoryStore::open(&detached_config()).await);
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.accept(&MetricPoint::counter("Total", 2)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        let got = store.get("Total", MetricKind::Counter).unwrap();
        assert_eq!(got.delta, Some(100));
    }

    #[tokio::test]
    async fn synchronous_mode_persists_every_accept() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::open(&config(&dir, 0, false)).await;
        store.accept(&MetricPoint::counter("C", 4)).await.unwrap();

        let on_disk = SnapshotFile::new(dir.path().join("snapshot.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(on_disk, vec![MetricPoint::counter("C", 4)]);
    }

    #[tokio::test]
    async fn restore_reproduces_get_all_content() {
        let dir = tempfile::tempdir().unwrap();

        let first = MemoryStore::open(&config(&dir, 0, false)).await;
        first.accept(&MetricPoint::gauge("Temp", 36.6)).await.unwrap();
        first.accept(&MetricPoint::counter("Requests", 8)).await.unwrap();
        let mut before = first.get_all();

        let second = MemoryStore::open(&config(&dir, 0, true)).await;
        let mut after = second.get_all();

        before.sort_by(|a, b| a.id.cmp(&b.id));
        after.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn restored_counters_accumulate_further_deltas() {
        let dir = tempfile::tempdir().unwrap();

        let first = MemoryStore::open(&config(&dir, 0, false)).await;
        first.accept(&MetricPoint::counter("Requests", 8)).await.unwrap();
        drop(first);

        let second = MemoryStore::open(&config(&dir, 0, true)).await;
        second
            .accept(&MetricPoint::counter("Requests", 2))
            .await
            .unwrap();
        let got = second.get("Requests", MetricKind::Counter).unwrap();
        assert_eq!(got.delta, Some(10));
    }

    #[tokio::test]
    async fn final_flush_covers_points_accepted_while_handlers_drain() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::open(&config(&dir, 300, false)).await);
        store.accept(&MetricPoint::counter("Requests", 5)).await.unwrap();

        let store_cancel = CancellationToken::new();
        let runner = {
            let store = Arc::clone(&store);
            let store_cancel = store_cancel.clone();
            tokio::spawn(async move { store.run(store_cancel).await })
        };

        // The accept loop has already stopped but a draining handler still
        // lands one more point before the store token fires.
        store.accept(&MetricPoint::counter("Requests", 3)).await.unwrap();
        store_cancel.cancel();
        runner.await.unwrap();

        let on_disk = SnapshotFile::new(dir.path().join("snapshot.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(on_disk, vec![MetricPoint::counter("Requests", 8)]);
    }

    #[tokio::test]
    async fn run_flushes_final_snapshot_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::open(&config(&dir, 300, false)).await);
        store.accept(&MetricPoint::gauge("G", 9.0)).await.unwrap();

        let cancel = CancellationToken::new();
        let runner = {
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            tokio::spawn(async move { store.run(cancel).await })
        };
        cancel.cancel();
        runner.await.unwrap();

        let on_disk = SnapshotFile::new(dir.path().join("snapshot.json"))
            .load()
            .await
            .unwrap();
        assert_eq!(on_disk, vec![MetricPoint::gauge("G", 9.0)]);
    }
}
