// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Bounded delivery queue feeding a fixed pool of persistent workers.
//!
//! The queue decouples sampling cadence from delivery cadence. A full queue
//! blocks the producer, so sampling degrades under network pressure instead
//! of silently dropping snapshots. On shutdown the queue is closed and the
//! workers drain every queued batch before exiting.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::transport::BatchSink;
use telemetry_core::MetricBatch;

/// Capacity of the batch queue between the report ticker and the workers.
pub const QUEUE_CAPACITY: usize = 10;

pub struct Dispatcher {
    tx: mpsc::Sender<MetricBatch>,
    workers: JoinSet<()>,
}

impl Dispatcher {
    /// Spawns `workers` persistent delivery tasks sharing one bounded queue.
    pub fn start<S: BatchSink + 'static>(sink: Arc<S>, workers: usize) -> Self {
        let (tx, rx) = mpsc::channel::<MetricBatch>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            let sink = Arc::clone(&sink);
            pool.spawn(async move {
                loop {
                    // Hold the receiver lock only for the dequeue, never
                    // across the network send.
                    let batch = { rx.lock().await.recv().await };
                    let Some(batch) = batch else {
                        break; // queue closed and drained
                    };
                    debug!(worker_id, points = batch.len(), "worker took batch");
                    if let Err(err) = sink.deliver(batch).await {
                        // At-most-once: the batch is dropped, not re-queued.
                        error!(worker_id, %err, "batch dropped after delivery failure");
                    }
                }
                debug!(worker_id, "worker shutdown");
            });
        }

        Dispatcher { tx, workers: pool }
    }

    /// Queues a snapshot for delivery, blocking while the queue is full.
    /// Returns false only once the queue has been closed.
    pub async fn enqueue(&self, batch: MetricBatch) -> bool {
        self.tx.send(batch).await.is_ok()
    }

    /// Closes the queue and blocks until every worker has drained the
    /// remaining batches and exited, bounding shutdown latency.
    pub async fn shutdown(self) {
        let Dispatcher { tx, mut workers } = self;
        drop(tx);
        while workers.join_next().await.is_some() {}
    }
}
