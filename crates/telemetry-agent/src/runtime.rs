// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Agent wiring: one sampling task, one report/dispatch loop, W delivery
//! workers, all observing one cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AgentConfig;
use crate::dispatcher::Dispatcher;
use crate::sampler::{default_catalog, Sampler};
use crate::transport::{HttpSink, RetryPolicy, TransportError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Agent { config }
    }

    /// Runs until cancellation. On shutdown the report loop stops, the queue
    /// closes, and queued batches are drained to completion before return.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), TransportError> {
        let sink = Arc::new(HttpSink::new(
            self.config.updates_url(),
            self.config.secret_key.clone(),
            REQUEST_TIMEOUT,
            RetryPolicy::default(),
        )?);
        let dispatcher = Dispatcher::start(sink, self.config.workers);
        let sampler = Arc::new(Sampler::new(default_catalog(), self.config.poll_interval));

        let sampling_task = {
            let sampler = Arc::clone(&sampler);
            let cancel = cancel.clone();
            tokio::spawn(async move { sampler.run(cancel).await })
        };

        let mut report_ticker = interval(self.config.report_interval);
        report_ticker.tick().await; // discard the immediate first tick

        loop {
            tokio::select! {
                _ = report_ticker.tick() => {
                    let batch = sampler.snapshot();
                    // Blocks while the queue is full; cadence degrades
                    // rather than dropping the snapshot.
                    if !dispatcher.enqueue(batch).await {
                        break;
                    }
                }
                _ = cancel.cancelled() => {
                    info!("report loop cancelled");
                    break;
                }
            }
        }

        info!("closing delivery queue and draining workers");
        dispatcher.shutdown().await;
        let _ = sampling_task.await;
        info!("agent stopped");
        Ok(())
    }
}
