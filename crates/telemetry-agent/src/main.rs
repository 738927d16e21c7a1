// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use telemetry_agent::config::AgentConfig;
use telemetry_agent::runtime::Agent;

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_thread_names(false)
        .init();

    let config = AgentConfig::from_env();
    info!(
        target_addr = %config.target_addr,
        workers = config.workers,
        poll_interval_secs = config.poll_interval.as_secs(),
        report_interval_secs = config.report_interval.as_secs(),
        signed = config.secret_key.is_some(),
        "starting telemetry agent"
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_cancel.cancel();
        }
    });

    if let Err(err) = Agent::new(config).run(cancel).await {
        error!(%err, "agent failed");
        std::process::exit(1);
    }
}
