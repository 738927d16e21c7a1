// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use telemetry_server::config::ServerConfig;
use telemetry_server::server::Relay;
use telemetry_server::store::Store;

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_thread_names(false)
        .init();

    let config = ServerConfig::from_env();
    info!(
        listen_addr = %config.listen_addr,
        keyed = config.secret_key.is_some(),
        database = config.database_dsn.is_some(),
        "starting telemetry relay"
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_cancel.cancel();
        }
    });

    let store = Arc::new(Store::open(&config).await);

    // The store outlives the accept loop: its own token fires only after
    // every in-flight handler has finished, so the final snapshot (or pool
    // close) sees every accepted point.
    let store_cancel = CancellationToken::new();
    let maintenance = {
        let store = Arc::clone(&store);
        let store_cancel = store_cancel.clone();
        tokio::spawn(async move { store.run(store_cancel).await })
    };

    let relay = Relay::new(config, Arc::clone(&store));
    let served = relay.serve(cancel).await;

    store_cancel.cancel();
    if let Err(err) = maintenance.await {
        error!(%err, "maintenance task failed");
    }

    if let Err(err) = served {
        error!(%err, "relay failed");
        std::process::exit(1);
    }
}
