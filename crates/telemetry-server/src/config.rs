// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven server configuration. Thin glue with defaults for
//! every knob.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_SNAPSHOT_PATH: &str = "/tmp/telemetry-snapshot.json";
const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Shared secret for integrity tags; unset means requests are accepted
    /// unsigned and responses are not tagged.
    pub secret_key: Option<Vec<u8>>,
    /// Postgres DSN; unset (or unreachable) selects the in-memory backend.
    pub database_dsn: Option<String>,
    pub snapshot_path: PathBuf,
    /// Zero means every accept synchronously rewrites the snapshot file.
    pub snapshot_interval: Duration,
    pub restore: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let listen_addr =
            env::var("LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
        let secret_key = env::var("SECRET_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(String::into_bytes);
        let database_dsn = env::var("DATABASE_DSN").ok().filter(|d| !d.is_empty());
        let snapshot_path = env::var("SNAPSHOT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SNAPSHOT_PATH));
        let snapshot_interval = env::var("SNAPSHOT_INTERVAL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(
                Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL_SECS),
                Duration::from_secs,
            );
        let restore = env::var("RESTORE")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        ServerConfig {
            listen_addr,
            secret_key,
            database_dsn,
            snapshot_path,
            snapshot_interval,
            restore,
        }
    }
}
