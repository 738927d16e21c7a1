// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Environment-driven agent configuration. Thin glue: every knob has a
//! default so the agent starts with no environment at all.

use std::env;
use std::time::Duration;

const DEFAULT_TARGET_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 10;
const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Host:port of the receiving relay.
    pub target_addr: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    /// Number of persistent delivery workers.
    pub workers: usize,
    /// Shared secret for the integrity tag; unset means batches go unsigned.
    pub secret_key: Option<Vec<u8>>,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let target_addr =
            env::var("AGENT_TARGET_ADDR").unwrap_or_else(|_| DEFAULT_TARGET_ADDR.to_string());
        let poll_interval = env_secs("POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS);
        let report_interval = env_secs("REPORT_INTERVAL", DEFAULT_REPORT_INTERVAL_SECS);
        let workers = env::var("WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|w| *w > 0)
            .unwrap_or(DEFAULT_WORKERS);
        let secret_key = env::var("SECRET_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .map(String::into_bytes);

        AgentConfig {
            target_addr,
            poll_interval,
            report_interval,
            workers,
            secret_key,
        }
    }

    /// Target of the batch ingest endpoint.
    pub fn updates_url(&self) -> String {
        format!("http://{}/updates/", self.target_addr)
    }
}

fn env_secs(name: &str, default_secs: u64) -> Duration {
    let secs = env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
