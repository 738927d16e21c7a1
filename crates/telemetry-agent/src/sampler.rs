// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Periodic sampling of OS/runtime counters into a fixed metric catalog.
//!
//! The catalog of point identities is fixed at construction and never grows;
//! `poll` mutates the values in one write-lock critical section and
//! `snapshot` hands out a consistent copy under a read lock.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use rand::Rng;
use rand_distr::StandardNormal;
use sysinfo::System;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use telemetry_core::{MetricBatch, MetricKind, MetricPoint};

pub const POLL_COUNT_ID: &str = "PollCount";
pub const RANDOM_VALUE_ID: &str = "RandomValue";

/// One sampled view of the OS counters the catalog maps onto.
struct OsStats {
    total_memory: f64,
    used_memory: f64,
    available_memory: f64,
    free_memory: f64,
    total_swap: f64,
    used_swap: f64,
    free_swap: f64,
    cpu_usage: f64,
    cpu_count: f64,
    load_one: f64,
    load_five: f64,
    load_fifteen: f64,
    uptime: f64,
}

/// Static name→accessor table over the stats structure. Catalog ids with no
/// entry here are skipped on poll, not an error.
const STAT_READERS: &[(&str, fn(&OsStats) -> f64)] = &[
    ("TotalMemory", |s| s.total_memory),
    ("UsedMemory", |s| s.used_memory),
    ("AvailableMemory", |s| s.available_memory),
    ("FreeMemory", |s| s.free_memory),
    ("TotalSwap", |s| s.total_swap),
    ("UsedSwap", |s| s.used_swap),
    ("FreeSwap", |s| s.free_swap),
    ("CpuUsage", |s| s.cpu_usage),
    ("CpuCount", |s| s.cpu_count),
    ("LoadAvg1", |s| s.load_one),
    ("LoadAvg5", |s| s.load_five),
    ("LoadAvg15", |s| s.load_fifteen),
    ("Uptime", |s| s.uptime),
];

/// Prototype points for every metric the agent reports. Passed explicitly to
/// the sampler constructor; there is no ambient global catalog.
pub fn default_catalog() -> Vec<MetricPoint> {
    let mut catalog: Vec<MetricPoint> = STAT_READERS
        .iter()
        .map(|(id, _)| MetricPoint::gauge(*id, 0.0))
        .collect();
    catalog.push(MetricPoint::gauge(RANDOM_VALUE_ID, 0.0));
    catalog.push(MetricPoint::counter(POLL_COUNT_ID, 0));
    catalog
}

pub struct Sampler {
    table: RwLock<HashMap<String, MetricPoint>>,
    system: Mutex<System>,
    poll_interval: Duration,
}

impl Sampler {
    pub fn new(catalog: Vec<MetricPoint>, poll_interval: Duration) -> Self {
        let table = catalog
            .into_iter()
            .map(|point| (point.id.clone(), point))
            .collect();
        Sampler {
            table: RwLock::new(table),
            system: Mutex::new(System::new_all()),
            poll_interval,
        }
    }

    /// Reads the OS counters and updates every mapped catalog entry, then
    /// bumps the monotonic poll counter and redraws the random gauge.
    pub fn poll(&self) {
        let stats = self.read_os_stats();
        let random = draw_nonzero_normal();

        let mut table = match self.table.write() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };

        for (id, read) in STAT_READERS {
            if let Some(point) = table.get_mut(*id) {
                if point.kind == MetricKind::Gauge {
                    point.value = Some(read(&stats));
                }
            }
        }

        if let Some(point) = table.get_mut(RANDOM_VALUE_ID) {
            point.value = Some(random);
        }

        if let Some(point) = table.get_mut(POLL_COUNT_ID) {
            point.delta = Some(point.delta.unwrap_or(0) + 1);
        }
    }

    /// Consistent copy of the full table.
    pub fn snapshot(&self) -> MetricBatch {
        let table = match self.table.read() {
            Ok(table) => table,
            Err(poisoned) => poisoned.into_inner(),
        };
        table.values().cloned().collect()
    }

    /// Ticker loop driving `poll` until cancellation.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.tick().await; // discard the immediate first tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll();
                    debug!("sampled catalog");
                }
                _ = cancel.cancelled() => {
                    info!("sampler cancelled");
                    return;
                }
            }
        }
    }

    fn read_os_stats(&self) -> OsStats {
        let mut system = match self.system.lock() {
            Ok(system) => system,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_memory();
        system.refresh_cpu_usage();

        let load = System::load_average();
        OsStats {
            total_memory: system.total_memory() as f64,
            used_memory: system.used_memory() as f64,
            available_memory: system.available_memory() as f64,
            free_memory: system.free_memory() as f64,
            total_swap: system.total_swap() as f64,
            used_swap: system.used_swap() as f64,
            free_swap: system.free_swap() as f64,
            cpu_usage: f64::from(system.global_cpu_usage()),
            cpu_count: system.cpus().len() as f64,
            load_one: load.one,
            load_five: load.five,
            load_fifteen: load.fifteen,
            uptime: System::uptime() as f64,
        }
    }
}

/// Standard normal draw, rejecting exactly-zero values.
fn draw_nonzero_normal() -> f64 {
    let mut rng = rand::thread_rng();
    loop {
        let value: f64 = rng.sample(StandardNormal);
        if value != 0.0 {
            return value;
        }
    }
}
