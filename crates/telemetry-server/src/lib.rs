// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Server side of the telemetry pipeline.
//!
//! Inbound requests are validated and checked for integrity, then converge
//! on one shared [`store::Store`]: counters accumulate, gauges overwrite,
//! batches are accepted atomically. The store is backed either by Postgres
//! or by an in-memory table with snapshot-to-file persistence; the backend
//! is chosen once at startup and never re-evaluated.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod config;
pub mod handlers;
pub mod http_utils;
pub mod server;
pub mod store;
