// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Agent side of the telemetry pipeline.
//!
//! A sampling task periodically refreshes a fixed catalog of OS/runtime
//! metrics; a report task snapshots the catalog into a bounded queue; a pool
//! of delivery workers serializes, compresses, signs and ships each batch to
//! the relay with bounded retries.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod config;
pub mod dispatcher;
pub mod runtime;
pub mod sampler;
pub mod transport;
