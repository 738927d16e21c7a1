// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared building blocks for the telemetry pipeline: the metric data model,
//! shape validation, the canonical-JSON + gzip wire codec, and the keyed
//! integrity tag attached to signed payloads.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod codec;
pub mod errors;
pub mod point;
pub mod signing;
pub mod validate;

pub use errors::{IntegrityError, ValidationError};
pub use point::{MetricBatch, MetricKind, MetricPoint};
