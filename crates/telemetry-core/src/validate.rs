// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Ingress shape validation. Every point is checked before it may touch a
//! store; a single invalid point rejects its whole batch so acceptance stays
//! atomic.

use crate::errors::ValidationError;
use crate::point::{MetricKind, MetricPoint};

/// Checks the gauge/counter shape invariants of one point.
pub fn check_point(point: &MetricPoint) -> Result<(), ValidationError> {
    if point.id.is_empty() {
        return Err(ValidationError::EmptyId);
    }

    match point.kind {
        MetricKind::Gauge => {
            if point.value.is_none() {
                return Err(ValidationError::MissingValue(point.id.clone()));
            }
            if point.delta.is_some() {
                return Err(ValidationError::DeltaOnGauge(point.id.clone()));
            }
        }
        MetricKind::Counter => {
            if point.delta.is_none() {
                return Err(ValidationError::MissingDelta(point.id.clone()));
            }
            if point.value.is_some() {
                return Err(ValidationError::ValueOnCounter(point.id.clone()));
            }
        }
    }

    Ok(())
}

/// Validates every point of a batch; the first invalid point fails the whole
/// batch with no partial acceptance.
pub fn check_batch(batch: &[MetricPoint]) -> Result<(), ValidationError> {
    for point in batch {
        check_point(point)?;
    }
    Ok(())
}
