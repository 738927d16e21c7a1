// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! The wire-level metric point: a named gauge or counter sample.
//!
//! A gauge carries `value` and is overwritten on accept; a counter carries
//! `delta` and the store keeps the running sum. Absent fields are omitted
//! from the JSON encoding.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Aggregation kind of a metric point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    #[display("gauge")]
    Gauge,
    #[display("counter")]
    Counter,
}

impl FromStr for MetricKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

/// One sampled metric value as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// An unordered collection of points sent or accepted together. Duplicate
/// keys are allowed at the transport layer.
pub type MetricBatch = Vec<MetricPoint>;

impl MetricPoint {
    /// Builds a valid gauge point.
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        MetricPoint {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    /// Builds a valid counter point.
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        MetricPoint {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: None,
            value: None,
        }
        .with_delta(delta)
    }

    fn with_delta(mut self, delta: i64) -> Self {
        self.delta = Some(delta);
        self
    }

    /// Parses the path-segment form `{kind}/{id}/{raw}`: the raw value is a
    /// float for gauges and an integer for counters.
    pub fn from_text(kind: &str, id: &str, raw: &str) -> Result<Self, ValidationError> {
        if id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        match MetricKind::from_str(kind)? {
            MetricKind::Gauge => {
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| ValidationError::MissingValue(id.to_string()))?;
                Ok(MetricPoint::gauge(id, value))
            }
            MetricKind::Counter => {
                let delta = raw
                    .parse::<i64>()
                    .map_err(|_| ValidationError::MissingDelta(id.to_string()))?;
                Ok(MetricPoint::counter(id, delta))
            }
        }
    }

    /// Plain-text rendering of the current value, `None` if the point is
    /// malformed for its kind.
    pub fn text_value(&self) -> Option<String> {
        match self.kind {
            MetricKind::Gauge => self.value.map(|v| v.to_string()),
            MetricKind::Counter => self.delta.map(|d| d.to_string()),
        }
    }

    /// The aggregation key owned by the store.
    pub fn key(&self) -> (&str, MetricKind) {
        (&self.id, self.kind)
    }
}
