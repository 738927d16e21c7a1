// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

/// A metric point whose shape violates the gauge/counter invariants.
///
/// A batch containing a single invalid point is rejected as a whole, so the
/// caller can retry the batch without double-counting accepted points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("metric id must not be empty")]
    EmptyId,

    #[error("unknown metric kind: {0}")]
    UnknownKind(String),

    #[error("gauge {0} is missing a value")]
    MissingValue(String),

    #[error("counter {0} is missing a delta")]
    MissingDelta(String),

    #[error("gauge {0} must not carry a delta")]
    DeltaOnGauge(String),

    #[error("counter {0} must not carry a value")]
    ValueOnCounter(String),
}

/// Failure of the keyed integrity tag check on a signed payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("integrity tag does not match payload")]
    Mismatch,

    #[error("integrity tag is not valid hex")]
    MalformedTag,
}

/// Errors raised by the wire codec while framing or unframing a batch.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("cannot serialize batch: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("cannot deserialize batch: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("compression failure: {0}")]
    Compress(#[source] std::io::Error),

    #[error("decompression failure: {0}")]
    Decompress(#[source] std::io::Error),
}
