// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Wire codec: canonical JSON bytes, gzip-compressed at best ratio.
//!
//! Signing always happens over the canonical (uncompressed) bytes, so
//! `canonical_bytes` is exposed separately from `encode`.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::CodecError;

/// Stable byte encoding of a batch (or any wire value) before compression.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(CodecError::Serialize)
}

/// Gzip at maximum ratio, matching the transport contract.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data).map_err(CodecError::Compress)?;
    encoder.finish().map_err(CodecError::Compress)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(CodecError::Decompress)?;
    Ok(out)
}

/// Serializes and compresses a value in one step; returns the compressed
/// frame together with the canonical bytes the integrity tag is computed on.
pub fn encode<T: Serialize>(value: &T) -> Result<(Vec<u8>, Vec<u8>), CodecError> {
    let canonical = canonical_bytes(value)?;
    let compressed = compress(&canonical)?;
    Ok((compressed, canonical))
}

pub fn decode<T: DeserializeOwned>(canonical: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(canonical).map_err(CodecError::Deserialize)
}
