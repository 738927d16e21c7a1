// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Keyed integrity tags: HMAC-SHA256 over the uncompressed canonical bytes,
//! carried hex-encoded in the `HashSHA256` request/response header.
//!
//! This provides integrity only, not confidentiality. Verification happens
//! iff both sides carry a key and a tag; either side missing its half leaves
//! the message unsigned and accepted.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::IntegrityError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded integrity tag.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Computes the hex-encoded tag over `message` with the shared `key`.
pub fn sign(key: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of any length, so Mac construction cannot fail.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded tag in constant time.
pub fn verify(key: &[u8], message: &[u8], tag_hex: &str) -> Result<(), IntegrityError> {
    let tag = hex::decode(tag_hex).map_err(|_| IntegrityError::MalformedTag)?;
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).unwrap_or_else(|_| unreachable!());
    mac.update(message);
    mac.verify_slice(&tag).map_err(|_| IntegrityError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_accepts() {
        let tag = sign(b"shared-secret", b"payload");
        assert!(verify(b"shared-secret", b"payload", &tag).is_ok());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let tag = sign(b"shared-secret", b"payload");
        assert_eq!(
            verify(b"other-secret", b"payload", &tag),
            Err(IntegrityError::Mismatch)
        );
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let tag = sign(b"shared-secret", b"payload");
        assert_eq!(
            verify(b"shared-secret", b"tampered", &tag),
            Err(IntegrityError::Mismatch)
        );
    }

    #[test]
    fn verify_rejects_non_hex_tag() {
        assert_eq!(
            verify(b"shared-secret", b"payload", "zzzz"),
            Err(IntegrityError::MalformedTag)
        );
    }

    #[test]
    fn tag_is_stable_hex() {
        let tag = sign(b"k", b"m");
        assert_eq!(tag.len(), 64);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(tag, sign(b"k", b"m"));
    }
}
