// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP plumbing shared by all endpoints: body collection with gzip
//! decoding, integrity verification of inbound payloads and tagging of
//! outbound ones, and the logging response helpers.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use hyper::{http, HeaderMap, Request, Response, StatusCode};
use serde_json::json;
use tracing::{debug, error};

use telemetry_core::signing::SIGNATURE_HEADER;
use telemetry_core::{codec, signing};

pub type HttpResponse = Response<Full<Bytes>>;

/// Does two things:
/// 1. Logs the given message. A success status gets a debug log, anything
///    else an error log.
/// 2. Returns the message in the body of a JSON response with the given
///    status code, as `{"message": message}`.
pub fn log_and_create_http_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(Full::new(Bytes::from(body)))
}

/// Builds a success response and, when a key is configured, tags the body
/// with its integrity header.
pub fn tagged_response(
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
    secret_key: Option<&[u8]>,
) -> http::Result<HttpResponse> {
    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Some(key) = secret_key {
        builder = builder.header(SIGNATURE_HEADER, signing::sign(key, &body));
    }
    builder.body(Full::new(Bytes::from(body)))
}

/// Collects the whole request body, transparently gunzips it when
/// `Content-Encoding: gzip` is set, and verifies the integrity tag against
/// the decompressed bytes.
///
/// Verification only runs when both a local key and a request tag are
/// present; an unsigned request against a keyed server is accepted. Any
/// failure comes back as a ready-made error response.
pub async fn read_request_payload<B>(
    req: Request<B>,
    secret_key: Option<&[u8]>,
) -> Result<Vec<u8>, http::Result<HttpResponse>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();

    let raw = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            return Err(log_and_create_http_response(
                &format!("Error reading request body: {err}"),
                StatusCode::BAD_REQUEST,
            ));
        }
    };

    let payload = if is_gzip(&parts.headers) {
        match codec::decompress(&raw) {
            Ok(decoded) => decoded,
            Err(err) => {
                return Err(log_and_create_http_response(
                    &format!("Error decoding gzip body: {err}"),
                    StatusCode::BAD_REQUEST,
                ));
            }
        }
    } else {
        raw.to_vec()
    };

    match (secret_key, request_tag(&parts.headers)) {
        (Some(key), Some(tag)) => {
            if let Err(err) = signing::verify(key, &payload, tag) {
                return Err(log_and_create_http_response(
                    &format!("Integrity check failed: {err}"),
                    StatusCode::BAD_REQUEST,
                ));
            }
        }
        (Some(_), None) => debug!("keyed server accepted an unsigned request"),
        _ => {}
    }

    Ok(payload)
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
}

fn request_tag(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> http::request::Builder {
        Request::builder().method("POST").uri("/updates/")
    }

    fn build(builder: http::request::Builder, body: Vec<u8>) -> Request<Full<Bytes>> {
        builder.body(Full::new(Bytes::from(body))).unwrap()
    }

    #[tokio::test]
    async fn plain_body_passes_through() {
        let req = build(request(), b"{\"id\":\"X\"}".to_vec());
        let payload = read_request_payload(req, None).await.unwrap();
        assert_eq!(payload, b"{\"id\":\"X\"}");
    }

    #[tokio::test]
    async fn gzip_body_is_decoded() {
        let compressed = codec::compress(b"payload").unwrap();
        let req = build(
            request().header(CONTENT_ENCODING, "gzip"),
            compressed,
        );
        let payload = read_request_payload(req, None).await.unwrap();
        assert_eq!(payload, b"payload");
    }

    #[tokio::test]
    async fn corrupt_gzip_is_bad_request() {
        let req = build(
            request().header(CONTENT_ENCODING, "gzip"),
            b"not gzip at all".to_vec(),
        );
        let err = read_request_payload(req, None).await.unwrap_err().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_tag_over_decompressed_bytes_is_accepted() {
        let key = b"shared-secret";
        let tag = signing::sign(key, b"payload");
        let compressed = codec::compress(b"payload").unwrap();
        let req = build(
            request()
                .header(CONTENT_ENCODING, "gzip")
                .header(SIGNATURE_HEADER, tag),
            compressed,
        );
        let payload = read_request_payload(req, Some(key.as_slice())).await.unwrap();
        assert_eq!(payload, b"payload");
    }

    #[tokio::test]
    async fn wrong_tag_is_bad_request() {
        let key = b"shared-secret";
        let tag = signing::sign(b"other-key", b"payload");
        let req = build(
            request().header(SIGNATURE_HEADER, tag),
            b"payload".to_vec(),
        );
        let err = read_request_payload(req, Some(key.as_slice()))
            .await
            .unwrap_err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unsigned_request_on_keyed_server_is_accepted() {
        let req = build(request(), b"payload".to_vec());
        let payload = read_request_payload(req, Some(b"shared-secret".as_slice()))
            .await
            .unwrap();
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn tagged_response_carries_integrity_header() {
        let response = tagged_response(
            StatusCode::OK,
            "application/json",
            b"{}".to_vec(),
            Some(b"shared-secret".as_slice()),
        )
        .unwrap();
        let tag = response.headers().get(SIGNATURE_HEADER).unwrap();
        assert_eq!(tag.to_str().unwrap(), signing::sign(b"shared-secret", b"{}"));
    }

    #[test]
    fn untagged_response_when_unkeyed() {
        let response =
            tagged_response(StatusCode::OK, "text/plain", b"1.5".to_vec(), None).unwrap();
        assert!(response.headers().get(SIGNATURE_HEADER).is_none());
    }
}
