// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Transport client: serialize, compress, sign and ship one batch per call
//! with a timeout and a bounded linearly-backed-off retry loop.
//!
//! Delivery is at-most-once: the dispatcher drops a batch whose retries are
//! exhausted, it never re-queues.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::time::sleep;
use tracing::{debug, warn};

use telemetry_core::errors::CodecError;
use telemetry_core::signing::SIGNATURE_HEADER;
use telemetry_core::{codec, signing, MetricBatch};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot build transport client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("cannot encode batch: {0}")]
    Encode(#[from] CodecError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("relay rejected batch with status {0}")]
    Rejected(StatusCode),

    #[error("delivery gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl TransportError {
    /// Connection-class failures and 5xx responses are worth another try;
    /// everything else is terminal for the batch.
    fn is_transient(&self) -> bool {
        match self {
            TransportError::Request(_) => true,
            TransportError::Rejected(status) => status.is_server_error(),
            _ => false,
        }
    }
}

/// Bounded retry with a capped, linearly increasing wait. The total wait is
/// visible up front: sum of `wait_before(1..=max_retries)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_wait: Duration,
    pub increment: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_wait: Duration::from_secs(1),
            increment: Duration::from_secs(2),
            max_wait: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based).
    fn wait_before(&self, retry: u32) -> Duration {
        let wait = self.initial_wait + self.increment * retry.saturating_sub(1);
        wait.min(self.max_wait)
    }
}

/// Seam between the dispatcher and the network.
#[async_trait]
pub trait BatchSink: Send + Sync {
    async fn deliver(&self, batch: MetricBatch) -> Result<(), TransportError>;
}

/// HTTP sink posting gzip-compressed JSON batches to the relay's batch
/// endpoint, with an optional keyed integrity tag.
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    secret_key: Option<Vec<u8>>,
    retry: RetryPolicy,
}

impl HttpSink {
    pub fn new(
        url: String,
        secret_key: Option<Vec<u8>>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;
        Ok(HttpSink {
            client,
            url,
            secret_key,
            retry,
        })
    }

    async fn try_send(&self, body: Vec<u8>, tag: Option<&str>) -> Result<(), TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        if let Some(tag) = tag {
            if let Ok(value) = HeaderValue::from_str(tag) {
                headers.insert(SIGNATURE_HEADER, value);
            }
        }

        let response = self
            .client
            .post(&self.url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Rejected(status))
        }
    }
}

#[async_trait]
impl BatchSink for HttpSink {
    async fn deliver(&self, batch: MetricBatch) -> Result<(), TransportError> {
        // The integrity tag covers the uncompressed canonical bytes.
        let (compressed, canonical) = codec::encode(&batch)?;
        let tag = self
            .secret_key
            .as_deref()
            .map(|key| signing::sign(key, &canonical));

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.try_send(compressed.clone(), tag.as_deref()).await {
                Ok(()) => {
                    debug!(points = batch.len(), "batch delivered");
                    return Ok(());
                }
                Err(err) if err.is_transient() && attempt <= self.retry.max_retries => {
                    let wait = self.retry.wait_before(attempt);
                    warn!(%err, attempt, "transient delivery failure, retrying in {:?}", wait);
                    sleep(wait).await;
                }
                Err(err) if err.is_transient() => {
                    return Err(TransportError::RetriesExhausted {
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_core::MetricPoint;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_wait: Duration::from_millis(5),
            increment: Duration::from_millis(5),
            max_wait: Duration::from_millis(10),
        }
    }

    fn batch() -> MetricBatch {
        vec![
            MetricPoint::gauge("Temp", 36.6),
            MetricPoint::counter("Requests", 5),
        ]
    }

    #[test]
    fn retry_wait_increases_linearly_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.wait_before(1), Duration::from_secs(1));
        assert_eq!(policy.wait_before(2), Duration::from_secs(3));
        assert_eq!(policy.wait_before(3), Duration::from_secs(5));
        assert_eq!(policy.wait_before(4), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn delivers_signed_compressed_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/updates/")
            .match_header("content-encoding", "gzip")
            .match_header("content-type", "application/json")
            .match_header(
                SIGNATURE_HEADER,
                mockito::Matcher::Regex("^[0-9a-f]{64}$".to_string()),
            )
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let sink = HttpSink::new(
            format!("{}/updates/", server.url()),
            Some(b"shared-secret".to_vec()),
            Duration::from_secs(2),
            fast_retry(),
        )
        .unwrap();

        sink.deliver(batch()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unkeyed_sink_sends_unsigned() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/updates/")
            .match_header(SIGNATURE_HEADER, mockito::Matcher::Missing)
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let sink = HttpSink::new(
            format!("{}/updates/", server.url()),
            None,
            Duration::from_secs(2),
            fast_retry(),
        )
        .unwrap();

        sink.deliver(batch()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn exhausts_bounded_retries_on_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/updates/")
            .with_status(500)
            .expect(3) // initial attempt + 2 retries
            .create_async()
            .await;

        let sink = HttpSink::new(
            format!("{}/updates/", server.url()),
            None,
            Duration::from_secs(2),
            fast_retry(),
        )
        .unwrap();

        let err = sink.deliver(batch()).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::RetriesExhausted { attempts: 3, .. }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_are_terminal() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/updates/")
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let sink = HttpSink::new(
            format!("{}/updates/", server.url()),
            None,
            Duration::from_secs(2),
            fast_retry(),
        )
        .unwrap();

        let err = sink.deliver(batch()).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Rejected(StatusCode::BAD_REQUEST)
        ));
        mock.assert_async().await;
    }
}
