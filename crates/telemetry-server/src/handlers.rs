// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! One async handler per endpoint. All of them converge on the shared
//! [`Store`]; the JSON read-back endpoints respond with the stored
//! aggregate, not the inbound point, so a counter update answers with the
//! new running sum.

use hyper::body::Body;
use hyper::{http, Request, StatusCode};

use telemetry_core::{MetricBatch, MetricKind, MetricPoint};

use crate::http_utils::{
    log_and_create_http_response, read_request_payload, tagged_response, HttpResponse,
};
use crate::store::{Store, StoreError};

fn error_response(context: &str, err: &StoreError) -> http::Result<HttpResponse> {
    let status = match err {
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    log_and_create_http_response(&format!("{context}: {err}"), status)
}

/// GET `/`: every stored metric as an HTML listing, one `id: value` line
/// per point, ordered by kind then id.
pub async fn index(store: &Store, secret_key: Option<&[u8]>) -> http::Result<HttpResponse> {
    let mut points = match store.get_all().await {
        Ok(points) => points,
        Err(err) => return error_response("Error listing metrics", &err),
    };
    points.sort_by(|a, b| (a.kind, &a.id).cmp(&(b.kind, &b.id)));

    let mut html = String::from("<html><body>");
    for point in &points {
        if let Some(value) = point.text_value() {
            html.push_str(&format!("{}: {}<br>", point.id, value));
        }
    }
    html.push_str("</body></html>");

    tagged_response(StatusCode::OK, "text/html", html.into_bytes(), secret_key)
}

/// GET `/ping`: backend liveness probe.
pub async fn ping(store: &Store) -> http::Result<HttpResponse> {
    match store.health_check().await {
        Ok(()) => log_and_create_http_response("pong", StatusCode::OK),
        Err(err) => error_response("Store unavailable", &err),
    }
}

/// POST `/update/{kind}/{id}/{value}`: single point in path-segment form.
pub async fn update_from_path(
    store: &Store,
    kind: &str,
    id: &str,
    raw: &str,
) -> http::Result<HttpResponse> {
    let point = match MetricPoint::from_text(kind, id, raw) {
        Ok(point) => point,
        Err(err) => {
            return log_and_create_http_response(
                &format!("Error parsing metric path: {err}"),
                StatusCode::BAD_REQUEST,
            );
        }
    };
    match store.accept(&point).await {
        Ok(()) => log_and_create_http_response("metric accepted", StatusCode::OK),
        Err(err) => error_response("Error accepting metric", &err),
    }
}

/// POST `/update/`: single point as JSON; answers with the stored
/// aggregate for that key.
pub async fn update_json<B>(
    store: &Store,
    secret_key: Option<&[u8]>,
    req: Request<B>,
) -> http::Result<HttpResponse>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let payload = match read_request_payload(req, secret_key).await {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    let point: MetricPoint = match serde_json::from_slice(&payload) {
        Ok(point) => point,
        Err(err) => {
            return log_and_create_http_response(
                &format!("Error parsing metric JSON: {err}"),
                StatusCode::BAD_REQUEST,
            );
        }
    };

    if let Err(err) = store.accept(&point).await {
        return error_response("Error accepting metric", &err);
    }
    let stored = match store.get(&point.id, point.kind).await {
        Ok(stored) => stored,
        Err(err) => return error_response("Error reading back metric", &err),
    };
    respond_with_point(&stored, secret_key)
}

/// POST `/updates/`: JSON array of points, accepted atomically.
pub async fn updates_batch<B>(
    store: &Store,
    secret_key: Option<&[u8]>,
    req: Request<B>,
) -> http::Result<HttpResponse>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let payload = match read_request_payload(req, secret_key).await {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    let batch: MetricBatch = match serde_json::from_slice(&payload) {
        Ok(batch) => batch,
        Err(err) => {
            return log_and_create_http_response(
                &format!("Error parsing batch JSON: {err}"),
                StatusCode::BAD_REQUEST,
            );
        }
    };

    match store.accept_batch(&batch).await {
        Ok(()) => log_and_create_http_response(
            &format!("batch of {} points accepted", batch.len()),
            StatusCode::OK,
        ),
        Err(err) => error_response("Error accepting batch", &err),
    }
}

/// GET `/value/{kind}/{id}`: current value in plain text.
pub async fn value_text(
    store: &Store,
    secret_key: Option<&[u8]>,
    kind: &str,
    id: &str,
) -> http::Result<HttpResponse> {
    let kind: MetricKind = match kind.parse() {
        Ok(kind) => kind,
        Err(err) => {
            return log_and_create_http_response(
                &format!("Error parsing metric path: {err}"),
                StatusCode::BAD_REQUEST,
            );
        }
    };
    let point = match store.get(id, kind).await {
        Ok(point) => point,
        Err(err) => return error_response("Error reading metric", &err),
    };
    match point.text_value() {
        Some(value) => {
            tagged_response(StatusCode::OK, "text/plain", value.into_bytes(), secret_key)
        }
        None => log_and_create_http_response(
            &format!("metric {id} has no value"),
            StatusCode::NOT_FOUND,
        ),
    }
}

/// POST `/value/`: JSON query `{id, type}`; answers with the stored point.
pub async fn value_json<B>(
    store: &Store,
    secret_key: Option<&[u8]>,
    req: Request<B>,
) -> http::Result<HttpResponse>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let payload = match read_request_payload(req, secret_key).await {
        Ok(payload) => payload,
        Err(response) => return response,
    };
    let query: MetricPoint = match serde_json::from_slice(&payload) {
        Ok(query) => query,
        Err(err) => {
            return log_and_create_http_response(
                &format!("Error parsing metric query: {err}"),
                StatusCode::BAD_REQUEST,
            );
        }
    };

    match store.get(&query.id, query.kind).await {
        Ok(stored) => respond_with_point(&stored, secret_key),
        Err(err) => error_response("Error reading metric", &err),
    }
}

fn respond_with_point(
    point: &MetricPoint,
    secret_key: Option<&[u8]>,
) -> http::Result<HttpResponse> {
    match serde_json::to_vec(point) {
        Ok(body) => tagged_response(StatusCode::OK, "application/json", body, secret_key),
        Err(err) => log_and_create_http_response(
            &format!("Error encoding metric JSON: {err}"),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    }
}
