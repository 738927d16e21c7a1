// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! TCP accept loop and request routing.
//!
//! One task per connection in a `JoinSet`; cancellation stops accepting and
//! drains the in-flight connections before returning.

use std::io;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::handlers;
use crate::http_utils::HttpResponse;
use crate::store::Store;

pub struct Relay {
    config: ServerConfig,
    store: Arc<Store>,
}

impl Relay {
    pub fn new(config: ServerConfig, store: Arc<Store>) -> Self {
        Relay { config, store }
    }

    pub async fn serve(&self, cancel: CancellationToken) -> io::Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "relay listening");
        self.serve_on(listener, cancel).await
    }

    /// Accept loop over an already-bound listener.
    pub async fn serve_on(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> io::Result<()> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = JoinSet::new();

        loop {
            let conn = tokio::select! {
                _ = cancel.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e);
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    }
                    Ok(()) | Err(_) => continue,
                },
            };

            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let store = Arc::clone(&self.store);
            let secret_key = self.config.secret_key.clone();
            let service = service_fn(move |req| {
                let store = Arc::clone(&store);
                let secret_key = secret_key.clone();
                async move { route(req, &store, secret_key.as_deref()).await }
            });
            let conn_cancel = cancel.clone();
            joinset.spawn(async move {
                let conn = server.serve_connection(conn, service);
                tokio::pin!(conn);
                tokio::select! {
                    result = conn.as_mut() => {
                        if let Err(e) = result {
                            error!("Connection error: {e}");
                        }
                    }
                    _ = conn_cancel.cancelled() => {
                        // finish the in-flight request, then close; idle
                        // keep-alive connections close immediately
                        conn.as_mut().graceful_shutdown();
                        if let Err(e) = conn.as_mut().await {
                            error!("Connection error: {e}");
                        }
                    }
                }
            });
        }

        debug!("draining in-flight connections");
        while joinset.join_next().await.is_some() {}
        info!("relay stopped");
        Ok(())
    }
}

/// Dispatches by method and non-empty path segments.
async fn route<B>(
    req: Request<B>,
    store: &Store,
    secret_key: Option<&[u8]>,
) -> http::Result<HttpResponse>
where
    B: hyper::body::Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (&method, segments.as_slice()) {
        (&Method::GET, []) => handlers::index(store, secret_key).await,
        (&Method::GET, ["ping"]) => handlers::ping(store).await,
        (&Method::POST, ["update", kind, id, raw]) => {
            handlers::update_from_path(store, kind, id, raw).await
        }
        (&Method::POST, ["update"]) => handlers::update_json(store, secret_key, req).await,
        (&Method::POST, ["updates"]) => handlers::updates_batch(store, secret_key, req).await,
        (&Method::GET, ["value", kind, id]) => {
            handlers::value_text(store, secret_key, kind, id).await
        }
        (&Method::POST, ["value"]) => handlers::value_json(store, secret_key, req).await,
        _ => {
            let mut not_found = Response::default();
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Ok(not_found)
        }
    }
}
