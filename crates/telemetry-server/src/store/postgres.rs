// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Postgres backend: one `metrics` table keyed by (id, kind), with the
//! gauge-overwrite / counter-accumulate semantics expressed in the upsert
//! itself so concurrent writers stay correct without application locks.
//!
//! Connection-class failures are retried with the same bounded linear
//! backoff the agent uses for delivery; constraint and query errors are
//! terminal.

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio::time::sleep;
use tracing::{debug, warn};

use telemetry_core::validate::{check_batch, check_point};
use telemetry_core::{MetricBatch, MetricKind, MetricPoint};

use super::StoreError;

const MAX_CONNECTIONS: u32 = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_TABLE_SQL: &str = "\
    CREATE TABLE IF NOT EXISTS metrics (
        id    varchar NOT NULL,
        kind  varchar NOT NULL,
        value double precision,
        delta bigint,
        PRIMARY KEY (id, kind)
    )";

// Counter accumulation happens in SQL; bigint overflow raises an error and
// rolls back instead of wrapping, unlike the memory store which saturates.
const UPSERT_SQL: &str = "\
    INSERT INTO metrics (id, kind, value, delta)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (id, kind) DO UPDATE SET
        value = excluded.value,
        delta = CASE
            WHEN excluded.delta IS NOT NULL OR metrics.delta IS NOT NULL
                THEN COALESCE(excluded.delta, 0) + COALESCE(metrics.delta, 0)
            ELSE NULL
        END";

/// Bounded retry with a capped, linearly increasing wait.
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

/// Failures worth another attempt: pool and socket trouble, plus the
/// Postgres class 08 (connection exception) SQLSTATE family. Everything
/// else reflects the query or the data and will not improve on retry.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| code.starts_with("08")),
        _ => false,
    }
}

pub struct PostgresStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresStore {
    /// Connects and ensures the schema exists. Any failure here makes the
    /// caller fall back to the in-memory backend.
    pub async fn open(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect(dsn)
            .await?;
        sqlx::query(CREATE_TABLE_SQL).execute(&pool).await?;
        Ok(PostgresStore {
            pool,
            retry: RetryPolicy::default(),
        })
    }

    pub async fn accept(&self, point: &MetricPoint) -> Result<(), StoreError> {
        check_point(point)?;
        self.with_retry(|| self.upsert_once(point)).await?;
        debug!(id = %point.id, kind = %point.kind, "point stored");
        Ok(())
    }

    /// The whole batch goes through one transaction; a failure rolls back
    /// with zero state change. The transaction itself is retried as a unit
    /// on connection-class failures.
    pub async fn accept_batch(&self, batch: &MetricBatch) -> Result<(), StoreError> {
        check_batch(batch)?;
        self.with_retry(|| self.upsert_batch_once(batch)).await?;
        debug!(points = batch.len(), "batch stored");
        Ok(())
    }

    pub async fn get(&self, id: &str, kind: MetricKind) -> Result<MetricPoint, StoreError> {
        let row = self
            .with_retry(|| {
                sqlx::query("SELECT value, delta FROM metrics WHERE id = $1 AND kind = $2")
                    .bind(id)
                    .bind(kind.to_string())
                    .fetch_optional(&self.pool)
            })
            .await?;

        let row = row.ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
            kind,
        })?;

        let mut point = MetricPoint {
            id: id.to_string(),
            kind,
            delta: None,
            value: None,
        };
        match kind {
            MetricKind::Gauge => point.value = row.try_get("value")?,
            MetricKind::Counter => point.delta = row.try_get("delta")?,
        }
        Ok(point)
    }

    pub async fn get_all(&self) -> Result<MetricBatch, StoreError> {
        let rows = self
            .with_retry(|| {
                sqlx::query("SELECT id, kind, value, delta FROM metrics").fetch_all(&self.pool)
            })
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let kind: String = row.try_get("kind")?;
            let Ok(kind) = kind.parse::<MetricKind>() else {
                warn!(%id, %kind, "row with unknown kind skipped");
                continue;
            };
            let point = MetricPoint {
                id,
                kind,
                delta: row.try_get("delta")?,
                value: row.try_get("value")?,
            };
            out.push(point);
        }
        Ok(out)
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn upsert_once(&self, point: &MetricPoint) -> Result<(), sqlx::Error> {
        sqlx::query(UPSERT_SQL)
            .bind(&point.id)
            .bind(point.kind.to_string())
            .bind(point.value)
            .bind(point.delta)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_batch_once(&self, batch: &MetricBatch) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for point in batch {
            sqlx::query(UPSERT_SQL)
                .bind(&point.id)
                .bind(point.kind.to_string())
                .bind(point.value)
                .bind(point.delta)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, sqlx::Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt <= self.retry.max_retries => {
                    let wait = self.retry.wait_before(attempt);
                    warn!(%err, attempt, "transient database failure, retrying in {:?}", wait);
                    sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
