// Copyright 2025-Present Telemetry Relay contributors
// SPDX-License-Identifier: Apache-2.0

//! Whole-file snapshot persistence for the in-memory backend.
//!
//! One file holds the full table as a JSON array of points. Writes go to a
//! sibling temp file followed by an atomic rename, so readers never observe
//! a torn snapshot.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use telemetry_core::MetricBatch;

use super::StoreError;

pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SnapshotFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes the batch and atomically overwrites the snapshot file.
    pub async fn save(&self, batch: &MetricBatch) -> Result<(), StoreError> {
        let data = serde_json::to_vec(batch).map_err(StoreError::SnapshotEncoding)?;

        let tmp = self.tmp_path();
        fs::write(&tmp, &data).await.map_err(StoreError::Snapshot)?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(StoreError::Snapshot)?;
        debug!(path = %self.path.display(), points = batch.len(), "snapshot written");
        Ok(())
    }

    /// Loads the full snapshot; a missing file is surfaced as an error for
    /// the caller to log and continue from an empty table.
    pub async fn load(&self) -> Result<MetricBatch, StoreError> {
        let data = fs::read(&self.path).await.map_err(StoreError::Snapshot)?;
        serde_json::from_slice(&data).map_err(StoreError::SnapshotEncoding)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
