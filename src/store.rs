//! Write-only persistence of completed interactions.

use crate::error::{Result, VoxgateError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub session_id: Uuid,
    pub input_text: String,
    pub reply_text: String,
    /// Serialized as RFC 3339 UTC.
    pub timestamp: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(session_id: Uuid, input_text: &str, reply_text: &str) -> Self {
        Self {
            session_id,
            input_text: input_text.to_string(),
            reply_text: reply_text.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn record(&self, record: &InteractionRecord) -> Result<()>;
}

/// Appends one JSON object per line.
#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl InteractionStore for JsonlStore {
    async fn record(&self, record: &InteractionRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).map_err(|e| VoxgateError::Persistence {
            message: format!("Failed to serialize interaction: {e}"),
        })?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| VoxgateError::Persistence {
                message: format!("Failed to open {}: {e}", self.path.display()),
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| VoxgateError::Persistence {
                message: format!("Failed to append to {}: {e}", self.path.display()),
            })?;
        file.flush().await?;
        Ok(())
    }
}

/// Keeps records in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<InteractionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<InteractionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl InteractionStore for MemoryStore {
    async fn record(&self, record: &InteractionRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

#[async_trait]
impl InteractionStore for NullStore {
    async fn record(&self, _record: &InteractionRecord) -> Result<()> {
        Ok(())
    }
}
