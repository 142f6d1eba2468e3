//! Versioned storage for [`ExternalCompute`] records.
//!
//! Writes are compare-and-swap on [`ObjectMeta::resource_version`](crate::models::ObjectMeta):
//! a record with version zero is created, any other version must match what is
//! stored. Every call takes a [`CancellationToken`]; a cancelled token turns the
//! call into [`StoreError::Cancelled`].

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{ExternalCompute, ObjectKey};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(
        "conflict on {}: expected resource version {}, found {}",
        .key,
        .expected,
        found_display(.found)
    )]
    Conflict {
        key: ObjectKey,
        expected: u64,
        found: Option<u64>,
    },

    #[error("{0} already exists")]
    AlreadyExists(ObjectKey),

    #[error("{0} not found")]
    NotFound(ObjectKey),

    #[error("operation cancelled")]
    Cancelled,

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

fn found_display(found: &Option<u64>) -> String {
    match found {
        Some(version) => version.to_string(),
        None => "none".to_string(),
    }
}

impl StoreError {
    /// Whether the write lost a race with another writer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists(_))
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the record stored under `key`. Absence is `Ok(None)`.
    async fn fetch(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Option<ExternalCompute>, StoreError>;

    /// Create or compare-and-swap `record`, returning it as stored.
    async fn write(
        &self,
        record: ExternalCompute,
        cancel: &CancellationToken,
    ) -> Result<ExternalCompute, StoreError>;
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}
