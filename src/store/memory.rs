use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{check_cancelled, ObjectStore, StoreError};
use crate::models::{ExternalCompute, ExternalComputeStatus, ObjectKey};

/// In-process [`ObjectStore`] with the same versioning rules as the database.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<ObjectKey, ExternalCompute>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ObjectKey) -> Result<Option<ExternalCompute>, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(key).cloned())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        let records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Replace the status of a stored record, as the deploying process would.
    pub fn update_status(
        &self,
        key: &ObjectKey,
        status: ExternalComputeStatus,
    ) -> Result<ExternalCompute, StoreError> {
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let record = records
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        record.status = status;
        record.metadata.resource_version += 1;
        Ok(record.clone())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn fetch(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Option<ExternalCompute>, StoreError> {
        check_cancelled(cancel)?;
        self.get(key)
    }

    async fn write(
        &self,
        mut record: ExternalCompute,
        cancel: &CancellationToken,
    ) -> Result<ExternalCompute, StoreError> {
        check_cancelled(cancel)?;
        let key = record.metadata.key();
        let mut records = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        let expected = record.metadata.resource_version;

        match records.get(&key) {
            None if expected == 0 => {
                record.status = ExternalComputeStatus::default();
                record.metadata.uid = Some(Uuid::new_v4());
                record.metadata.creation_timestamp = Some(Utc::now());
            }
            None => {
                return Err(StoreError::Conflict {
                    key,
                    expected,
                    found: None,
                });
            }
            Some(_) if expected == 0 => return Err(StoreError::AlreadyExists(key)),
            Some(stored) if stored.metadata.resource_version != expected => {
                return Err(StoreError::Conflict {
                    key,
                    expected,
                    found: Some(stored.metadata.resource_version),
                });
            }
            Some(stored) => {
                // Status belongs to the deploying process.
                record.status = stored.status.clone();
                record.metadata.uid = stored.metadata.uid;
                record.metadata.creation_timestamp = stored.metadata.creation_timestamp;
            }
        }

        record.metadata.resource_version = expected + 1;
        records.insert(key, record.clone());
        Ok(record)
    }
}
