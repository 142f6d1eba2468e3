//! Error types for the deploy step.

use thiserror::Error;
use uuid::Uuid;

use crate::models::ObjectKey;
use crate::store::StoreError;

/// Errors that end a deploy pass. None of them are retried here.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Fetching or writing the compute record failed.
    #[error("unable to {operation} NovaExternalCompute {key}: {source}")]
    Store {
        operation: &'static str,
        key: ObjectKey,
        #[source]
        source: StoreError,
    },

    /// The cancellation token fired before the store call completed.
    #[error("{operation} of NovaExternalCompute {key} cancelled")]
    Cancelled {
        operation: &'static str,
        key: ObjectKey,
    },

    /// Another controller already owns the record.
    #[error("NovaExternalCompute {key} is already controlled by {kind} {name} ({uid})")]
    AlreadyOwned {
        key: ObjectKey,
        kind: String,
        name: String,
        uid: Uuid,
    },

    #[error("cross-namespace owner references are disallowed: owner {owner} of NovaExternalCompute {key}")]
    CrossNamespaceOwner { key: ObjectKey, owner: ObjectKey },

    #[error("owner {0} has no uid; it must be stored before it can own objects")]
    MissingOwnerUid(ObjectKey),

    #[error("mutation of NovaExternalCompute {0} changed its name or namespace")]
    IdentityChanged(ObjectKey),

    /// The compute record reports an error on its readiness condition.
    #[error("failed: NovaExternalCompute name {name} NovaExternalCompute namespace {namespace}")]
    ComputeFailed {
        name: String,
        namespace: String,
        reason: String,
        message: String,
    },
}

impl DeployError {
    pub(crate) fn from_store(operation: &'static str, key: &ObjectKey, source: StoreError) -> Self {
        match source {
            StoreError::Cancelled => Self::Cancelled {
                operation,
                key: key.clone(),
            },
            source => Self::Store {
                operation,
                key: key.clone(),
                source,
            },
        }
    }

    /// Whether the pass lost an optimistic-concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store { source, .. } if source.is_conflict())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
