//! One reconcile pass of a stored node against the database.

use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::deploy::{deploy_external_compute, ComputeDeployment, ReconcileAction};
use crate::models::{DataPlaneNode, ExternalCompute, ObjectKey};
use crate::store::{ObjectStore, StoreError};

/// Delay suggested after losing a write race.
const CONFLICT_REQUEUE: Duration = Duration::from_secs(1);

/// Result of [`reconcile_node`].
#[derive(Debug, Clone, Serialize)]
pub struct NodeReconcileOutcome {
    pub action: ReconcileAction,
    /// The node as persisted after the pass.
    pub node: DataPlaneNode,
    pub compute: Option<ExternalCompute>,
    /// Why the pass failed, if it did.
    pub error: Option<String>,
    #[serde(skip)]
    pub conflict: bool,
}

impl NodeReconcileOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Deploy the compute record for the node at `key` and persist the node status.
///
/// Nodes are read from and saved to `db`; the compute record goes through
/// `computes`, which is usually the same database. The node status is saved
/// whether or not the deploy step fails, so a mirrored error reaches the node.
/// Errors from loading or saving the node itself are returned as `Err`.
pub async fn reconcile_node<S>(
    db: &Database,
    computes: &S,
    key: &ObjectKey,
    deployment: &ComputeDeployment,
    cancel: &CancellationToken,
) -> Result<NodeReconcileOutcome>
where
    S: ObjectStore + ?Sized,
{
    let mut node = db
        .get_node(key)?
        .ok_or_else(|| StoreError::NotFound(key.clone()))?;
    let before = node.status.clone();

    let deployed = deploy_external_compute(
        computes,
        &node.metadata,
        &mut node.status,
        deployment,
        cancel,
    )
    .await;

    let node = if node.status != before {
        db.update_node_status(key, &node.status, node.metadata.resource_version)?
    } else {
        node
    };
    let compute = match computes.fetch(key, cancel).await {
        Ok(compute) => compute,
        Err(StoreError::Cancelled) => None,
        Err(e) => return Err(e.into()),
    };

    let outcome = match deployed {
        Ok(action) => NodeReconcileOutcome {
            action,
            node,
            compute,
            error: None,
            conflict: false,
        },
        Err(e) => {
            let conflict = e.is_conflict();
            NodeReconcileOutcome {
                action: if conflict {
                    ReconcileAction::requeue(CONFLICT_REQUEUE)
                } else {
                    ReconcileAction::done()
                },
                node,
                compute,
                error: Some(e.to_string()),
                conflict,
            }
        }
    };

    tracing::info!(
        node = %key,
        succeeded = outcome.succeeded(),
        "reconcile pass finished"
    );
    Ok(outcome)
}
