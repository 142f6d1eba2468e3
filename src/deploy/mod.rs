//! Deploy step for a node's external compute.
//!
//! [`deploy_external_compute`] runs three stages in order:
//!
//! 1. [`apply_desired_state`] computes labels and spec from the caller's
//!    [`ComputeDeployment`].
//! 2. [`create_or_patch`] writes that state together with the node's controller
//!    reference in one compare-and-swap.
//! 3. [`mirror_compute_status`] copies the record's readiness onto the node
//!    status and turns an explicit error into a failed pass.
//!
//! Nothing is retried here. The returned [`ReconcileAction`] and error tell the
//! caller's scheduler what happened.

mod desired;
mod error;
mod mirror;
mod upsert;

pub use desired::*;
pub use error::DeployError;
pub use mirror::mirror_compute_status;
pub use upsert::{create_or_patch, set_controller_reference, OperationResult};

use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::models::{DataPlaneNode, DataPlaneStatus, ObjectMeta};
use crate::store::ObjectStore;

/// Retry hint for the caller's scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileAction {
    /// Ask to be invoked again after this delay. `None` leaves it to watches.
    pub requeue_after: Option<Duration>,
}

impl ReconcileAction {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// Create or patch the external compute of `node` and mirror its readiness.
///
/// The record shares the node's namespace and name. `status` is the node's
/// aggregate status and is updated in place even when an error is returned.
pub async fn deploy_external_compute<S>(
    store: &S,
    node: &ObjectMeta,
    status: &mut DataPlaneStatus,
    deployment: &ComputeDeployment,
    cancel: &CancellationToken,
) -> Result<ReconcileAction, DeployError>
where
    S: ObjectStore + ?Sized,
{
    tracing::info!("NovaExternalCompute deploy");
    let key = node.key();

    let upserted = create_or_patch(store, &key, cancel, |compute| {
        apply_desired_state(compute, node, deployment);
        set_controller_reference::<DataPlaneNode>(compute, node)
    })
    .await;

    let compute = match upserted {
        Ok((result, compute)) => {
            tracing::debug!(compute = %key, ?result, "NovaExternalCompute upserted");
            compute
        }
        Err(e) => {
            tracing::error!(
                compute = %key,
                error = %e,
                "Unable to CreateOrPatch NovaExternalCompute {}",
                key.name
            );
            return Err(e);
        }
    };

    mirror_compute_status(&compute, status)?;

    Ok(ReconcileAction::done())
}
