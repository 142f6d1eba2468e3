use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::DeployError;
use crate::models::{ExternalCompute, ObjectKey, ObjectMeta, OwnerReference, Resource};
use crate::store::ObjectStore;

/// What [`create_or_patch`] did to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

/// Make the record at `key` exist with `mutate` applied.
///
/// `mutate` runs on the stored record, or on a blank one when nothing is
/// stored. The result is written only if it differs from what was fetched, as
/// a create or as a compare-and-swap against the fetched version. Status is
/// never written. A lost race surfaces as a conflict and is not retried.
pub async fn create_or_patch<S, F>(
    store: &S,
    key: &ObjectKey,
    cancel: &CancellationToken,
    mutate: F,
) -> Result<(OperationResult, ExternalCompute), DeployError>
where
    S: ObjectStore + ?Sized,
    F: FnOnce(&mut ExternalCompute) -> Result<(), DeployError>,
{
    let existing = store
        .fetch(key, cancel)
        .await
        .map_err(|e| DeployError::from_store("get", key, e))?;

    let mut desired = existing
        .clone()
        .unwrap_or_else(|| ExternalCompute::blank(key));
    mutate(&mut desired)?;

    if desired.metadata.key() != *key {
        return Err(DeployError::IdentityChanged(key.clone()));
    }

    match existing {
        None => {
            let created = store
                .write(desired, cancel)
                .await
                .map_err(|e| DeployError::from_store("create", key, e))?;
            Ok((OperationResult::Created, created))
        }
        Some(current) if current.metadata == desired.metadata && current.spec == desired.spec => {
            Ok((OperationResult::Unchanged, current))
        }
        Some(_) => {
            let updated = store
                .write(desired, cancel)
                .await
                .map_err(|e| DeployError::from_store("patch", key, e))?;
            Ok((OperationResult::Updated, updated))
        }
    }
}

/// Record `owner` as the controller of `compute`.
///
/// An existing reference to the same owner is replaced in place. Fails if a
/// different controller is already set, if the owner lives in another
/// namespace, or if the owner has not been stored yet.
pub fn set_controller_reference<O: Resource>(
    compute: &mut ExternalCompute,
    owner: &ObjectMeta,
) -> Result<(), DeployError> {
    let key = compute.metadata.key();
    let uid = owner
        .uid
        .ok_or_else(|| DeployError::MissingOwnerUid(owner.key()))?;

    if owner.namespace != compute.metadata.namespace {
        return Err(DeployError::CrossNamespaceOwner {
            key,
            owner: owner.key(),
        });
    }

    if let Some(current) = compute.metadata.controller() {
        if current.uid != uid {
            return Err(DeployError::AlreadyOwned {
                key,
                kind: current.kind.clone(),
                name: current.name.clone(),
                uid: current.uid,
            });
        }
    }

    let reference = OwnerReference {
        api_version: O::API_VERSION.to_string(),
        kind: O::KIND.to_string(),
        name: owner.name.clone(),
        uid,
        controller: true,
        block_owner_deletion: true,
    };

    let refs = &mut compute.metadata.owner_references;
    match refs.iter_mut().find(|r| r.uid == uid) {
        Some(existing) => *existing = reference,
        None => refs.push(reference),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataPlaneNode;
    use uuid::Uuid;

    fn stored_node(namespace: &str, name: &str) -> ObjectMeta {
        ObjectMeta {
            uid: Some(Uuid::new_v4()),
            resource_version: 1,
            ..ObjectMeta::new(namespace, name)
        }
    }

    #[test]
    fn adds_controller_reference() {
        let node = stored_node("openstack", "edpm-0");
        let mut compute = ExternalCompute::blank(&node.key());

        set_controller_reference::<DataPlaneNode>(&mut compute, &node).unwrap();

        let owner = compute.metadata.controller().unwrap();
        assert_eq!(owner.uid, node.uid.unwrap());
        assert_eq!(owner.kind, "OpenStackDataPlaneNode");
        assert_eq!(owner.name, "edpm-0");
        assert!(owner.block_owner_deletion);
    }

    #[test]
    fn setting_twice_keeps_a_single_reference() {
        let node = stored_node("openstack", "edpm-0");
        let mut compute = ExternalCompute::blank(&node.key());

        set_controller_reference::<DataPlaneNode>(&mut compute, &node).unwrap();
        set_controller_reference::<DataPlaneNode>(&mut compute, &node).unwrap();

        assert_eq!(compute.metadata.owner_references.len(), 1);
    }

    #[test]
    fn rejects_a_second_controller() {
        let first = stored_node("openstack", "edpm-0");
        let second = stored_node("openstack", "edpm-0");
        let mut compute = ExternalCompute::blank(&first.key());
        set_controller_reference::<DataPlaneNode>(&mut compute, &first).unwrap();

        let err = set_controller_reference::<DataPlaneNode>(&mut compute, &second).unwrap_err();
        assert!(matches!(err, DeployError::AlreadyOwned { .. }));
    }

    #[test]
    fn rejects_owner_in_another_namespace() {
        let node = stored_node("other", "edpm-0");
        let mut compute = ExternalCompute::blank(&ObjectKey::new("openstack", "edpm-0"));

        let err = set_controller_reference::<DataPlaneNode>(&mut compute, &node).unwrap_err();
        assert!(matches!(err, DeployError::CrossNamespaceOwner { .. }));
    }

    #[test]
    fn rejects_unsaved_owner() {
        let node = ObjectMeta::new("openstack", "edpm-0");
        let mut compute = ExternalCompute::blank(&node.key());

        let err = set_controller_reference::<DataPlaneNode>(&mut compute, &node).unwrap_err();
        assert!(matches!(err, DeployError::MissingOwnerUid(_)));
    }
}
