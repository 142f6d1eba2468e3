use serde::{Deserialize, Serialize};

use crate::models::{ExternalCompute, ObjectMeta};

/// Label on a compute record naming the node it was created for.
pub const OWNER_LABEL: &str = "openstackdataplanenode";

/// Caller-supplied parameters for a node's compute deployment.
///
/// Values are passed through as-is; the store rejects malformed references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeDeployment {
    pub ssh_key_secret: String,
    pub inventory_config_map: String,
    #[serde(default)]
    pub network_attachments: Vec<String>,
    pub ansible_ee_image: String,
}

/// Bring `compute` to the state requested for `node`.
///
/// Labels are merged: unrelated labels survive and [`OWNER_LABEL`] is always
/// overwritten. Every managed spec field is overwritten and `deploy` is forced on.
pub fn apply_desired_state(
    compute: &mut ExternalCompute,
    node: &ObjectMeta,
    deployment: &ComputeDeployment,
) {
    tracing::info!(
        "NovaExternalCompute: Adding label {}={}",
        OWNER_LABEL,
        node.name
    );
    compute
        .metadata
        .labels
        .insert(OWNER_LABEL.to_string(), node.name.clone());

    let spec = &mut compute.spec;
    spec.inventory_config_map_name = deployment.inventory_config_map.clone();
    spec.ssh_key_secret_name = deployment.ssh_key_secret.clone();
    spec.deploy = true;
    spec.network_attachments = deployment.network_attachments.clone();
    spec.ansible_ee_container_image = deployment.ansible_ee_image.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectKey;

    fn deployment() -> ComputeDeployment {
        ComputeDeployment {
            ssh_key_secret: "dataplane-ansible-ssh-private-key-secret".to_string(),
            inventory_config_map: "dataplanenode-edpm-compute-0".to_string(),
            network_attachments: vec!["ctlplane".to_string()],
            ansible_ee_image: "quay.io/openstack-k8s-operators/openstack-ansibleee-runner:latest"
                .to_string(),
        }
    }

    #[test]
    fn fills_a_blank_record() {
        let node = ObjectMeta::new("openstack", "edpm-compute-0");
        let mut compute = ExternalCompute::blank(&ObjectKey::new("openstack", "edpm-compute-0"));

        apply_desired_state(&mut compute, &node, &deployment());

        assert_eq!(
            compute.metadata.labels.get(OWNER_LABEL).map(String::as_str),
            Some("edpm-compute-0")
        );
        assert!(compute.spec.deploy);
        assert_eq!(compute.spec.ssh_key_secret_name, "dataplane-ansible-ssh-private-key-secret");
        assert_eq!(compute.spec.inventory_config_map_name, "dataplanenode-edpm-compute-0");
        assert_eq!(compute.spec.network_attachments, vec!["ctlplane"]);
        assert_eq!(
            compute.spec.ansible_ee_container_image,
            "quay.io/openstack-k8s-operators/openstack-ansibleee-runner:latest"
        );
    }

    #[test]
    fn overwrites_managed_fields_and_keeps_the_rest() {
        let node = ObjectMeta::new("openstack", "edpm-compute-0");
        let mut compute = ExternalCompute::blank(&ObjectKey::new("openstack", "edpm-compute-0"));
        compute
            .metadata
            .labels
            .insert("team".to_string(), "compute".to_string());
        compute
            .metadata
            .labels
            .insert(OWNER_LABEL.to_string(), "stale".to_string());
        compute.spec.deploy = false;
        compute.spec.network_attachments = vec!["internalapi".to_string(), "tenant".to_string()];
        compute.spec.cell_name = "cell2".to_string();

        apply_desired_state(&mut compute, &node, &deployment());

        assert_eq!(compute.metadata.labels.get("team").map(String::as_str), Some("compute"));
        assert_eq!(
            compute.metadata.labels.get(OWNER_LABEL).map(String::as_str),
            Some("edpm-compute-0")
        );
        assert!(compute.spec.deploy);
        assert_eq!(compute.spec.network_attachments, vec!["ctlplane"]);
        assert_eq!(compute.spec.cell_name, "cell2");
    }

    #[test]
    fn passes_empty_references_through() {
        let node = ObjectMeta::new("openstack", "edpm-compute-0");
        let mut compute = ExternalCompute::blank(&ObjectKey::new("openstack", "edpm-compute-0"));

        apply_desired_state(&mut compute, &node, &ComputeDeployment::default());

        assert!(compute.spec.deploy);
        assert_eq!(compute.spec.ssh_key_secret_name, "");
        assert!(compute.spec.network_attachments.is_empty());
    }
}
