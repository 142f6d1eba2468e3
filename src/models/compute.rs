use serde::{Deserialize, Serialize};

use super::{Conditions, ObjectKey, ObjectMeta, Resource};

/// Declarative record of compute configuration to deploy onto a set of hosts.
///
/// Created and patched on behalf of a [`DataPlaneNode`](super::DataPlaneNode);
/// its status is written only by whatever process carries out the deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCompute {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ExternalComputeSpec,
    #[serde(default)]
    pub status: ExternalComputeStatus,
}

impl ExternalCompute {
    /// An unsaved record with only its identity set.
    pub fn blank(key: &ObjectKey) -> Self {
        Self {
            metadata: ObjectMeta::new(&key.namespace, &key.name),
            spec: ExternalComputeSpec::default(),
            status: ExternalComputeStatus::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalComputeSpec {
    /// Request that the configuration be rolled out.
    #[serde(default)]
    pub deploy: bool,
    /// Secret holding the SSH key used to reach the hosts.
    #[serde(default)]
    pub ssh_key_secret_name: String,
    /// ConfigMap holding the Ansible inventory of the hosts.
    #[serde(default)]
    pub inventory_config_map_name: String,
    #[serde(default)]
    pub network_attachments: Vec<String>,
    /// Runner image that executes the deployment.
    #[serde(default, rename = "ansibleEEContainerImage")]
    pub ansible_ee_container_image: String,
    #[serde(default = "default_nova_instance")]
    pub nova_instance: String,
    #[serde(default = "default_cell_name")]
    pub cell_name: String,
}

fn default_nova_instance() -> String {
    "nova".to_string()
}

fn default_cell_name() -> String {
    "cell1".to_string()
}

impl Default for ExternalComputeSpec {
    fn default() -> Self {
        Self {
            deploy: false,
            ssh_key_secret_name: String::new(),
            inventory_config_map_name: String::new(),
            network_attachments: Vec::new(),
            ansible_ee_container_image: String::new(),
            nova_instance: default_nova_instance(),
            cell_name: default_cell_name(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalComputeStatus {
    #[serde(default)]
    pub conditions: Conditions,
}

impl Resource for ExternalCompute {
    const KIND: &'static str = "NovaExternalCompute";
    const API_VERSION: &'static str = "nova.openstack.org/v1beta1";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}

/// Status report from the process that deploys an [`ExternalCompute`].
///
/// `resource_version` must match the stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateComputeStatusInput {
    pub resource_version: u64,
    pub status: ExternalComputeStatus,
}
