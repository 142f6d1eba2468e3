use serde::{Deserialize, Serialize};

use super::{Conditions, ObjectMeta, Resource};

/// A host in the data plane, reconciled by the outer control loop.
///
/// The deploy step only reads the node's identity and writes into its
/// [`DataPlaneStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPlaneNode {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: DataPlaneStatus,
}

/// Aggregate status of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPlaneStatus {
    #[serde(default)]
    pub conditions: Conditions,
}

impl Resource for DataPlaneNode {
    const KIND: &'static str = "OpenStackDataPlaneNode";
    const API_VERSION: &'static str = "dataplane.openstack.org/v1beta1";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}

/// Input for registering a new node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNodeInput {
    pub namespace: String,
    pub name: String,
}
