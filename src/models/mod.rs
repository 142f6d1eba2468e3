//! Domain models for dataplane-compute.
//!
//! # Core Concepts
//!
//! - [`DataPlaneNode`]: The parent object reconciled by the control loop. Only its
//!   identity is read here; its [`DataPlaneStatus`] carries the aggregate conditions.
//! - [`ExternalCompute`]: The child record describing compute configuration to deploy
//!   onto the node. Exactly one exists per node, sharing the node's namespace and name,
//!   and it is owned by the node through a controller [`OwnerReference`].
//! - [`Conditions`]: Ordered set of named [`Condition`] entries. Both objects carry one.
//!
//! Objects are versioned by [`ObjectMeta::resource_version`]; stores bump it on
//! every write and reject writes carrying a stale value.

mod compute;
mod condition;
mod meta;
mod node;

pub use compute::*;
pub use condition::*;
pub use meta::*;
pub use node::*;
