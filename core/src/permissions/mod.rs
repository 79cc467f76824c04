//! Permission system types and utilities.
//!
//! Two layers:
//! - Policy: per-role overrides on top of a hard-coded default table
//! - Resolver: role, ownership and membership folded into an effective set

pub mod capability;
pub mod policy;
pub mod resolver;

pub use capability::{Capability, CapabilitySet, UnknownCapability};
pub use policy::{PermissionPolicy, PermissionPolicyStore};
pub use resolver::RoleResolver;
