//! Per-role capability overrides.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use collabo_common::Role;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::capability::Capability;
use crate::store::{Store, StoreError};

/// Raw document shape: role name -> capability name -> grant.
type RawPolicy = BTreeMap<String, BTreeMap<String, bool>>;

/// Mapping from role to explicit capability overrides.
///
/// A missing entry means "use the hard-coded default". The empty policy
/// therefore behaves exactly like the default table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPolicy", into = "RawPolicy")]
pub struct PermissionPolicy {
    overrides: BTreeMap<Role, BTreeMap<Capability, bool>>,
}

impl PermissionPolicy {
    /// Create an empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style override.
    #[must_use]
    pub fn with(mut self, role: Role, capability: Capability, granted: bool) -> Self {
        self.set(role, capability, granted);
        self
    }

    /// Explicit override for `(role, capability)`, if any.
    #[must_use]
    pub fn get(&self, role: Role, capability: Capability) -> Option<bool> {
        self.overrides
            .get(&role)
            .and_then(|caps| caps.get(&capability))
            .copied()
    }

    pub fn set(&mut self, role: Role, capability: Capability, granted: bool) {
        self.overrides
            .entry(role)
            .or_default()
            .insert(capability, granted);
    }

    /// Drop an override so the default applies again.
    pub fn clear(&mut self, role: Role, capability: Capability) -> Option<bool> {
        let caps = self.overrides.get_mut(&role)?;
        let previous = caps.remove(&capability);
        if caps.is_empty() {
            self.overrides.remove(&role);
        }
        previous
    }

    /// Overlay `other` on top of this policy; entries in `other` win.
    pub fn merge(&mut self, other: &Self) {
        for (role, caps) in &other.overrides {
            let target = self.overrides.entry(*role).or_default();
            for (capability, granted) in caps {
                target.insert(*capability, *granted);
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.values().all(BTreeMap::is_empty)
    }

    /// Iterate over every `(role, capability, granted)` override.
    pub fn iter(&self) -> impl Iterator<Item = (Role, Capability, bool)> + '_ {
        self.overrides.iter().flat_map(|(role, caps)| {
            caps.iter()
                .map(move |(capability, granted)| (*role, *capability, *granted))
        })
    }
}

impl From<RawPolicy> for PermissionPolicy {
    fn from(raw: RawPolicy) -> Self {
        let mut policy = Self::default();
        for (role_name, caps) in raw {
            let Ok(role) = role_name.parse::<Role>() else {
                warn!(role = %role_name, "Ignoring overrides for unknown role");
                continue;
            };
            for (capability_name, granted) in caps {
                match capability_name.parse::<Capability>() {
                    Ok(capability) => policy.set(role, capability, granted),
                    Err(e) => warn!(role = %role, error = %e, "Ignoring unknown capability override"),
                }
            }
        }
        policy
    }
}

impl From<PermissionPolicy> for RawPolicy {
    fn from(policy: PermissionPolicy) -> Self {
        let mut raw = Self::new();
        for (role, capability, granted) in policy.iter() {
            raw.entry(role.as_str().to_string())
                .or_default()
                .insert(capability.as_str().to_string(), granted);
        }
        raw
    }
}

/// Holds the active [`PermissionPolicy`] and resolves effective grants.
///
/// Safe to use before any policy is loaded; it then behaves as "no overrides".
#[derive(Debug, Default)]
pub struct PermissionPolicyStore {
    policy: RwLock<PermissionPolicy>,
}

impl PermissionPolicyStore {
    /// Create a store with no overrides loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with an initial policy.
    #[must_use]
    pub fn with_policy(policy: PermissionPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
        }
    }

    /// Effective grant of `capability` for `role`.
    ///
    /// Resolution order:
    /// 1. Admin holds every capability, overrides are ignored
    /// 2. Explicit override for `(role, capability)`
    /// 3. Hard-coded default
    #[must_use]
    pub fn effective(&self, role: Role, capability: Capability) -> bool {
        if role == Role::Admin {
            return true;
        }

        let policy = self.policy.read().unwrap_or_else(PoisonError::into_inner);
        policy
            .get(role, capability)
            .unwrap_or_else(|| capability.default_grant(role))
    }

    /// Copy of the active policy.
    #[must_use]
    pub fn snapshot(&self) -> PermissionPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new policy wholesale.
    pub fn replace(&self, policy: PermissionPolicy) {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
    }

    /// Overlay `overrides` on the active policy and return the result.
    pub fn merge(&self, overrides: &PermissionPolicy) -> PermissionPolicy {
        let mut policy = self.policy.write().unwrap_or_else(PoisonError::into_inner);
        policy.merge(overrides);
        policy.clone()
    }

    /// Reload the policy from the store.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, store: &dyn Store) -> Result<(), StoreError> {
        let policy = store.get_policy().await?;
        debug!(overrides = policy.iter().count(), "Permission policy loaded");
        self.replace(policy);
        Ok(())
    }
}
