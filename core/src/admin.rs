//! Administrative write paths: roles, suspensions and the policy document.

use std::sync::Arc;

use collabo_common::{Principal, PrincipalId, Role};
use tracing::{info, warn};

use crate::error::AccessError;
use crate::permissions::{PermissionPolicy, PermissionPolicyStore};
use crate::store::{PrincipalUpdate, Store};
use crate::suspension::SuspensionEnforcer;

/// Operations reserved for active admins.
#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn Store>,
    policies: Arc<PermissionPolicyStore>,
    suspension: SuspensionEnforcer,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>, policies: Arc<PermissionPolicyStore>) -> Self {
        Self {
            store,
            policies,
            suspension: SuspensionEnforcer::new(),
        }
    }

    /// Change the role of `target_id`.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn set_role(
        &self,
        actor: &Principal,
        target_id: PrincipalId,
        role: Role,
    ) -> Result<Principal, AccessError> {
        self.ensure_admin(actor)?;

        let updated = self
            .store
            .update_principal(target_id, PrincipalUpdate::Role(role))
            .await?;
        info!(%target_id, %role, "Role updated");
        Ok(updated)
    }

    /// Suspend or reinstate `target_id`.
    ///
    /// A missing reason is recorded as "No reason provided". Admins cannot
    /// suspend themselves.
    #[tracing::instrument(skip(self, actor, reason), fields(actor_id = %actor.id))]
    pub async fn set_suspension(
        &self,
        actor: &Principal,
        target_id: PrincipalId,
        suspended: bool,
        reason: Option<String>,
    ) -> Result<Principal, AccessError> {
        self.ensure_admin(actor)?;
        if suspended && target_id == actor.id {
            warn!("Admin attempted to suspend themselves");
            return Err(AccessError::Forbidden);
        }

        let updated = self
            .store
            .update_principal(target_id, PrincipalUpdate::Suspension { suspended, reason })
            .await?;
        info!(%target_id, suspended, "Suspension updated");
        Ok(updated)
    }

    /// Merge `overrides` into the policy, persist it and make it active.
    #[tracing::instrument(skip_all, fields(actor_id = %actor.id))]
    pub async fn update_policy(
        &self,
        actor: &Principal,
        overrides: &PermissionPolicy,
    ) -> Result<PermissionPolicy, AccessError> {
        self.ensure_admin(actor)?;

        let mut policy = self.store.get_policy().await?;
        policy.merge(overrides);
        self.store.put_policy(policy.clone()).await?;
        self.policies.replace(policy.clone());

        info!(overrides = overrides.iter().count(), "Permission policy updated");
        Ok(policy)
    }

    fn ensure_admin(&self, actor: &Principal) -> Result<(), AccessError> {
        self.suspension.ensure_active(actor)?;
        if actor.is_admin() {
            Ok(())
        } else {
            warn!(actor_id = %actor.id, "Non-admin attempted admin action");
            Err(AccessError::Forbidden)
        }
    }
}
