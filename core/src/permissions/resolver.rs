//! Capability resolution logic.
//!
//! Computes the effective capabilities of a principal on a board.

use std::sync::Arc;

use collabo_common::{Board, Principal, Role};

use super::capability::{Capability, CapabilitySet};
use super::policy::PermissionPolicyStore;
use crate::error::AccessError;

/// Pure decision function over principal, board and the active policy.
///
/// Evaluated per UI affordance, so it never touches the store.
#[derive(Debug, Clone)]
pub struct RoleResolver {
    policies: Arc<PermissionPolicyStore>,
}

impl RoleResolver {
    pub fn new(policies: Arc<PermissionPolicyStore>) -> Self {
        Self { policies }
    }

    /// The policy store this resolver reads from.
    pub fn policies(&self) -> &Arc<PermissionPolicyStore> {
        &self.policies
    }

    /// Whether `principal` holds `capability` on `board`.
    ///
    /// Resolution order:
    /// 1. Admin holds everything
    /// 2. Board owner holds every board-scoped capability
    /// 3. Policy grant for the role, additionally requiring membership for
    ///    member-scoped capabilities
    #[must_use]
    pub fn can(&self, principal: &Principal, board: &Board, capability: Capability) -> bool {
        if principal.role == Role::Admin {
            return true;
        }

        if board.is_owner(principal.id) {
            return true;
        }

        if capability.is_member_scoped() && !board.members.contains(&principal.id) {
            return false;
        }

        self.policies.effective(principal.role, capability)
    }

    /// Full effective capability set of `principal` on `board`.
    #[must_use]
    pub fn capabilities(&self, principal: &Principal, board: &Board) -> CapabilitySet {
        if principal.role == Role::Admin || board.is_owner(principal.id) {
            return CapabilitySet::all();
        }

        Capability::all()
            .iter()
            .copied()
            .filter(|capability| self.can(principal, board, *capability))
            .collect()
    }

    /// Whether `principal` moderates membership of `board`.
    #[must_use]
    pub fn is_moderator(&self, principal: &Principal, board: &Board) -> bool {
        self.can(principal, board, Capability::ManageMembers)
    }

    /// Require `capability`, failing with [`AccessError::Forbidden`].
    pub fn require(
        &self,
        principal: &Principal,
        board: &Board,
        capability: Capability,
    ) -> Result<(), AccessError> {
        if self.can(principal, board, capability) {
            Ok(())
        } else {
            Err(AccessError::Forbidden)
        }
    }
}
