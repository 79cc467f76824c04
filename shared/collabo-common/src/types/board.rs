//! Board Types

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::principal::PrincipalId;

/// Identifier of a board.
pub type BoardId = Uuid;

/// Board-level access settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSettings {
    /// Join requests must be approved by a moderator.
    #[serde(default)]
    pub require_member_approval: bool,
}

/// A shared board whose access the core governs.
///
/// `members` and the keys of `pending_members` are kept disjoint by every
/// transition; the owner is not required to appear in `members`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: BoardId,
    pub owner_id: PrincipalId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub members: BTreeSet<PrincipalId>,
    /// Pending join requests keyed by principal, valued by request time.
    #[serde(default)]
    pub pending_members: BTreeMap<PrincipalId, DateTime<Utc>>,
    #[serde(default, rename = "permissions")]
    pub settings: BoardSettings,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Board {
    /// Create an open board with no members.
    pub fn new(id: BoardId, owner_id: PrincipalId, title: impl Into<String>) -> Self {
        Self {
            id,
            owner_id,
            title: title.into(),
            members: BTreeSet::new(),
            pending_members: BTreeMap::new(),
            settings: BoardSettings::default(),
            is_deleted: false,
        }
    }

    #[must_use]
    pub fn with_approval_required(mut self, required: bool) -> Self {
        self.settings.require_member_approval = required;
        self
    }

    #[must_use]
    pub fn with_member(mut self, principal_id: PrincipalId) -> Self {
        self.pending_members.remove(&principal_id);
        self.members.insert(principal_id);
        self
    }

    #[must_use]
    pub const fn requires_approval(&self) -> bool {
        self.settings.require_member_approval
    }

    #[must_use]
    pub fn is_owner(&self, principal_id: PrincipalId) -> bool {
        self.owner_id == principal_id
    }

    /// Listed member or owner.
    #[must_use]
    pub fn is_member(&self, principal_id: PrincipalId) -> bool {
        self.is_owner(principal_id) || self.members.contains(&principal_id)
    }

    #[must_use]
    pub fn is_pending(&self, principal_id: PrincipalId) -> bool {
        self.pending_members.contains_key(&principal_id)
    }

    /// Pending join requests, oldest first.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<MembershipRequest> {
        let mut requests: Vec<_> = self
            .pending_members
            .iter()
            .map(|(principal_id, requested_at)| MembershipRequest {
                board_id: self.id,
                principal_id: *principal_id,
                requested_at: *requested_at,
            })
            .collect();
        requests.sort_by_key(|r| r.requested_at);
        requests
    }
}

/// An unresolved intent to join a board that requires approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRequest {
    pub board_id: BoardId,
    pub principal_id: PrincipalId,
    pub requested_at: DateTime<Utc>,
}
