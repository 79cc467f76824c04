use collabo_common::{Board, PrincipalId};
use serde::Serialize;

/// Relationship of a principal to a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipState {
    None,
    Pending,
    Member,
    Owner,
}

impl MembershipState {
    /// Derive the state from a board snapshot.
    #[must_use]
    pub fn of(board: &Board, principal_id: PrincipalId) -> Self {
        if board.is_owner(principal_id) {
            Self::Owner
        } else if board.members.contains(&principal_id) {
            Self::Member
        } else if board.is_pending(principal_id) {
            Self::Pending
        } else {
            Self::None
        }
    }

    /// Member or owner.
    #[must_use]
    pub const fn is_joined(self) -> bool {
        matches!(self, Self::Member | Self::Owner)
    }
}
