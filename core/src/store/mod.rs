//! Persistence port.
//!
//! The core never holds authoritative board or principal state; it reads
//! through [`Store`] and writes membership changes as guarded
//! [`BoardTransition`]s so that a concurrent writer cannot be silently
//! overwritten.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collabo_common::{Board, BoardId, Principal, PrincipalId, Role};
use thiserror::Error;

use crate::permissions::PermissionPolicy;

pub use memory::InMemoryStore;

/// Reason recorded when a suspension is applied without one.
pub const DEFAULT_SUSPENSION_REASON: &str = "No reason provided";

/// Store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Board {0} not found")]
    BoardNotFound(BoardId),

    #[error("Principal {0} not found")]
    PrincipalNotFound(PrincipalId),

    /// The transition precondition no longer held at write time.
    #[error("Precondition failed")]
    Conflict,

    #[error("Backend failure: {0}")]
    Backend(String),
}

/// A membership write together with the board state it expects.
///
/// The store must check [`BoardTransition::permits`] and apply the change as
/// one atomic step, returning [`StoreError::Conflict`] when the check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardTransition {
    /// Add directly as a member. Expects: not a member.
    Admit { principal_id: PrincipalId },
    /// Queue a join request. Expects: neither member nor pending.
    Enqueue {
        principal_id: PrincipalId,
        requested_at: DateTime<Utc>,
    },
    /// Move a pending request into membership. Expects: pending.
    Approve { principal_id: PrincipalId },
    /// Drop a pending request. Expects: pending.
    Dismiss { principal_id: PrincipalId },
    /// Remove from membership. Expects: listed member.
    Expel { principal_id: PrincipalId },
    /// Remove from membership without emptying the board. Expects: listed
    /// member alongside at least one other member.
    Withdraw { principal_id: PrincipalId },
}

impl BoardTransition {
    /// Principal the transition is about.
    #[must_use]
    pub const fn principal_id(&self) -> PrincipalId {
        match self {
            Self::Admit { principal_id }
            | Self::Enqueue { principal_id, .. }
            | Self::Approve { principal_id }
            | Self::Dismiss { principal_id }
            | Self::Expel { principal_id }
            | Self::Withdraw { principal_id } => *principal_id,
        }
    }

    #[must_use]
    pub const fn action_name(&self) -> &'static str {
        match self {
            Self::Admit { .. } => "admit",
            Self::Enqueue { .. } => "enqueue",
            Self::Approve { .. } => "approve",
            Self::Dismiss { .. } => "dismiss",
            Self::Expel { .. } => "expel",
            Self::Withdraw { .. } => "withdraw",
        }
    }

    /// Whether the precondition holds against `board`.
    #[must_use]
    pub fn permits(&self, board: &Board) -> bool {
        if board.is_deleted {
            return false;
        }

        let id = self.principal_id();
        match self {
            Self::Admit { .. } => !board.is_member(id),
            Self::Enqueue { .. } => !board.is_member(id) && !board.is_pending(id),
            Self::Approve { .. } | Self::Dismiss { .. } => board.is_pending(id),
            Self::Expel { .. } => board.members.contains(&id),
            Self::Withdraw { .. } => board.members.contains(&id) && board.members.len() > 1,
        }
    }

    /// Apply the change. Callers check [`Self::permits`] first.
    pub fn apply(&self, board: &mut Board) {
        let id = self.principal_id();
        match self {
            Self::Admit { .. } | Self::Approve { .. } => {
                board.pending_members.remove(&id);
                board.members.insert(id);
            }
            Self::Enqueue { requested_at, .. } => {
                board.pending_members.insert(id, *requested_at);
            }
            Self::Dismiss { .. } => {
                board.pending_members.remove(&id);
            }
            Self::Expel { .. } | Self::Withdraw { .. } => {
                board.members.remove(&id);
            }
        }
    }
}

/// Administrative change to a principal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalUpdate {
    Role(Role),
    Suspension {
        suspended: bool,
        reason: Option<String>,
    },
}

impl PrincipalUpdate {
    /// Apply the update to `principal`.
    ///
    /// Suspending stamps `suspended_at` and falls back to
    /// [`DEFAULT_SUSPENSION_REASON`]; lifting a suspension clears both.
    pub fn apply(&self, principal: &mut Principal) {
        match self {
            Self::Role(role) => principal.role = *role,
            Self::Suspension {
                suspended: true,
                reason,
            } => {
                principal.suspended = true;
                principal.suspension_reason = Some(
                    reason
                        .as_deref()
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .unwrap_or(DEFAULT_SUSPENSION_REASON)
                        .to_string(),
                );
                principal.suspended_at = Some(Utc::now());
            }
            Self::Suspension {
                suspended: false, ..
            } => {
                principal.suspended = false;
                principal.suspension_reason = None;
                principal.suspended_at = None;
            }
        }
    }
}

/// Backing store for boards, principals and the permission policy.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_board(&self, board_id: BoardId) -> Result<Board, StoreError>;

    async fn get_principal(&self, principal_id: PrincipalId) -> Result<Principal, StoreError>;

    /// Check `transition` against the current board and apply it atomically.
    ///
    /// Returns the board as written, or [`StoreError::Conflict`] when the
    /// precondition does not hold.
    async fn atomic_transition(
        &self,
        board_id: BoardId,
        transition: BoardTransition,
    ) -> Result<Board, StoreError>;

    /// Load the policy document. A missing document is an empty policy.
    async fn get_policy(&self) -> Result<PermissionPolicy, StoreError>;

    async fn put_policy(&self, policy: PermissionPolicy) -> Result<(), StoreError>;

    async fn update_principal(
        &self,
        principal_id: PrincipalId,
        update: PrincipalUpdate,
    ) -> Result<Principal, StoreError>;
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn board() -> Board {
        Board::new(Uuid::new_v4(), Uuid::new_v4(), "Physics")
    }

    #[test]
    fn test_admit_clears_stale_pending() {
        let user = Uuid::new_v4();
        let mut board = board();
        board.pending_members.insert(user, Utc::now());

        let admit = BoardTransition::Admit { principal_id: user };
        assert!(admit.permits(&board));
        admit.apply(&mut board);

        assert!(board.members.contains(&user));
        assert!(!board.is_pending(user));
    }

    #[test]
    fn test_preconditions() {
        let member = Uuid::new_v4();
        let pending = Uuid::new_v4();
        let mut board = board().with_member(member);
        board.pending_members.insert(pending, Utc::now());

        assert!(!BoardTransition::Admit { principal_id: member }.permits(&board));
        assert!(!BoardTransition::Admit {
            principal_id: board.owner_id
        }
        .permits(&board));
        assert!(!BoardTransition::Enqueue {
            principal_id: pending,
            requested_at: Utc::now()
        }
        .permits(&board));
        assert!(BoardTransition::Approve { principal_id: pending }.permits(&board));
        assert!(!BoardTransition::Dismiss { principal_id: member }.permits(&board));
        assert!(BoardTransition::Expel { principal_id: member }.permits(&board));
        assert!(!BoardTransition::Expel { principal_id: pending }.permits(&board));
    }

    #[test]
    fn test_withdraw_keeps_last_member() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut board = board().with_member(first).with_member(second);

        let withdraw = BoardTransition::Withdraw { principal_id: first };
        assert!(withdraw.permits(&board));
        withdraw.apply(&mut board);

        assert!(!BoardTransition::Withdraw { principal_id: second }.permits(&board));
        assert!(BoardTransition::Expel { principal_id: second }.permits(&board));
    }

    #[test]
    fn test_deleted_board_permits_nothing() {
        let user = Uuid::new_v4();
        let mut board = board();
        board.is_deleted = true;

        assert!(!BoardTransition::Admit { principal_id: user }.permits(&board));
    }

    #[test]
    fn test_suspension_update_defaults_reason() {
        let mut principal = Principal::new(Uuid::new_v4(), "Sam");

        PrincipalUpdate::Suspension {
            suspended: true,
            reason: Some("   ".into()),
        }
        .apply(&mut principal);
        assert!(principal.suspended);
        assert_eq!(
            principal.suspension_reason.as_deref(),
            Some(DEFAULT_SUSPENSION_REASON)
        );
        assert!(principal.suspended_at.is_some());

        PrincipalUpdate::Suspension {
            suspended: false,
            reason: None,
        }
        .apply(&mut principal);
        assert!(!principal.suspended);
        assert!(principal.suspension_reason.is_none());
        assert!(principal.suspended_at.is_none());
    }
}
