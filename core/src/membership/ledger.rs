//! Membership state machine over the store.
//!
//! Every transition is a read-check-write: load the board, decide against the
//! snapshot, then commit a [`BoardTransition`] whose precondition the store
//! re-checks atomically. A lost race is re-read and re-decided once before
//! [`AccessError::StoreConflict`] is surfaced.

use std::sync::Arc;

use collabo_common::{Board, BoardId, MembershipRequest, Principal, PrincipalId};
use tracing::{debug, info, warn};

use super::state::MembershipState;
use crate::clock::Clock;
use crate::error::AccessError;
use crate::notify::{self, MembershipEvent, MembershipEventKind, Notifier};
use crate::permissions::{Capability, RoleResolver};
use crate::store::{BoardTransition, Store, StoreError};
use crate::suspension::SuspensionEnforcer;

/// Initial attempt plus one retry after a conflict.
const MAX_ATTEMPTS: u32 = 2;

/// Decision taken against a board snapshot.
enum Step {
    /// Nothing to write; the principal already is in `state`.
    Done(MembershipState),
    /// Commit `transition`, after which the principal is in `state`.
    Write(BoardTransition, MembershipState),
}

struct Committed {
    state: MembershipState,
    changed: bool,
}

/// Owns the (principal, board) relationship transitions.
pub struct MembershipLedger {
    store: Arc<dyn Store>,
    resolver: RoleResolver,
    suspension: SuspensionEnforcer,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl MembershipLedger {
    pub fn new(
        store: Arc<dyn Store>,
        resolver: RoleResolver,
        suspension: SuspensionEnforcer,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            resolver,
            suspension,
            notifier,
            clock,
        }
    }

    /// Join `board_id`, directly or by queuing a request.
    ///
    /// Returns [`MembershipState::Member`] (or `Owner`) when already joined,
    /// without touching the board.
    #[tracing::instrument(skip(self, principal), fields(principal_id = %principal.id))]
    pub async fn request_join(
        &self,
        principal: &Principal,
        board_id: BoardId,
    ) -> Result<MembershipState, AccessError> {
        self.suspension.ensure_active(principal)?;

        let committed = self
            .commit(board_id, |board| match MembershipState::of(board, principal.id) {
                state @ (MembershipState::Member | MembershipState::Owner) => {
                    debug!("Already joined, nothing to do");
                    Ok(Step::Done(state))
                }
                MembershipState::Pending if board.requires_approval() => {
                    Err(AccessError::AlreadyPending)
                }
                MembershipState::None if board.requires_approval() => Ok(Step::Write(
                    BoardTransition::Enqueue {
                        principal_id: principal.id,
                        requested_at: self.clock.utc_now(),
                    },
                    MembershipState::Pending,
                )),
                // Approval was switched off while a request was waiting.
                MembershipState::None | MembershipState::Pending => Ok(Step::Write(
                    BoardTransition::Admit {
                        principal_id: principal.id,
                    },
                    MembershipState::Member,
                )),
            })
            .await?;

        if committed.changed {
            let kind = if committed.state == MembershipState::Pending {
                MembershipEventKind::JoinRequested
            } else {
                MembershipEventKind::MemberJoined
            };
            info!(%board_id, state = ?committed.state, "Join processed");
            self.emit(kind, board_id, principal.id, principal.id);
        }

        Ok(committed.state)
    }

    /// Accept a pending request.
    #[tracing::instrument(skip(self, moderator), fields(actor_id = %moderator.id))]
    pub async fn approve(
        &self,
        moderator: &Principal,
        board_id: BoardId,
        target_id: PrincipalId,
    ) -> Result<MembershipState, AccessError> {
        self.suspension.ensure_active(moderator)?;

        let committed = self
            .commit(board_id, |board| {
                self.require_moderation(moderator, board, Capability::ApproveMembers)?;
                if !board.is_pending(target_id) {
                    return Err(AccessError::NotPending);
                }
                Ok(Step::Write(
                    BoardTransition::Approve {
                        principal_id: target_id,
                    },
                    MembershipState::Member,
                ))
            })
            .await?;

        info!(%board_id, %target_id, "Join request approved");
        self.emit(
            MembershipEventKind::RequestApproved,
            board_id,
            target_id,
            moderator.id,
        );
        Ok(committed.state)
    }

    /// Drop a pending request.
    #[tracing::instrument(skip(self, moderator), fields(actor_id = %moderator.id))]
    pub async fn reject(
        &self,
        moderator: &Principal,
        board_id: BoardId,
        target_id: PrincipalId,
    ) -> Result<(), AccessError> {
        self.suspension.ensure_active(moderator)?;

        self.commit(board_id, |board| {
            self.require_moderation(moderator, board, Capability::ApproveMembers)?;
            if !board.is_pending(target_id) {
                return Err(AccessError::NotPending);
            }
            Ok(Step::Write(
                BoardTransition::Dismiss {
                    principal_id: target_id,
                },
                MembershipState::None,
            ))
        })
        .await?;

        info!(%board_id, %target_id, "Join request rejected");
        self.emit(
            MembershipEventKind::RequestRejected,
            board_id,
            target_id,
            moderator.id,
        );
        Ok(())
    }

    /// Leave a board the principal is a member of.
    ///
    /// The owner cannot leave. Neither can the last member of a board whose
    /// owner account no longer exists, which would orphan the board.
    #[tracing::instrument(skip(self, principal), fields(principal_id = %principal.id))]
    pub async fn leave(&self, principal: &Principal, board_id: BoardId) -> Result<(), AccessError> {
        self.suspension.ensure_active(principal)?;

        let board = self.load_board(board_id).await?;
        let owner_present = self.principal_exists(board.owner_id).await?;

        self.commit(board_id, |board| {
            if board.is_owner(principal.id) {
                return Err(AccessError::Forbidden);
            }
            if !board.members.contains(&principal.id) {
                return Err(AccessError::NotMember);
            }
            if owner_present {
                return Ok(Step::Write(
                    BoardTransition::Expel {
                        principal_id: principal.id,
                    },
                    MembershipState::None,
                ));
            }
            if board.members.len() == 1 {
                warn!(%board_id, "Refusing to orphan board without owner");
                return Err(AccessError::Forbidden);
            }
            // The store re-checks that someone stays behind.
            Ok(Step::Write(
                BoardTransition::Withdraw {
                    principal_id: principal.id,
                },
                MembershipState::None,
            ))
        })
        .await?;

        info!(%board_id, "Member left board");
        Ok(())
    }

    /// Remove another member.
    #[tracing::instrument(skip(self, moderator), fields(actor_id = %moderator.id))]
    pub async fn remove(
        &self,
        moderator: &Principal,
        board_id: BoardId,
        target_id: PrincipalId,
    ) -> Result<(), AccessError> {
        self.suspension.ensure_active(moderator)?;

        self.commit(board_id, |board| {
            self.require_moderation(moderator, board, Capability::ManageMembers)?;
            if board.is_owner(target_id) {
                warn!(%board_id, "Attempt to remove board owner");
                return Err(AccessError::Forbidden);
            }
            if !board.members.contains(&target_id) {
                return Err(AccessError::NotMember);
            }
            Ok(Step::Write(
                BoardTransition::Expel {
                    principal_id: target_id,
                },
                MembershipState::None,
            ))
        })
        .await?;

        info!(%board_id, %target_id, "Member removed");
        self.emit(
            MembershipEventKind::MemberRemoved,
            board_id,
            target_id,
            moderator.id,
        );
        Ok(())
    }

    /// Current relationship of `principal` to `board_id`.
    pub async fn state_of(
        &self,
        principal: &Principal,
        board_id: BoardId,
    ) -> Result<MembershipState, AccessError> {
        self.suspension.ensure_active(principal)?;
        let board = self.load_board(board_id).await?;
        Ok(MembershipState::of(&board, principal.id))
    }

    /// Pending requests, oldest first. Moderators only.
    #[tracing::instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn pending_requests(
        &self,
        actor: &Principal,
        board_id: BoardId,
    ) -> Result<Vec<MembershipRequest>, AccessError> {
        self.suspension.ensure_active(actor)?;
        let board = self.load_board(board_id).await?;
        self.require_moderation(actor, &board, Capability::ApproveMembers)?;
        Ok(board.pending_requests())
    }

    async fn load_board(&self, board_id: BoardId) -> Result<Board, AccessError> {
        let board = self.store.get_board(board_id).await?;
        if board.is_deleted {
            return Err(AccessError::BoardUnavailable);
        }
        Ok(board)
    }

    async fn principal_exists(&self, principal_id: PrincipalId) -> Result<bool, AccessError> {
        match self.store.get_principal(principal_id).await {
            Ok(_) => Ok(true),
            Err(StoreError::PrincipalNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn require_moderation(
        &self,
        moderator: &Principal,
        board: &Board,
        capability: Capability,
    ) -> Result<(), AccessError> {
        self.resolver
            .require(moderator, board, capability)
            .inspect_err(|_| {
                warn!(
                    board_id = %board.id,
                    actor_id = %moderator.id,
                    %capability,
                    "Moderation denied"
                );
            })
    }

    async fn commit<F>(&self, board_id: BoardId, plan: F) -> Result<Committed, AccessError>
    where
        F: Fn(&Board) -> Result<Step, AccessError>,
    {
        let mut attempt = 1;
        loop {
            let board = self.load_board(board_id).await?;
            let (transition, state) = match plan(&board)? {
                Step::Done(state) => {
                    return Ok(Committed {
                        state,
                        changed: false,
                    })
                }
                Step::Write(transition, state) => (transition, state),
            };

            match self.store.atomic_transition(board_id, transition).await {
                Ok(_) => {
                    return Ok(Committed {
                        state,
                        changed: true,
                    })
                }
                Err(StoreError::Conflict) if attempt < MAX_ATTEMPTS => {
                    debug!(
                        %board_id,
                        action = transition.action_name(),
                        attempt,
                        "Transition conflicted, re-reading board"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn emit(
        &self,
        kind: MembershipEventKind,
        board_id: BoardId,
        target_id: PrincipalId,
        actor_id: PrincipalId,
    ) {
        notify::dispatch(
            Arc::clone(&self.notifier),
            MembershipEvent {
                kind,
                board_id,
                target_id,
                actor_id,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use collabo_common::Role;
    use uuid::Uuid;

    use chrono::Utc;

    use super::*;
    use crate::clock::SystemClock;
    use crate::notify::NoopNotifier;
    use crate::permissions::PermissionPolicyStore;
    use crate::store::InMemoryStore;

    fn ledger(store: Arc<InMemoryStore>) -> MembershipLedger {
        MembershipLedger::new(
            store,
            RoleResolver::new(Arc::new(PermissionPolicyStore::new())),
            SuspensionEnforcer::new(),
            Arc::new(NoopNotifier),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn test_open_board_join_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let board = Board::new(Uuid::new_v4(), Uuid::new_v4(), "Open");
        let board_id = board.id;
        store.insert_board(board);
        let ledger = ledger(Arc::clone(&store));
        let student = Principal::new(Uuid::new_v4(), "S");

        assert_eq!(
            ledger.request_join(&student, board_id).await,
            Ok(MembershipState::Member)
        );
        let after_first = store.board(board_id).unwrap();
        assert_eq!(
            ledger.request_join(&student, board_id).await,
            Ok(MembershipState::Member)
        );
        assert_eq!(store.board(board_id).unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_owner_join_is_noop() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Principal::new(Uuid::new_v4(), "O").with_role(Role::Teacher);
        let board = Board::new(Uuid::new_v4(), owner.id, "Mine");
        let board_id = board.id;
        store.insert_board(board);

        assert_eq!(
            ledger(Arc::clone(&store)).request_join(&owner, board_id).await,
            Ok(MembershipState::Owner)
        );
        assert!(store.board(board_id).unwrap().members.is_empty());
    }

    #[tokio::test]
    async fn test_open_board_admits_stale_request() {
        let store = Arc::new(InMemoryStore::new());
        let student = Principal::new(Uuid::new_v4(), "S");
        let mut board = Board::new(Uuid::new_v4(), Uuid::new_v4(), "Reopened");
        board.pending_members.insert(student.id, Utc::now());
        let board_id = board.id;
        store.insert_board(board);

        assert_eq!(
            ledger(Arc::clone(&store)).request_join(&student, board_id).await,
            Ok(MembershipState::Member)
        );
        let after = store.board(board_id).unwrap();
        assert!(after.members.contains(&student.id));
        assert!(!after.is_pending(student.id));
    }

    #[tokio::test]
    async fn test_missing_board_is_unavailable() {
        let store = Arc::new(InMemoryStore::new());
        let student = Principal::new(Uuid::new_v4(), "S");

        assert_eq!(
            ledger(store).request_join(&student, Uuid::new_v4()).await,
            Err(AccessError::BoardUnavailable)
        );
    }
}
