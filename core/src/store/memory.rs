//! In-process [`Store`] backed by concurrent maps.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use collabo_common::{Board, BoardId, Principal, PrincipalId};
use dashmap::DashMap;
use tracing::debug;

use super::{BoardTransition, PrincipalUpdate, Store, StoreError};
use crate::elevation::{self, ElevationPolicy};
use crate::permissions::PermissionPolicy;

/// Store used by tests and single-process deployments.
///
/// Each board entry is locked for the duration of a transition, which gives
/// the per-board atomicity [`Store::atomic_transition`] requires.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    boards: DashMap<BoardId, Board>,
    principals: DashMap<PrincipalId, Principal>,
    policy: RwLock<PermissionPolicy>,
    elevation: Option<Arc<dyn ElevationPolicy>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `policy` on every principal record passed to [`Self::observe_principal`].
    #[must_use]
    pub fn with_elevation(mut self, policy: Arc<dyn ElevationPolicy>) -> Self {
        self.elevation = Some(policy);
        self
    }

    pub fn insert_board(&self, board: Board) {
        self.boards.insert(board.id, board);
    }

    /// Upsert a principal record as it arrives from the identity provider.
    ///
    /// Returns the stored record, which may carry an elevated role.
    pub fn observe_principal(&self, mut principal: Principal) -> Principal {
        if let Some(policy) = &self.elevation {
            elevation::apply(policy.as_ref(), &mut principal);
        }
        self.principals.insert(principal.id, principal.clone());
        principal
    }

    /// Current snapshot of a board.
    pub fn board(&self, board_id: BoardId) -> Option<Board> {
        self.boards.get(&board_id).map(|entry| entry.clone())
    }

    /// Soft-delete a board.
    pub fn delete_board(&self, board_id: BoardId) -> bool {
        self.boards
            .get_mut(&board_id)
            .map(|mut board| board.is_deleted = true)
            .is_some()
    }

    pub fn remove_principal(&self, principal_id: PrincipalId) -> Option<Principal> {
        self.principals.remove(&principal_id).map(|(_, p)| p)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_board(&self, board_id: BoardId) -> Result<Board, StoreError> {
        self.board(board_id)
            .ok_or(StoreError::BoardNotFound(board_id))
    }

    async fn get_principal(&self, principal_id: PrincipalId) -> Result<Principal, StoreError> {
        self.principals
            .get(&principal_id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::PrincipalNotFound(principal_id))
    }

    async fn atomic_transition(
        &self,
        board_id: BoardId,
        transition: BoardTransition,
    ) -> Result<Board, StoreError> {
        let mut board = self
            .boards
            .get_mut(&board_id)
            .ok_or(StoreError::BoardNotFound(board_id))?;

        if !transition.permits(&board) {
            debug!(
                board_id = %board_id,
                principal_id = %transition.principal_id(),
                action = transition.action_name(),
                "Transition precondition failed"
            );
            return Err(StoreError::Conflict);
        }

        transition.apply(&mut board);
        Ok(board.clone())
    }

    async fn get_policy(&self) -> Result<PermissionPolicy, StoreError> {
        Ok(self
            .policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn put_policy(&self, policy: PermissionPolicy) -> Result<(), StoreError> {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
        Ok(())
    }

    async fn update_principal(
        &self,
        principal_id: PrincipalId,
        update: PrincipalUpdate,
    ) -> Result<Principal, StoreError> {
        let mut principal = self
            .principals
            .get_mut(&principal_id)
            .ok_or(StoreError::PrincipalNotFound(principal_id))?;

        update.apply(&mut principal);
        Ok(principal.clone())
    }
}
