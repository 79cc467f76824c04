//! Shared fixtures for access core integration tests.
//!
//! [`TestCore`] wires an [`AccessCore`] over an [`InMemoryStore`] with a
//! manual clock and a channel notifier. [`RacingStore`] and
//! [`ConflictingStore`] force the conflict paths of the membership ledger.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use collabo_common::{Board, BoardId, Principal, PrincipalId, Role};
use collabo_core::{
    AccessCore, BoardTransition, ChannelNotifier, InMemoryStore, ManualClock, MembershipEvent,
    Notifier, NotifyError, PermissionPolicy, PrincipalUpdate, RateGuardConfig, Store, StoreError,
};
use tokio::sync::{mpsc, Barrier};
use uuid::Uuid;

// ============================================================================
// Fixtures
// ============================================================================

pub struct TestCore {
    pub store: Arc<InMemoryStore>,
    pub core: AccessCore,
    pub clock: ManualClock,
    pub events: mpsc::UnboundedReceiver<MembershipEvent>,
}

impl TestCore {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryStore::new()))
    }

    pub fn with_store(store: Arc<InMemoryStore>) -> Self {
        let clock = ManualClock::starting_now();
        let (notifier, events) = ChannelNotifier::new();
        let core = AccessCore::builder(store.clone())
            .clock(Arc::new(clock.clone()))
            .notifier(Arc::new(notifier))
            .rate_guard(RateGuardConfig::default())
            .build();

        Self {
            store,
            core,
            clock,
            events,
        }
    }

    /// Register a principal with the store.
    pub fn principal(&self, name: &str, role: Role) -> Principal {
        self.store
            .observe_principal(Principal::new(Uuid::new_v4(), name).with_role(role))
    }

    /// Create a board owned by a freshly registered teacher.
    pub fn board(&self, require_approval: bool) -> (Board, Principal) {
        let owner = self.principal("owner", Role::Teacher);
        let board = Board::new(Uuid::new_v4(), owner.id, "Class board")
            .with_approval_required(require_approval);
        self.store.insert_board(board.clone());
        (board, owner)
    }

    pub fn snapshot(&self, board_id: BoardId) -> Board {
        self.store.board(board_id).expect("board exists")
    }

    pub async fn next_event(&mut self) -> MembershipEvent {
        tokio::time::timeout(std::time::Duration::from_secs(1), self.events.recv())
            .await
            .expect("event within a second")
            .expect("notifier channel open")
    }
}

/// `members` and `pending_members` must never overlap.
pub fn assert_disjoint(board: &Board) {
    for member in &board.members {
        assert!(
            !board.pending_members.contains_key(member),
            "{member} is both member and pending"
        );
    }
}

pub fn pending(board: Board, principal_id: PrincipalId) -> Board {
    let mut board = board;
    board
        .pending_members
        .insert(principal_id, chrono::Utc::now());
    board
}

// ============================================================================
// Store wrappers
// ============================================================================

/// Holds the first two board reads at a barrier so two transitions decide on
/// the same snapshot before either one writes.
pub struct RacingStore {
    inner: Arc<InMemoryStore>,
    barrier: Barrier,
    reads: AtomicUsize,
}

impl RacingStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            barrier: Barrier::new(2),
            reads: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Store for RacingStore {
    async fn get_board(&self, board_id: BoardId) -> Result<Board, StoreError> {
        let board = self.inner.get_board(board_id).await?;
        if self.reads.fetch_add(1, Ordering::SeqCst) < 2 {
            self.barrier.wait().await;
        }
        Ok(board)
    }

    async fn get_principal(&self, principal_id: PrincipalId) -> Result<Principal, StoreError> {
        self.inner.get_principal(principal_id).await
    }

    async fn atomic_transition(
        &self,
        board_id: BoardId,
        transition: BoardTransition,
    ) -> Result<Board, StoreError> {
        self.inner.atomic_transition(board_id, transition).await
    }

    async fn get_policy(&self) -> Result<PermissionPolicy, StoreError> {
        self.inner.get_policy().await
    }

    async fn put_policy(&self, policy: PermissionPolicy) -> Result<(), StoreError> {
        self.inner.put_policy(policy).await
    }

    async fn update_principal(
        &self,
        principal_id: PrincipalId,
        update: PrincipalUpdate,
    ) -> Result<Principal, StoreError> {
        self.inner.update_principal(principal_id, update).await
    }
}

/// Rejects every transition with a conflict and counts the attempts.
pub struct ConflictingStore {
    inner: Arc<InMemoryStore>,
    pub attempts: AtomicUsize,
}

impl ConflictingStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Store for ConflictingStore {
    async fn get_board(&self, board_id: BoardId) -> Result<Board, StoreError> {
        self.inner.get_board(board_id).await
    }

    async fn get_principal(&self, principal_id: PrincipalId) -> Result<Principal, StoreError> {
        self.inner.get_principal(principal_id).await
    }

    async fn atomic_transition(
        &self,
        _board_id: BoardId,
        _transition: BoardTransition,
    ) -> Result<Board, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Conflict)
    }

    async fn get_policy(&self) -> Result<PermissionPolicy, StoreError> {
        self.inner.get_policy().await
    }

    async fn put_policy(&self, policy: PermissionPolicy) -> Result<(), StoreError> {
        self.inner.put_policy(policy).await
    }

    async fn update_principal(
        &self,
        principal_id: PrincipalId,
        update: PrincipalUpdate,
    ) -> Result<Principal, StoreError> {
        self.inner.update_principal(principal_id, update).await
    }
}

// ============================================================================
// Notifiers
// ============================================================================

/// Fails every delivery.
pub struct FailingNotifier {
    pub calls: AtomicUsize,
}

impl FailingNotifier {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _event: MembershipEvent) -> Result<(), NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Delivery("push gateway down".into()))
    }
}
