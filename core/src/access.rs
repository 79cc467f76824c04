//! Entry point wiring the access components together.
//!
//! Every gated path runs the suspension check first, then either the
//! membership ledger or the role resolver. Content actions additionally pass
//! the rate guard.

use std::sync::Arc;

use collabo_common::{Board, BoardId, MembershipRequest, Principal, PrincipalId};
use tracing::{debug, info};

use crate::admin::AdminService;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::elevation::StaticElevation;
use crate::error::AccessError;
use crate::membership::{MembershipLedger, MembershipState};
use crate::notify::{NoopNotifier, Notifier};
use crate::permissions::{Capability, CapabilitySet, PermissionPolicy, PermissionPolicyStore, RoleResolver};
use crate::ratelimit::{ActionClass, RateGuard, RateGuardConfig};
use crate::store::Store;
use crate::suspension::{SuspensionEnforcer, SuspensionNotice};

/// Builder for [`AccessCore`].
pub struct AccessCoreBuilder {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    rate_guard: RateGuardConfig,
    policy: PermissionPolicy,
}

impl AccessCoreBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn rate_guard(mut self, config: RateGuardConfig) -> Self {
        self.rate_guard = config;
        self
    }

    /// Initial policy, used until [`AccessCore::refresh_policy`] runs.
    #[must_use]
    pub fn policy(mut self, policy: PermissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> AccessCore {
        let policies = Arc::new(PermissionPolicyStore::with_policy(self.policy));
        let resolver = RoleResolver::new(Arc::clone(&policies));
        let suspension = SuspensionEnforcer::new();
        let ledger = MembershipLedger::new(
            Arc::clone(&self.store),
            resolver.clone(),
            suspension,
            self.notifier,
            Arc::clone(&self.clock),
        );

        AccessCore {
            store: self.store,
            policies,
            resolver,
            suspension,
            ledger,
            rate_guard: Arc::new(RateGuard::new(self.rate_guard, self.clock)),
        }
    }
}

/// Authorization and membership core for boards.
pub struct AccessCore {
    store: Arc<dyn Store>,
    policies: Arc<PermissionPolicyStore>,
    resolver: RoleResolver,
    suspension: SuspensionEnforcer,
    ledger: MembershipLedger,
    rate_guard: Arc<RateGuard>,
}

impl AccessCore {
    /// Start building a core over `store` with system time, no notifications,
    /// default rate limits and an empty policy.
    pub fn builder(store: Arc<dyn Store>) -> AccessCoreBuilder {
        AccessCoreBuilder {
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(NoopNotifier),
            rate_guard: RateGuardConfig::default(),
            policy: PermissionPolicy::default(),
        }
    }

    /// Build a core from loaded configuration.
    pub fn from_config(store: Arc<dyn Store>, config: &Config) -> Self {
        Self::builder(store)
            .rate_guard(config.rate_guard.clone())
            .build()
    }

    /// Elevation hook matching the configured admin emails.
    pub fn elevation_from_config(config: &Config) -> StaticElevation {
        StaticElevation::from_emails(&config.elevated_admin_emails)
    }

    // ========================================================================
    // Authorization
    // ========================================================================

    /// Whether `principal` may exercise `capability` on `board`.
    pub fn authorize(
        &self,
        principal: &Principal,
        board: &Board,
        capability: Capability,
    ) -> Result<(), AccessError> {
        self.suspension.ensure_active(principal)?;
        if board.is_deleted {
            return Err(AccessError::BoardUnavailable);
        }
        self.resolver.require(principal, board, capability)
    }

    #[must_use]
    pub fn is_authorized(&self, principal: &Principal, board: &Board, capability: Capability) -> bool {
        self.authorize(principal, board, capability).is_ok()
    }

    /// Effective capability set, empty for suspended principals and deleted boards.
    #[must_use]
    pub fn capabilities(&self, principal: &Principal, board: &Board) -> CapabilitySet {
        if !self.suspension.allow(principal) || board.is_deleted {
            return CapabilitySet::empty();
        }
        self.resolver.capabilities(principal, board)
    }

    /// [`Self::authorize`] against fresh store records.
    #[tracing::instrument(skip(self))]
    pub async fn check_access(
        &self,
        principal_id: PrincipalId,
        board_id: BoardId,
        capability: Capability,
    ) -> Result<(), AccessError> {
        let principal = self.store.get_principal(principal_id).await?;
        let board = self.store.get_board(board_id).await?;
        self.authorize(&principal, &board, capability)
    }

    // ========================================================================
    // Membership
    // ========================================================================

    pub async fn request_join(
        &self,
        principal: &Principal,
        board_id: BoardId,
    ) -> Result<MembershipState, AccessError> {
        self.ledger.request_join(principal, board_id).await
    }

    pub async fn approve(
        &self,
        moderator: &Principal,
        board_id: BoardId,
        target_id: PrincipalId,
    ) -> Result<MembershipState, AccessError> {
        self.ledger.approve(moderator, board_id, target_id).await
    }

    pub async fn reject(
        &self,
        moderator: &Principal,
        board_id: BoardId,
        target_id: PrincipalId,
    ) -> Result<(), AccessError> {
        self.ledger.reject(moderator, board_id, target_id).await
    }

    pub async fn leave(&self, principal: &Principal, board_id: BoardId) -> Result<(), AccessError> {
        self.ledger.leave(principal, board_id).await
    }

    pub async fn remove(
        &self,
        moderator: &Principal,
        board_id: BoardId,
        target_id: PrincipalId,
    ) -> Result<(), AccessError> {
        self.ledger.remove(moderator, board_id, target_id).await
    }

    pub async fn membership_state(
        &self,
        principal: &Principal,
        board_id: BoardId,
    ) -> Result<MembershipState, AccessError> {
        self.ledger.state_of(principal, board_id).await
    }

    pub async fn pending_requests(
        &self,
        actor: &Principal,
        board_id: BoardId,
    ) -> Result<Vec<MembershipRequest>, AccessError> {
        self.ledger.pending_requests(actor, board_id).await
    }

    // ========================================================================
    // Content actions
    // ========================================================================

    /// Admit a content action through the abuse gate and record it.
    pub fn gate_action(
        &self,
        principal: &Principal,
        action: ActionClass,
        content: &str,
    ) -> Result<(), AccessError> {
        self.suspension.ensure_active(principal)?;
        self.rate_guard
            .gate(principal.id, action, content)
            .into_result()
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Available to suspended principals.
    #[must_use]
    pub fn suspension_notice(&self, principal: &Principal) -> Option<SuspensionNotice> {
        self.suspension.notice(principal)
    }

    /// Drop per-session state of a principal. Never gated.
    pub fn logout(&self, principal_id: PrincipalId) {
        let cleared = self.rate_guard.clear(principal_id);
        debug!(%principal_id, cleared, "Principal logged out");
    }

    // ========================================================================
    // Policy and admin
    // ========================================================================

    /// Reload the permission policy from the store.
    pub async fn refresh_policy(&self) -> Result<(), AccessError> {
        self.policies.refresh(self.store.as_ref()).await?;
        info!("Permission policy refreshed");
        Ok(())
    }

    pub fn admin(&self) -> AdminService {
        AdminService::new(Arc::clone(&self.store), Arc::clone(&self.policies))
    }

    pub fn policies(&self) -> &Arc<PermissionPolicyStore> {
        &self.policies
    }

    pub const fn resolver(&self) -> &RoleResolver {
        &self.resolver
    }

    pub fn rate_guard(&self) -> &Arc<RateGuard> {
        &self.rate_guard
    }
}
