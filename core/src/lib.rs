//! Collabo Access Core
//!
//! Authorization and membership lifecycle for shared boards: role and
//! policy based capabilities, join/approve/leave transitions, an abuse gate
//! for content actions and account suspension.

pub mod access;
pub mod admin;
pub mod clock;
pub mod config;
pub mod elevation;
pub mod error;
pub mod membership;
pub mod notify;
pub mod observability;
pub mod permissions;
pub mod ratelimit;
pub mod store;
pub mod suspension;

pub use access::{AccessCore, AccessCoreBuilder};
pub use admin::AdminService;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, LogFormat};
pub use elevation::{ElevationPolicy, StaticElevation};
pub use error::AccessError;
pub use membership::{MembershipLedger, MembershipState};
pub use notify::{
    ChannelNotifier, MembershipEvent, MembershipEventKind, NoopNotifier, Notifier, NotifyError,
};
pub use permissions::{Capability, CapabilitySet, PermissionPolicy, PermissionPolicyStore, RoleResolver};
pub use ratelimit::{ActionClass, DenyReason, RateGuard, RateGuardConfig, Verdict};
pub use store::{BoardTransition, InMemoryStore, PrincipalUpdate, Store, StoreError};
pub use suspension::{SuspensionEnforcer, SuspensionNotice};
