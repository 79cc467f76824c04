//! Account-level suspension override.

use chrono::{DateTime, Utc};
use collabo_common::Principal;
use serde::Serialize;
use tracing::debug;

use crate::error::AccessError;
use crate::store::DEFAULT_SUSPENSION_REASON;

/// What a suspended principal is shown instead of the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuspensionNotice {
    pub reason: String,
    pub since: Option<DateTime<Utc>>,
}

/// Checked first on every gated path.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuspensionEnforcer;

impl SuspensionEnforcer {
    pub const fn new() -> Self {
        Self
    }

    #[must_use]
    pub const fn allow(&self, principal: &Principal) -> bool {
        !principal.suspended
    }

    pub fn ensure_active(&self, principal: &Principal) -> Result<(), AccessError> {
        if self.allow(principal) {
            return Ok(());
        }

        debug!(principal_id = %principal.id, "Rejecting suspended principal");
        Err(AccessError::Suspended {
            reason: principal.suspension_reason.clone(),
        })
    }

    /// Notice for a suspended principal, `None` when active.
    #[must_use]
    pub fn notice(&self, principal: &Principal) -> Option<SuspensionNotice> {
        principal.suspended.then(|| SuspensionNotice {
            reason: principal
                .suspension_reason
                .clone()
                .unwrap_or_else(|| DEFAULT_SUSPENSION_REASON.to_string()),
            since: principal.suspended_at,
        })
    }
}
