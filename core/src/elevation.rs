//! Role elevation applied when a principal record is observed.

use std::collections::HashSet;
use std::fmt::Debug;

use collabo_common::{Principal, PrincipalId, Role};
use tracing::info;

/// Decides whether an observed principal should be upgraded to another role.
pub trait ElevationPolicy: Send + Sync + Debug {
    /// Role to force, or `None` to leave the record alone.
    fn elevate(&self, principal: &Principal) -> Option<Role>;
}

/// Elevates a fixed list of accounts to admin.
#[derive(Debug, Clone, Default)]
pub struct StaticElevation {
    emails: HashSet<String>,
    ids: HashSet<PrincipalId>,
}

impl StaticElevation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configured email addresses.
    pub fn from_emails<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        emails
            .into_iter()
            .fold(Self::default(), |policy, email| policy.with_email(email.as_ref()))
    }

    /// Email match is case-insensitive.
    #[must_use]
    pub fn with_email(mut self, email: &str) -> Self {
        let email = email.trim().to_lowercase();
        if !email.is_empty() {
            self.emails.insert(email);
        }
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: PrincipalId) -> Self {
        self.ids.insert(id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.ids.is_empty()
    }
}

impl ElevationPolicy for StaticElevation {
    fn elevate(&self, principal: &Principal) -> Option<Role> {
        let by_id = self.ids.contains(&principal.id);
        let by_email = principal
            .email
            .as_deref()
            .is_some_and(|email| self.emails.contains(&email.trim().to_lowercase()));

        (by_id || by_email).then_some(Role::Admin)
    }
}

/// Run `policy` against `principal`, returning whether the role changed.
pub fn apply(policy: &dyn ElevationPolicy, principal: &mut Principal) -> bool {
    match policy.elevate(principal) {
        Some(role) if role != principal.role => {
            info!(
                principal_id = %principal.id,
                from = %principal.role,
                to = %role,
                "Elevating principal role"
            );
            principal.role = role;
            true
        }
        _ => false,
    }
}
