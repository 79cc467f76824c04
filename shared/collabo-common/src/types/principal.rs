//! Principal Types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier of an authenticated principal.
pub type PrincipalId = Uuid;

/// Account role.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular participant.
    #[default]
    Student,
    /// Staff member with moderation rights.
    Teacher,
    /// Platform administrator; not subject to policy overrides.
    Admin,
}

impl Role {
    /// Returns the string identifier used in stored documents.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }

    /// Returns every role.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Student, Self::Teacher, Self::Admin]
    }

    /// Staff roles (teacher or admin).
    #[must_use]
    pub const fn is_staff(&self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a role name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// An authenticated identity the core can authorize actions for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Stable identifier.
    pub id: PrincipalId,
    /// Display name.
    pub display_name: String,
    /// Email address, used by the elevation hook.
    #[serde(default)]
    pub email: Option<String>,
    /// Account role.
    #[serde(default)]
    pub role: Role,
    /// Whether the account is suspended.
    #[serde(default, alias = "isSuspended")]
    pub suspended: bool,
    /// Reason shown to a suspended principal.
    #[serde(default)]
    pub suspension_reason: Option<String>,
    /// When the suspension started.
    #[serde(default)]
    pub suspended_at: Option<DateTime<Utc>>,
}

impl Principal {
    /// Create an active student principal.
    pub fn new(id: PrincipalId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            email: None,
            role: Role::default(),
            suspended: false,
            suspension_reason: None,
            suspended_at: None,
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Mark the principal suspended with the given reason.
    #[must_use]
    pub fn suspended(mut self, reason: impl Into<String>) -> Self {
        self.suspended = true;
        self.suspension_reason = Some(reason.into());
        self.suspended_at = Some(Utc::now());
        self
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}
