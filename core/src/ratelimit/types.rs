//! Rate guard types.

use std::fmt;
use std::time::Duration;

use collabo_common::PrincipalId;
use serde::Serialize;

use crate::error::AccessError;

/// Content action classes, limited independently of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    /// Board chat message
    ChatMessage,
    /// Comment on a note
    Comment,
    /// New note
    Note,
    /// Direct message between principals
    DirectMessage,
}

impl ActionClass {
    /// Returns the string identifier for this class.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ChatMessage => "chat_message",
            Self::Comment => "comment",
            Self::Note => "note",
            Self::DirectMessage => "direct_message",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::ChatMessage,
            Self::Comment,
            Self::Note,
            Self::DirectMessage,
        ]
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which gate denied the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    TooFast,
    RateLimited,
    Duplicate,
}

/// Outcome of a rate guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny {
        reason: DenyReason,
        retry_after: Duration,
    },
}

impl Verdict {
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub const fn deny(reason: DenyReason, retry_after: Duration) -> Self {
        Self::Deny {
            reason,
            retry_after,
        }
    }

    /// Convert a denial into the matching [`AccessError`].
    pub fn into_result(self) -> Result<(), AccessError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny {
                reason: DenyReason::TooFast,
                retry_after,
            } => Err(AccessError::TooFast { retry_after }),
            Self::Deny {
                reason: DenyReason::RateLimited,
                retry_after,
            } => Err(AccessError::RateLimited { retry_after }),
            Self::Deny {
                reason: DenyReason::Duplicate,
                retry_after,
            } => Err(AccessError::Duplicate { retry_after }),
        }
    }
}

/// Key of one rate state entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateKey {
    pub principal_id: PrincipalId,
    pub action: ActionClass,
}

impl RateKey {
    pub const fn new(principal_id: PrincipalId, action: ActionClass) -> Self {
        Self {
            principal_id,
            action,
        }
    }
}
