//! Access core error type.

use std::time::Duration;

use collabo_common::PrincipalId;
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by every gated operation.
///
/// All variants are terminal for the current attempt except
/// [`AccessError::StoreConflict`], which the ledger has already retried once
/// before surfacing it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The acting account is suspended.
    #[error("Account is suspended")]
    Suspended { reason: Option<String> },

    /// The board is deleted or does not exist.
    #[error("Board is unavailable")]
    BoardUnavailable,

    /// A join request for this principal is already waiting.
    #[error("Join request is already pending")]
    AlreadyPending,

    /// The principal has no pending join request on this board.
    #[error("No pending join request for this principal")]
    NotPending,

    /// The principal is not a member of this board.
    #[error("Principal is not a member of this board")]
    NotMember,

    /// Authorization failure.
    #[error("Access forbidden")]
    Forbidden,

    /// Actions are arriving faster than the minimum spacing.
    #[error("Sending too fast, retry in {}ms", .retry_after.as_millis())]
    TooFast { retry_after: Duration },

    /// The sliding window is full.
    #[error("Too many actions, retry in {}s", .retry_after.as_secs().max(1))]
    RateLimited { retry_after: Duration },

    /// The same content was sent moments ago.
    #[error("Duplicate content")]
    Duplicate { retry_after: Duration },

    /// A concurrent write won the race and the retry lost it again.
    #[error("Concurrent update conflict")]
    StoreConflict,

    /// The referenced principal does not exist.
    #[error("Principal {0} not found")]
    PrincipalNotFound(PrincipalId),

    /// The backing store failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl AccessError {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Suspended { .. } => "SUSPENDED",
            Self::BoardUnavailable => "BOARD_UNAVAILABLE",
            Self::AlreadyPending => "ALREADY_PENDING",
            Self::NotPending => "NOT_PENDING",
            Self::NotMember => "NOT_MEMBER",
            Self::Forbidden => "FORBIDDEN",
            Self::TooFast { .. } => "TOO_FAST",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Duplicate { .. } => "DUPLICATE",
            Self::StoreConflict => "STORE_CONFLICT",
            Self::PrincipalNotFound(_) => "PRINCIPAL_NOT_FOUND",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    /// Retry hint for abuse-gate denials.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::TooFast { retry_after }
            | Self::RateLimited { retry_after }
            | Self::Duplicate { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.retry_after().is_some() || matches!(self, Self::StoreConflict)
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BoardNotFound(_) => Self::BoardUnavailable,
            StoreError::PrincipalNotFound(id) => Self::PrincipalNotFound(id),
            StoreError::Conflict => Self::StoreConflict,
            StoreError::Backend(msg) => Self::Store(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let board = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert_eq!(
            AccessError::from(StoreError::BoardNotFound(board)),
            AccessError::BoardUnavailable
        );
        assert_eq!(
            AccessError::from(StoreError::PrincipalNotFound(user)),
            AccessError::PrincipalNotFound(user)
        );
        assert_eq!(
            AccessError::from(StoreError::Conflict),
            AccessError::StoreConflict
        );
        assert_eq!(
            AccessError::from(StoreError::Backend("timeout".into())),
            AccessError::Store("timeout".into())
        );
    }

    #[test]
    fn test_retry_hints() {
        let wait = Duration::from_secs(12);
        let limited = AccessError::RateLimited { retry_after: wait };
        assert_eq!(limited.retry_after(), Some(wait));
        assert!(limited.is_retryable());
        assert!(limited.to_string().contains("12s"));

        assert!(AccessError::StoreConflict.is_retryable());
        assert_eq!(AccessError::StoreConflict.retry_after(), None);
        assert!(!AccessError::Forbidden.is_retryable());
        assert!(!AccessError::NotPending.is_retryable());
    }

    #[test]
    fn test_codes_are_screaming_snake_case() {
        let errors = [
            AccessError::Suspended { reason: None },
            AccessError::BoardUnavailable,
            AccessError::AlreadyPending,
            AccessError::NotPending,
            AccessError::NotMember,
            AccessError::Forbidden,
            AccessError::TooFast {
                retry_after: Duration::ZERO,
            },
            AccessError::StoreConflict,
            AccessError::Store(String::new()),
        ];

        for err in errors {
            assert!(
                err.code()
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c == '_'),
                "code '{}' should be SCREAMING_SNAKE_CASE",
                err.code()
            );
        }
    }
}
