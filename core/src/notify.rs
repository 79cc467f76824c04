//! Best-effort membership notifications.
//!
//! Events are dispatched on the runtime after a transition is committed and
//! are never awaited by it; delivery failures are logged and dropped.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use collabo_common::{BoardId, PrincipalId};
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MembershipEventKind {
    /// A join request is waiting for a moderator. Sent to the board owner.
    #[serde(rename = "member_request")]
    JoinRequested,
    /// Someone joined an open board. Sent to the board owner.
    #[serde(rename = "member_joined")]
    MemberJoined,
    #[serde(rename = "member_approved")]
    RequestApproved,
    #[serde(rename = "member_rejected")]
    RequestRejected,
    #[serde(rename = "member_removed")]
    MemberRemoved,
}

impl MembershipEventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::JoinRequested => "member_request",
            Self::MemberJoined => "member_joined",
            Self::RequestApproved => "member_approved",
            Self::RequestRejected => "member_rejected",
            Self::MemberRemoved => "member_removed",
        }
    }
}

impl fmt::Display for MembershipEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed membership change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipEvent {
    pub kind: MembershipEventKind,
    pub board_id: BoardId,
    /// Principal whose membership changed.
    pub target_id: PrincipalId,
    /// Principal who caused the change.
    pub actor_id: PrincipalId,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Notification channel closed")]
    Closed,

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: MembershipEvent) -> Result<(), NotifyError>;
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _event: MembershipEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<MembershipEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MembershipEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: MembershipEvent) -> Result<(), NotifyError> {
        self.tx.send(event).map_err(|_| NotifyError::Closed)
    }
}

/// Deliver `event` in the background.
///
/// Outside a tokio runtime there is nowhere to run delivery, so the event is
/// logged and dropped and `None` is returned.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: MembershipEvent) -> Option<JoinHandle<()>> {
    let Ok(handle) = Handle::try_current() else {
        warn!(
            kind = %event.kind,
            board_id = %event.board_id,
            "No runtime for membership notification, dropping event"
        );
        return None;
    };

    Some(handle.spawn(async move {
        let kind = event.kind;
        let board_id = event.board_id;
        match notifier.notify(event).await {
            Ok(()) => debug!(%kind, %board_id, "Membership notification sent"),
            Err(e) => warn!(%kind, %board_id, error = %e, "Membership notification failed"),
        }
    }))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn event(kind: MembershipEventKind) -> MembershipEvent {
        MembershipEvent {
            kind,
            board_id: Uuid::new_v4(),
            target_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let sent = event(MembershipEventKind::MemberJoined);

        dispatch(Arc::new(notifier), sent.clone())
            .unwrap()
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(sent));
    }

    #[tokio::test]
    async fn test_closed_channel_is_swallowed() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);

        assert_eq!(
            notifier
                .notify(event(MembershipEventKind::RequestRejected))
                .await,
            Err(NotifyError::Closed)
        );
        // The dispatched task must finish without panicking.
        dispatch(Arc::new(notifier), event(MembershipEventKind::MemberRemoved))
            .unwrap()
            .await
            .unwrap();
    }

    #[test]
    fn test_dispatch_without_runtime_drops_event() {
        let (notifier, mut rx) = ChannelNotifier::new();

        let handle = dispatch(Arc::new(notifier), event(MembershipEventKind::MemberJoined));

        assert!(handle.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(MembershipEventKind::JoinRequested.as_str(), "member_request");
        assert_eq!(
            serde_json::to_value(MembershipEventKind::RequestRejected).unwrap(),
            "member_rejected"
        );
    }
}
