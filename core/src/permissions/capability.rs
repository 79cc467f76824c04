//! Board capabilities and their hard-coded defaults.
//!
//! Capabilities come in two flavors:
//! - Member-scoped: content and board management, only meaningful for
//!   principals who joined the board (or own it)
//! - Global moderation: `MANAGE_MEMBERS` and `APPROVE_MEMBERS`, granted by role
//!   alone

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use collabo_common::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named, checkable permission on a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    /// Create, rename, reorder and delete sections.
    #[serde(alias = "canManageSections")]
    ManageSections,
    /// Delete comments written by others.
    #[serde(alias = "canDeleteComments")]
    DeleteAnyComment,
    /// Delete notes written by others.
    #[serde(alias = "canDeleteNotes")]
    DeleteAnyNote,
    /// Pin notes to the top of a section.
    #[serde(alias = "canPinNotes")]
    PinNote,
    /// Lock the comment thread of a note.
    #[serde(alias = "canLockComments")]
    LockComments,
    /// Create assignments.
    #[serde(alias = "canCreateAssignments")]
    CreateAssignment,
    /// Grade assignment submissions.
    #[serde(alias = "canGradeAssignments")]
    GradeAssignment,
    /// Change board settings.
    #[serde(alias = "canManageBoard")]
    ManageBoard,
    /// Remove members from a board.
    #[serde(alias = "canManageMembers")]
    ManageMembers,
    /// Approve or reject pending join requests.
    #[serde(alias = "canApproveMembers")]
    ApproveMembers,
}

impl Capability {
    /// Returns every capability.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::ManageSections,
            Self::DeleteAnyComment,
            Self::DeleteAnyNote,
            Self::PinNote,
            Self::LockComments,
            Self::CreateAssignment,
            Self::GradeAssignment,
            Self::ManageBoard,
            Self::ManageMembers,
            Self::ApproveMembers,
        ]
    }

    /// Canonical name used in policy documents.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ManageSections => "manageSections",
            Self::DeleteAnyComment => "deleteAnyComment",
            Self::DeleteAnyNote => "deleteAnyNote",
            Self::PinNote => "pinNote",
            Self::LockComments => "lockComments",
            Self::CreateAssignment => "createAssignment",
            Self::GradeAssignment => "gradeAssignment",
            Self::ManageBoard => "manageBoard",
            Self::ManageMembers => "manageMembers",
            Self::ApproveMembers => "approveMembers",
        }
    }

    /// Name used by older policy documents.
    #[must_use]
    pub const fn legacy_name(&self) -> &'static str {
        match self {
            Self::ManageSections => "canManageSections",
            Self::DeleteAnyComment => "canDeleteComments",
            Self::DeleteAnyNote => "canDeleteNotes",
            Self::PinNote => "canPinNotes",
            Self::LockComments => "canLockComments",
            Self::CreateAssignment => "canCreateAssignments",
            Self::GradeAssignment => "canGradeAssignments",
            Self::ManageBoard => "canManageBoard",
            Self::ManageMembers => "canManageMembers",
            Self::ApproveMembers => "canApproveMembers",
        }
    }

    /// Whether the capability only applies to principals who joined the board.
    #[must_use]
    pub const fn is_member_scoped(&self) -> bool {
        !matches!(self, Self::ManageMembers | Self::ApproveMembers)
    }

    /// Hard-coded grant used when no policy override exists.
    ///
    /// Admins hold every capability; teachers hold every capability by
    /// default; students hold none.
    #[must_use]
    pub const fn default_grant(&self, role: Role) -> bool {
        match role {
            Role::Admin => true,
            Role::Teacher => match self {
                Self::ManageSections
                | Self::DeleteAnyComment
                | Self::DeleteAnyNote
                | Self::PinNote
                | Self::LockComments
                | Self::CreateAssignment
                | Self::GradeAssignment
                | Self::ManageBoard
                | Self::ManageMembers
                | Self::ApproveMembers => true,
            },
            Role::Student => match self {
                Self::ManageSections
                | Self::DeleteAnyComment
                | Self::DeleteAnyNote
                | Self::PinNote
                | Self::LockComments
                | Self::CreateAssignment
                | Self::GradeAssignment
                | Self::ManageBoard
                | Self::ManageMembers
                | Self::ApproveMembers => false,
            },
        }
    }

    /// The single-bit set for this capability.
    #[must_use]
    pub const fn flag(&self) -> CapabilitySet {
        match self {
            Self::ManageSections => CapabilitySet::MANAGE_SECTIONS,
            Self::DeleteAnyComment => CapabilitySet::DELETE_ANY_COMMENT,
            Self::DeleteAnyNote => CapabilitySet::DELETE_ANY_NOTE,
            Self::PinNote => CapabilitySet::PIN_NOTE,
            Self::LockComments => CapabilitySet::LOCK_COMMENTS,
            Self::CreateAssignment => CapabilitySet::CREATE_ASSIGNMENT,
            Self::GradeAssignment => CapabilitySet::GRADE_ASSIGNMENT,
            Self::ManageBoard => CapabilitySet::MANAGE_BOARD,
            Self::ManageMembers => CapabilitySet::MANAGE_MEMBERS,
            Self::ApproveMembers => CapabilitySet::APPROVE_MEMBERS,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a capability name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capability: {0}")]
pub struct UnknownCapability(pub String);

impl FromStr for Capability {
    type Err = UnknownCapability;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s || c.legacy_name() == s)
            .ok_or_else(|| UnknownCapability(s.to_string()))
    }
}

bitflags! {
    /// Effective capability set of a principal on a board.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct CapabilitySet: u32 {
        // === Content moderation (bits 0-4) ===
        const MANAGE_SECTIONS    = 1 << 0;
        const DELETE_ANY_COMMENT = 1 << 1;
        const DELETE_ANY_NOTE    = 1 << 2;
        const PIN_NOTE           = 1 << 3;
        const LOCK_COMMENTS      = 1 << 4;

        // === Assignments (bits 5-6) ===
        const CREATE_ASSIGNMENT  = 1 << 5;
        const GRADE_ASSIGNMENT   = 1 << 6;

        // === Board management (bit 7) ===
        const MANAGE_BOARD       = 1 << 7;

        // === Membership moderation (bits 8-9) ===
        const MANAGE_MEMBERS     = 1 << 8;
        const APPROVE_MEMBERS    = 1 << 9;
    }
}

impl CapabilitySet {
    /// Capabilities that make a principal a moderator of a board.
    pub const MODERATION: Self = Self::MANAGE_MEMBERS.union(Self::APPROVE_MEMBERS);

    /// Check if this set includes the given capability.
    #[must_use]
    pub const fn has(self, capability: Capability) -> bool {
        self.contains(capability.flag())
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Capability> for CapabilitySet {
    fn from(capability: Capability) -> Self {
        capability.flag()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |set, capability| set | capability.flag())
    }
}
