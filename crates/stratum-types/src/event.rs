//! Lifecycle events emitted by permission holders.

use serde::{Deserialize, Serialize};

use crate::node::Node;

/// Whether a holder is a user (identified by UUID) or a group
/// (identified by name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HolderKind {
    User,
    Group,
}

/// A lightweight reference to the holder an event originated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderRef {
    pub name: String,
    pub kind: HolderKind,
}

/// Events describing mutations of a holder's node sets.
///
/// Emission is fire-and-forget: events are dispatched after the
/// mutation is visible and never block the mutating caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HolderEvent {
    /// A node was added to one of the holder's sets.
    PermissionNodeSet { holder: HolderRef, node: Node },

    /// A non-group node was removed.
    PermissionNodeUnset { holder: HolderRef, node: Node },

    /// A temporary node was removed by the expiry auditor.
    PermissionNodeExpire { holder: HolderRef, node: Node },

    /// A group membership node was removed.
    GroupRemove {
        holder: HolderRef,
        group_name: String,
        server: Option<String>,
        world: Option<String>,
        temporary: bool,
    },
}

impl HolderEvent {
    /// The holder the event originated from.
    pub fn holder(&self) -> &HolderRef {
        match self {
            HolderEvent::PermissionNodeSet { holder, .. }
            | HolderEvent::PermissionNodeUnset { holder, .. }
            | HolderEvent::PermissionNodeExpire { holder, .. }
            | HolderEvent::GroupRemove { holder, .. } => holder,
        }
    }
}
