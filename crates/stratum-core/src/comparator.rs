//! Priority ordering over permission nodes.
//!
//! The resolver iterates nodes in descending specificity so that more
//! specific nodes mask less specific ones. [`priority_cmp`] defines
//! specificity; [`LocalizedNode`] wraps a node with its source holder
//! and sorts most-specific-first, so a `BTreeSet<LocalizedNode>`
//! iterates in exactly the order the resolver consumes.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use stratum_types::Node;

/// Compare two nodes by specificity; `Greater` means more specific.
///
/// Key order: expiry presence, world assignment, server assignment,
/// non-empty tags, fewer wildcard segments, then the permission string
/// and the remaining fields as a stable canonical tiebreak. The result
/// is `Equal` only for structurally equal nodes, so the order is total
/// and agrees with itself across threads.
pub fn priority_cmp(a: &Node, b: &Node) -> Ordering {
    a.is_temporary()
        .cmp(&b.is_temporary())
        .then_with(|| a.is_world_specific().cmp(&b.is_world_specific()))
        .then_with(|| a.is_server_specific().cmp(&b.is_server_specific()))
        .then_with(|| (!a.context().is_empty()).cmp(&(!b.context().is_empty())))
        .then_with(|| b.wildcard_level().cmp(&a.wildcard_level()))
        .then_with(|| a.permission().cmp(b.permission()))
        .then_with(|| {
            (a.server(), a.world(), a.expiry(), a.value()).cmp(&(
                b.server(),
                b.world(),
                b.expiry(),
                b.value(),
            ))
        })
        .then_with(|| a.context().iter().cmp(b.context().iter()))
}

/// A node paired with the holder it was sourced from.
///
/// The location is the immediate ancestor, not the transitive origin,
/// and is informational only: equality, hashing, and ordering all
/// delegate to the contained node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizedNode {
    node: Node,
    location: String,
}

impl LocalizedNode {
    pub fn new(node: Node, location: impl Into<String>) -> Self {
        Self {
            node,
            location: location.into(),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn into_node(self) -> Node {
        self.node
    }
}

impl PartialEq for LocalizedNode {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl Eq for LocalizedNode {}

impl std::hash::Hash for LocalizedNode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

impl PartialOrd for LocalizedNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LocalizedNode {
    /// Descending specificity: the most specific node sorts first.
    fn cmp(&self, other: &Self) -> Ordering {
        priority_cmp(&self.node, &other.node).reverse()
    }
}
