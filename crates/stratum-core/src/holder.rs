//! Permission holders: the entities that carry nodes.
//!
//! A [`PermissionHolder`] owns two node sets, a persistent one and a
//! transient (in-memory only) one. Many readers may resolve
//! concurrently while occasional writers mutate the sets; every read
//! path works on a snapshot taken under the read lock, and writes are
//! serialized by the write lock. Resolution across the inheritance
//! graph lives in [`crate::graph`], export in [`crate::export`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use stratum_config::ResolverConfig;
use stratum_types::{
    HolderError, HolderEvent, HolderKind, HolderRef, Node, NodeError, Tristate,
};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::comparator::LocalizedNode;
use crate::events::EventSink;

/// Current unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// An entity that can hold permissions: a user or a group.
pub struct PermissionHolder {
    /// The UUID of the user / name of the group. Used to prevent
    /// circular inheritance and to stamp resolved nodes.
    object_name: String,

    kind: HolderKind,

    /// The holder's persistent permissions.
    nodes: RwLock<HashSet<Node>>,

    /// The holder's transient permissions, never persisted.
    transient_nodes: RwLock<HashSet<Node>>,

    config: ResolverConfig,

    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PermissionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionHolder")
            .field("object_name", &self.object_name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl PermissionHolder {
    /// Create a user holder, identified by its UUID.
    pub fn user(id: Uuid, config: ResolverConfig, events: Arc<dyn EventSink>) -> Self {
        Self::new(id.to_string(), HolderKind::User, config, events)
    }

    /// Create a group holder. Group names are lowercased so that
    /// inheritance references and cycle detection are case-insensitive.
    pub fn group(name: &str, config: ResolverConfig, events: Arc<dyn EventSink>) -> Self {
        Self::new(name.to_lowercase(), HolderKind::Group, config, events)
    }

    fn new(
        object_name: String,
        kind: HolderKind,
        config: ResolverConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            object_name,
            kind,
            nodes: RwLock::new(HashSet::new()),
            transient_nodes: RwLock::new(HashSet::new()),
            config,
            events,
        }
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn kind(&self) -> HolderKind {
        self.kind
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        self.config
    }

    pub(crate) fn holder_ref(&self) -> HolderRef {
        HolderRef {
            name: self.object_name.clone(),
            kind: self.kind,
        }
    }

    // ========================================================================
    // Node set access
    // ========================================================================

    /// Snapshot of the persistent node set.
    pub async fn nodes(&self) -> HashSet<Node> {
        self.nodes.read().await.clone()
    }

    /// Snapshot of the transient node set.
    pub async fn transient_nodes(&self) -> HashSet<Node> {
        self.transient_nodes.read().await.clone()
    }

    /// Replace the persistent set atomically, then audit expiries.
    ///
    /// This is a migration primitive: no per-node events are emitted
    /// for the replacement itself, only for expired entries removed by
    /// the audit.
    pub async fn set_nodes(&self, nodes: HashSet<Node>) {
        *self.nodes.write().await = nodes;
        self.audit_temporary_permissions().await;
    }

    /// Replace the transient set atomically, then audit expiries.
    pub async fn set_transient_nodes(&self, nodes: HashSet<Node>) {
        *self.transient_nodes.write().await = nodes;
        self.audit_temporary_permissions().await;
    }

    /// Rebuild the persistent set from a serialized `permission → value`
    /// map, as produced by [`crate::export_to_legacy`].
    pub async fn set_nodes_from_legacy(
        &self,
        entries: &HashMap<String, bool>,
    ) -> Result<(), NodeError> {
        let mut nodes = HashSet::with_capacity(entries.len());
        for (serialized, value) in entries {
            nodes.insert(Node::from_serialized(serialized, *value)?);
        }
        self.set_nodes(nodes).await;
        Ok(())
    }

    // ========================================================================
    // Expiry auditing
    // ========================================================================

    /// Remove temporary nodes whose expiry has passed, emitting a
    /// `PermissionNodeExpire` event per removal.
    ///
    /// Returns whether anything was removed. Auditing only ever
    /// removes, so running it twice is the same as running it once.
    pub async fn audit_temporary_permissions(&self) -> bool {
        let now = unix_now();
        let mut expired = Vec::new();

        {
            let mut nodes = self.nodes.write().await;
            expired.extend(nodes.iter().filter(|n| n.has_expired(now)).cloned());
            nodes.retain(|n| !n.has_expired(now));
        }
        {
            let mut transient = self.transient_nodes.write().await;
            expired.extend(transient.iter().filter(|n| n.has_expired(now)).cloned());
            transient.retain(|n| !n.has_expired(now));
        }

        if expired.is_empty() {
            return false;
        }

        debug!(
            holder = %self.object_name,
            removed = expired.len(),
            "removed expired temporary nodes"
        );
        for node in expired {
            self.events.emit(HolderEvent::PermissionNodeExpire {
                holder: self.holder_ref(),
                node,
            });
        }
        true
    }

    // ========================================================================
    // Local resolution
    // ========================================================================

    /// The holder's own nodes in descending priority order, with
    /// duplicates collapsed.
    ///
    /// Candidates are visited most-specific-first and the first entry
    /// of each equivalence class wins. With `merge_temp`, a permanent
    /// and a temporary copy of an otherwise equal node collapse into
    /// one logical entry (the temporary one, since it sorts first);
    /// without it they stay distinct.
    ///
    /// Expired nodes are invisible here even if the auditor has not
    /// run yet.
    pub async fn get_permissions(&self, merge_temp: bool) -> BTreeSet<LocalizedNode> {
        let now = unix_now();
        let nodes = self.nodes().await;
        let transient = self.transient_nodes().await;

        let mut combined = BTreeSet::new();
        for node in nodes.into_iter().chain(transient) {
            if node.has_expired(now) {
                continue;
            }
            combined.insert(LocalizedNode::new(node, self.object_name.clone()));
        }

        let mut permissions: BTreeSet<LocalizedNode> = BTreeSet::new();
        'candidates: for candidate in combined {
            for accepted in &permissions {
                let duplicate = if merge_temp {
                    candidate.node().equals_ignoring_value_or_temp(accepted.node())
                } else {
                    candidate.node().almost_equals(accepted.node())
                };
                if duplicate {
                    continue 'candidates;
                }
            }
            permissions.insert(candidate);
        }

        permissions
    }

    /// The temporary subset of [`PermissionHolder::get_permissions`].
    pub async fn temporary_nodes(&self) -> HashSet<Node> {
        self.get_permissions(false)
            .await
            .into_iter()
            .map(LocalizedNode::into_node)
            .filter(Node::is_temporary)
            .collect()
    }

    /// The permanent subset of [`PermissionHolder::get_permissions`].
    pub async fn permanent_nodes(&self) -> HashSet<Node> {
        self.get_permissions(false)
            .await
            .into_iter()
            .map(LocalizedNode::into_node)
            .filter(Node::is_permanent)
            .collect()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Scan the chosen set for an equivalent node, ignoring values.
    ///
    /// Non-recursive: inherited nodes are not considered. Expired
    /// entries are invisible.
    pub async fn has_permission(&self, node: &Node, transient: bool) -> Tristate {
        let now = unix_now();
        let set = if transient {
            self.transient_nodes.read().await
        } else {
            self.nodes.read().await
        };

        for existing in set.iter() {
            if existing.has_expired(now) {
                continue;
            }
            if existing.almost_equals(node) {
                return existing.tristate();
            }
        }

        Tristate::Undefined
    }

    /// Convenience probe: build an ephemeral node from attributes and
    /// check whether the persistent set carries it with this value.
    pub async fn has_permission_with(
        &self,
        permission: &str,
        value: bool,
        server: Option<&str>,
        world: Option<&str>,
        temporary: bool,
    ) -> bool {
        let Ok(node) = probe_node(permission, value, server, world, temporary) else {
            return false;
        };
        self.has_permission(&node, false).await.as_bool() == Some(value)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Add a node to the persistent set.
    ///
    /// Fails with [`HolderError::AlreadyHas`] when an equivalent node
    /// (ignoring value) is already present. Emits `PermissionNodeSet`.
    pub async fn set_permission(&self, node: Node) -> Result<(), HolderError> {
        self.set_in(false, node).await
    }

    /// As [`PermissionHolder::set_permission`], on the transient set.
    pub async fn set_transient_permission(&self, node: Node) -> Result<(), HolderError> {
        self.set_in(true, node).await
    }

    async fn set_in(&self, transient: bool, node: Node) -> Result<(), HolderError> {
        let now = unix_now();
        {
            let lock = if transient { &self.transient_nodes } else { &self.nodes };
            let mut set = lock.write().await;
            if set.iter().any(|n| !n.has_expired(now) && n.almost_equals(&node)) {
                return Err(HolderError::AlreadyHas);
            }
            set.insert(node.clone());
        }

        self.events.emit(HolderEvent::PermissionNodeSet {
            holder: self.holder_ref(),
            node,
        });
        Ok(())
    }

    /// Remove a node from the persistent set.
    ///
    /// Fails with [`HolderError::Lacks`] when no equivalent node is
    /// present. Removal drops every entry equal under the
    /// value-ignoring relation (there should be at most one, but the
    /// sweep is total). Emits `GroupRemove` for group nodes,
    /// `PermissionNodeUnset` otherwise.
    pub async fn unset_permission(&self, node: &Node) -> Result<(), HolderError> {
        self.unset_in(false, node).await
    }

    /// As [`PermissionHolder::unset_permission`], on the transient set.
    pub async fn unset_transient_permission(&self, node: &Node) -> Result<(), HolderError> {
        self.unset_in(true, node).await
    }

    async fn unset_in(&self, transient: bool, node: &Node) -> Result<(), HolderError> {
        let now = unix_now();
        {
            let lock = if transient { &self.transient_nodes } else { &self.nodes };
            let mut set = lock.write().await;
            if !set.iter().any(|n| !n.has_expired(now) && n.almost_equals(node)) {
                return Err(HolderError::Lacks);
            }
            set.retain(|n| !n.almost_equals(node));
        }

        if let Some(group_name) = node.group_name() {
            self.events.emit(HolderEvent::GroupRemove {
                holder: self.holder_ref(),
                group_name,
                server: node.server().map(str::to_string),
                world: node.world().map(str::to_string),
                temporary: node.is_temporary(),
            });
        } else {
            self.events.emit(HolderEvent::PermissionNodeUnset {
                holder: self.holder_ref(),
                node: node.clone(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Group membership views
    // ========================================================================

    /// Names of all groups referenced by the persistent set, on any
    /// server or world.
    pub async fn group_names(&self) -> Vec<String> {
        self.nodes
            .read()
            .await
            .iter()
            .filter_map(Node::group_name)
            .collect()
    }

    /// Names of the groups applicable on a specific server and world.
    /// Passing `None` skips that dimension entirely.
    pub async fn local_groups(&self, server: Option<&str>, world: Option<&str>) -> Vec<String> {
        self.nodes
            .read()
            .await
            .iter()
            .filter(|n| n.is_group_node())
            .filter(|n| world.is_none() || n.should_apply_on_world(world, false, true))
            .filter(|n| server.is_none() || n.should_apply_on_server(server, false, true))
            .filter_map(Node::group_name)
            .collect()
    }
}

/// Build an ephemeral node for equality probes.
fn probe_node(
    permission: &str,
    value: bool,
    server: Option<&str>,
    world: Option<&str>,
    temporary: bool,
) -> Result<Node, NodeError> {
    let mut builder = Node::builder(permission).value(value).temporary(temporary);
    if let Some(server) = server {
        builder = builder.server(server);
    }
    if let Some(world) = world {
        builder = builder.world(world);
    }
    builder.build()
}
