//! Inheritance traversal over the group graph.
//!
//! Holders reference groups by name through permission nodes of the
//! form `group.<name>`; the [`GroupLookup`] collaborator is the
//! indirection that resolves names to holders. Cycles are broken by an
//! excluded-name list carried through the recursion, not by the data
//! structure: any graph, cyclic or not, is walked with each holder
//! visited at most once.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_recursion::async_recursion;
use async_trait::async_trait;
use stratum_types::{Contexts, Node, Tristate};
use tracing::{debug, instrument};

use crate::comparator::LocalizedNode;
use crate::holder::PermissionHolder;

/// Resolves a group name to its holder.
///
/// Unknown names yield `None` and are skipped silently during
/// traversal: a group may be removed concurrently with holders still
/// referencing it, and that is not an error.
#[async_trait]
pub trait GroupLookup: Send + Sync {
    async fn lookup(&self, name: &str) -> Option<Arc<PermissionHolder>>;
}

/// The result of an inheritance lookup: the tristate outcome plus the
/// holder the matching node was sourced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritanceInfo {
    result: Tristate,
    location: Option<String>,
}

impl InheritanceInfo {
    fn of(node: &LocalizedNode) -> Self {
        Self {
            result: node.node().tristate(),
            location: Some(node.location().to_string()),
        }
    }

    fn empty() -> Self {
        Self {
            result: Tristate::Undefined,
            location: None,
        }
    }

    pub fn result(&self) -> Tristate {
        self.result
    }

    /// The immediate holder the node came from, when one matched.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

impl PermissionHolder {
    /// All nodes this holder has and inherits, in descending priority
    /// order.
    ///
    /// Group-inheritance edges are filtered against the context before
    /// being followed; inherited entries never displace an equivalent
    /// entry that is already present, so local nodes outrank inherited
    /// ones and closer ancestors outrank farther ones.
    #[instrument(skip(self, lookup), fields(holder = %self.object_name()))]
    pub async fn get_all_nodes(
        &self,
        lookup: &dyn GroupLookup,
        excluded: Option<Vec<String>>,
        context: &Contexts,
    ) -> BTreeSet<LocalizedNode> {
        let mut excluded = excluded.unwrap_or_default();
        self.collect_all_nodes(lookup, &mut excluded, context).await
    }

    #[async_recursion]
    async fn collect_all_nodes(
        &self,
        lookup: &dyn GroupLookup,
        excluded: &mut Vec<String>,
        context: &Contexts,
    ) -> BTreeSet<LocalizedNode> {
        let mut all = self.get_permissions(true).await;

        excluded.push(self.object_name().to_lowercase());

        let apply_regex = self.resolver_config().applying_regex;
        let tags = context.plain_tags();

        // Group edges applicable in this context, most specific first.
        let parents: Vec<Node> = all
            .iter()
            .map(LocalizedNode::node)
            .filter(|n| n.is_group_node())
            .filter(|n| {
                n.should_apply_on_server(context.server(), context.apply_global_groups, apply_regex)
            })
            .filter(|n| {
                n.should_apply_on_world(
                    context.world(),
                    context.apply_global_world_groups,
                    apply_regex,
                )
            })
            .filter(|n| n.should_apply_with_context(&tags, false))
            .cloned()
            .collect();

        for parent in parents {
            let Some(name) = parent.group_name() else {
                continue;
            };

            let Some(group) = lookup.lookup(&name).await else {
                debug!(group = %name, "inherited group not found, skipping");
                continue;
            };

            if excluded.iter().any(|e| e == group.object_name()) {
                continue;
            }

            let inherited = group.collect_all_nodes(lookup, excluded, context).await;
            'inherited: for node in inherited {
                for existing in &all {
                    if existing.node().almost_equals(node.node()) {
                        continue 'inherited;
                    }
                }
                all.insert(node);
            }
        }

        all
    }

    /// All applicable nodes for a context, deduplicated by permission
    /// string.
    ///
    /// Nodes are visited in descending priority order and the first
    /// holder of each permission string wins; the ordering is consumed
    /// by that rule, so the result is an unordered set.
    #[instrument(skip(self, lookup), fields(holder = %self.object_name()))]
    pub async fn get_all_nodes_filtered(
        &self,
        lookup: &dyn GroupLookup,
        context: &Contexts,
    ) -> HashSet<LocalizedNode> {
        let all = if context.apply_groups {
            self.get_all_nodes(lookup, None, context).await
        } else {
            self.get_permissions(true).await
        };

        let apply_regex = self.resolver_config().applying_regex;
        let tags = context.plain_tags();

        let mut seen = HashSet::new();
        let mut perms = HashSet::new();

        for localized in all {
            let node = localized.node();
            if !node.should_apply_on_server(context.server(), context.include_global, apply_regex)
            {
                continue;
            }
            if !node.should_apply_on_world(
                context.world(),
                context.include_global_world,
                apply_regex,
            ) {
                continue;
            }
            if !node.should_apply_with_context(&tags, false) {
                continue;
            }

            // Higher-priority nodes mask later ones with the same key.
            if !seen.insert(node.permission().to_string()) {
                continue;
            }
            perms.insert(localized);
        }

        perms
    }

    /// Check whether this holder inherits an equivalent node, searching
    /// the full inheritance graph with an unrestricted context.
    pub async fn inherits_permission_info(
        &self,
        lookup: &dyn GroupLookup,
        node: &Node,
    ) -> InheritanceInfo {
        for candidate in self
            .get_all_nodes(lookup, None, &Contexts::allow_all())
            .await
        {
            if candidate.node().almost_equals(node) {
                return InheritanceInfo::of(&candidate);
            }
        }

        InheritanceInfo::empty()
    }

    /// The tristate outcome of [`PermissionHolder::inherits_permission_info`].
    pub async fn inherits_permission(&self, lookup: &dyn GroupLookup, node: &Node) -> Tristate {
        self.inherits_permission_info(lookup, node).await.result()
    }

    /// Convenience probe over the inheritance graph, building an
    /// ephemeral node from attributes.
    pub async fn inherits_permission_with(
        &self,
        lookup: &dyn GroupLookup,
        permission: &str,
        value: bool,
        server: Option<&str>,
        world: Option<&str>,
        temporary: bool,
    ) -> bool {
        let mut builder = Node::builder(permission).value(value).temporary(temporary);
        if let Some(server) = server {
            builder = builder.server(server);
        }
        if let Some(world) = world {
            builder = builder.world(world);
        }
        let Ok(node) = builder.build() else {
            return false;
        };
        self.inherits_permission(lookup, &node).await.as_bool() == Some(value)
    }
}

/// A lookup over a fixed table of groups. Mainly useful in tests and
/// single-snapshot resolutions.
#[derive(Default)]
pub struct MapGroupLookup {
    groups: std::collections::HashMap<String, Arc<PermissionHolder>>,
}

impl MapGroupLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a group holder, keyed by its lowercased object name.
    pub fn insert(&mut self, group: Arc<PermissionHolder>) {
        self.groups
            .insert(group.object_name().to_lowercase(), group);
    }
}

#[async_trait]
impl GroupLookup for MapGroupLookup {
    async fn lookup(&self, name: &str) -> Option<Arc<PermissionHolder>> {
        self.groups.get(&name.to_lowercase()).cloned()
    }
}
