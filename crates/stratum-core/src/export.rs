//! Export of resolved nodes into flat permission maps.
//!
//! The expander turns the filtered node set into the final
//! `permission → bool` map, applying wildcard fan-out and shorthand
//! expansion according to the resolver flags. Expanded entries never
//! displace an entry written directly by a node.

use std::collections::{HashMap, HashSet};

use stratum_types::{Contexts, Node};
use tracing::instrument;

use crate::comparator::{priority_cmp, LocalizedNode};
use crate::graph::GroupLookup;
use crate::holder::PermissionHolder;

impl PermissionHolder {
    /// Resolve and expand the holder's effective permissions for a
    /// context.
    ///
    /// `possible` is the universe of known permissions used for
    /// wildcard fan-out; when empty, wildcards only apply as literal
    /// entries. With `lower`, keys are lowercased.
    #[instrument(skip(self, lookup), fields(holder = %self.object_name()))]
    pub async fn export_nodes(
        &self,
        lookup: &dyn GroupLookup,
        context: &Contexts,
        possible: &[String],
        lower: bool,
    ) -> HashMap<String, bool> {
        let config = self.resolver_config();
        let mut perms = HashMap::new();

        // Ascending specificity, so that fan-out from less specific
        // nodes cannot mask entries written by more specific ones and
        // the result is the same on every run.
        let mut nodes: Vec<LocalizedNode> = self
            .get_all_nodes_filtered(lookup, context)
            .await
            .into_iter()
            .collect();
        nodes.sort_by(|a, b| priority_cmp(a.node(), b.node()));

        for localized in nodes {
            let node = localized.node();

            // Root wildcard fan-out. Overwritten by any direct entry.
            if !possible.is_empty() && config.apply_wildcards && node.is_wildcard() {
                for permission in possible {
                    perms.insert(normalize(permission, lower), true);
                }
            }

            // The node itself is authoritative for its own key.
            perms.insert(normalize(node.permission(), lower), node.value());

            if config.apply_shorthand {
                for expanded in node.resolve_shorthand() {
                    perms.entry(normalize(&expanded, lower)).or_insert(node.value());
                }
            }

            if !possible.is_empty() && config.apply_wildcards {
                for expanded in node.resolve_wildcard(possible) {
                    perms.entry(normalize(&expanded, lower)).or_insert(node.value());
                }
            }
        }

        perms
    }

    /// Export for a plain server/world scope, with unscoped nodes
    /// included according to the configured default.
    pub async fn export_nodes_for_scope(
        &self,
        lookup: &dyn GroupLookup,
        server: Option<&str>,
        world: Option<&str>,
        possible: &[String],
    ) -> HashMap<String, bool> {
        let context =
            Contexts::of_scope(server, world, self.resolver_config().including_global_perms);
        self.export_nodes(lookup, &context, possible, false).await
    }
}

fn normalize(permission: &str, lower: bool) -> String {
    if lower {
        permission.to_lowercase()
    } else {
        permission.to_string()
    }
}

/// Serialize a node set into its legacy `serialized-key → value` form.
/// Round-trips through [`Node::from_serialized`].
pub fn export_to_legacy(nodes: &HashSet<Node>) -> HashMap<String, bool> {
    nodes
        .iter()
        .map(|node| (node.to_serialized(), node.value()))
        .collect()
}
