//! The permission node model.
//!
//! A [`Node`] is a single immutable permission entry: a permission
//! string, a boolean value, and the context predicates (server, world,
//! expiry, free-form tags) that decide where it applies.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::NodeError;

/// Prefix marking a server/world matcher as a regular expression.
const REGEX_MARKER: &str = "R=";

/// Reserved scope name representing "no server".
const GLOBAL_SCOPE: &str = "global";

/// An immutable permission entry with context predicates.
///
/// Nodes are value objects: once built they never change, and all of
/// the resolver's precedence and deduplication rules are expressed as
/// pure functions over them. The tag map is ordered so that the
/// serialized form of a node is stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    permission: String,
    value: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    world: Option<String>,
    /// Absolute unix-epoch seconds; absent means permanent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    context: BTreeMap<String, String>,
}

impl Node {
    /// Start building a node for the given permission.
    pub fn builder(permission: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(permission)
    }

    pub fn permission(&self) -> &str {
        &self.permission
    }

    pub fn value(&self) -> bool {
        self.value
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn world(&self) -> Option<&str> {
        self.world.as_deref()
    }

    pub fn expiry(&self) -> Option<u64> {
        self.expiry
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// The lookup result this node represents.
    pub fn tristate(&self) -> crate::Tristate {
        self.value.into()
    }

    // ========================================================================
    // Derived predicates
    // ========================================================================

    pub fn is_temporary(&self) -> bool {
        self.expiry.is_some()
    }

    pub fn is_permanent(&self) -> bool {
        self.expiry.is_none()
    }

    /// Whether the node's expiry has passed at `now` (unix seconds).
    pub fn has_expired(&self, now: u64) -> bool {
        matches!(self.expiry, Some(at) if at <= now)
    }

    pub fn is_server_specific(&self) -> bool {
        self.server.is_some()
    }

    pub fn is_world_specific(&self) -> bool {
        self.world.is_some()
    }

    /// Whether this node grants membership of a group, i.e. the
    /// permission matches `group.<name>` (case-insensitively).
    pub fn is_group_node(&self) -> bool {
        self.group_name().is_some()
    }

    /// The group referenced by a group node, lowercased.
    pub fn group_name(&self) -> Option<String> {
        let rest = strip_prefix_ignore_case(&self.permission, "group.")?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.to_lowercase())
    }

    /// Whether this node is the root wildcard, granting everything in
    /// a caller-supplied universe.
    pub fn is_wildcard(&self) -> bool {
        self.permission == "*" || self.permission == "'*'"
    }

    /// Number of `*` segments in the permission. A permission with
    /// fewer wildcard segments is more specific.
    pub fn wildcard_level(&self) -> usize {
        self.permission.split('.').filter(|part| *part == "*").count()
    }

    // ========================================================================
    // Equivalence relations
    // ========================================================================

    /// Equality on everything except the value. This is the relation
    /// used to answer "does the holder have this node?".
    pub fn almost_equals(&self, other: &Node) -> bool {
        self.permission == other.permission
            && self.server == other.server
            && self.world == other.world
            && self.context == other.context
            && self.is_temporary() == other.is_temporary()
    }

    /// Equality ignoring both the value and the expiry. Used when
    /// merging, where a permanent and a temporary copy of the same
    /// entry collapse into one logical node.
    pub fn equals_ignoring_value_or_temp(&self, other: &Node) -> bool {
        self.permission == other.permission
            && self.server == other.server
            && self.world == other.world
            && self.context == other.context
    }

    // ========================================================================
    // Applicability
    // ========================================================================

    /// Whether this node applies on the requested server.
    ///
    /// An unscoped node always applies when no server is requested;
    /// when one is requested it applies iff `include_global`. A scoped
    /// node must match the requested server, case-insensitively, or by
    /// regex when `apply_regex` is set and the matcher carries the
    /// `R=` prefix.
    pub fn should_apply_on_server(
        &self,
        server: Option<&str>,
        include_global: bool,
        apply_regex: bool,
    ) -> bool {
        match (self.server.as_deref(), server) {
            (None, None) => true,
            (None, Some(_)) => include_global,
            (Some(_), None) => false,
            (Some(own), Some(requested)) => matches_scope(own, requested, apply_regex),
        }
    }

    /// Whether this node applies on the requested world. Same rules as
    /// [`Node::should_apply_on_server`].
    pub fn should_apply_on_world(
        &self,
        world: Option<&str>,
        include_global: bool,
        apply_regex: bool,
    ) -> bool {
        match (self.world.as_deref(), world) {
            (None, None) => true,
            (None, Some(_)) => include_global,
            (Some(_), None) => false,
            (Some(own), Some(requested)) => matches_scope(own, requested, apply_regex),
        }
    }

    /// Whether every tag on this node is present in `tags` with an
    /// equal value. Extra tags on the query side are ignored.
    ///
    /// With `world_and_server` set, the node's server and world are
    /// additionally required to appear under the reserved `server` and
    /// `world` keys.
    pub fn should_apply_with_context(
        &self,
        tags: &BTreeMap<String, String>,
        world_and_server: bool,
    ) -> bool {
        if world_and_server {
            if self.server.as_deref() != tags.get("server").map(String::as_str) {
                return false;
            }
            if self.world.as_deref() != tags.get("world").map(String::as_str) {
                return false;
            }
        }

        self.context
            .iter()
            .all(|(key, value)| tags.get(key) == Some(value))
    }

    // ========================================================================
    // Expansion
    // ========================================================================

    /// Expand `(a|b|c)` alternation groups in the permission into the
    /// cross product of literal permissions.
    ///
    /// A permission without any group yields an empty set; expansion is
    /// pure and always finite.
    pub fn resolve_shorthand(&self) -> Vec<String> {
        if !self.permission.contains('(') {
            return Vec::new();
        }

        let mut expanded = vec![String::new()];
        let mut rest = self.permission.as_str();
        let mut found_group = false;

        while let Some(open) = rest.find('(') {
            let Some(close) = rest[open..].find(')').map(|idx| open + idx) else {
                // Unbalanced group, treat the permission as literal.
                return Vec::new();
            };

            let literal = &rest[..open];
            let options: Vec<&str> = rest[open + 1..close].split('|').collect();
            found_group = true;

            let mut next = Vec::with_capacity(expanded.len() * options.len());
            for prefix in &expanded {
                for option in &options {
                    next.push(format!("{prefix}{literal}{option}"));
                }
            }
            expanded = next;
            rest = &rest[close + 1..];
        }

        if !found_group {
            return Vec::new();
        }

        for entry in &mut expanded {
            entry.push_str(rest);
        }
        expanded
    }

    /// For a trailing-wildcard permission such as `a.b.*`, return every
    /// entry of `possible` under the `a.b.` prefix.
    pub fn resolve_wildcard(&self, possible: &[String]) -> Vec<String> {
        if self.is_wildcard() {
            return Vec::new();
        }
        let Some(prefix) = self.permission.strip_suffix('*') else {
            return Vec::new();
        };
        if prefix.is_empty() || !prefix.ends_with('.') {
            return Vec::new();
        }

        possible
            .iter()
            .filter(|candidate| candidate.len() > prefix.len() && candidate.starts_with(prefix))
            .cloned()
            .collect()
    }

    // ========================================================================
    // Serialized form
    // ========================================================================

    /// Render this node's full contextual key:
    /// `[server[-world]/][(k=v,...)]permission[$expiry]`.
    ///
    /// A world-scoped node without a server uses the literal `global`
    /// server. This string round-trips through
    /// [`Node::from_serialized`] and is the only compatibility surface
    /// of the node model.
    pub fn to_serialized(&self) -> String {
        let mut out = String::new();

        match (&self.server, &self.world) {
            (Some(server), Some(world)) => {
                out.push_str(server);
                out.push('-');
                out.push_str(world);
                out.push('/');
            }
            (Some(server), None) => {
                out.push_str(server);
                out.push('/');
            }
            (None, Some(world)) => {
                out.push_str(GLOBAL_SCOPE);
                out.push('-');
                out.push_str(world);
                out.push('/');
            }
            (None, None) => {}
        }

        if !self.context.is_empty() {
            out.push('(');
            let mut first = true;
            for (key, value) in &self.context {
                if !first {
                    out.push(',');
                }
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                first = false;
            }
            out.push(')');
        }

        out.push_str(&self.permission);

        if let Some(expiry) = self.expiry {
            out.push('$');
            out.push_str(&expiry.to_string());
        }

        out
    }

    /// Parse a node from its serialized form, pairing it with a value.
    pub fn from_serialized(serialized: &str, value: bool) -> Result<Node, NodeError> {
        let mut rest = serialized;
        let mut expiry = None;

        if let Some((head, tail)) = rest.rsplit_once('$') {
            if let Ok(at) = tail.parse::<u64>() {
                expiry = Some(at);
                rest = head;
            }
        }

        let mut server = None;
        let mut world = None;
        if let Some((scope, perm)) = rest.split_once('/') {
            let (server_part, world_part) = match scope.split_once('-') {
                Some((s, w)) => (s, Some(w)),
                None => (scope, None),
            };
            if !server_part.eq_ignore_ascii_case(GLOBAL_SCOPE) {
                server = Some(server_part.to_string());
            }
            world = world_part.map(str::to_string);
            rest = perm;
        }

        let mut context = BTreeMap::new();
        if let Some(tail) = rest.strip_prefix('(') {
            if let Some(close) = tail.find(')') {
                for pair in tail[..close].split(',') {
                    if let Some((key, val)) = pair.split_once('=') {
                        context.insert(key.to_string(), val.to_string());
                    }
                }
                rest = &tail[close + 1..];
            }
        }

        if rest.is_empty() {
            return Err(NodeError::EmptyPermission);
        }

        Ok(Node {
            permission: rest.to_string(),
            value,
            server,
            world,
            expiry,
            context,
        })
    }
}

fn strip_prefix_ignore_case<'a>(haystack: &'a str, prefix: &str) -> Option<&'a str> {
    let head = haystack.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &haystack[prefix.len()..])
}

fn matches_scope(own: &str, requested: &str, apply_regex: bool) -> bool {
    if apply_regex {
        if let Some(pattern) = own.strip_prefix(REGEX_MARKER) {
            return Regex::new(pattern)
                .map(|re| re.is_match(requested))
                .unwrap_or(false);
        }
    }
    own.eq_ignore_ascii_case(requested)
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Node`]. Validation happens in [`NodeBuilder::build`].
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    permission: String,
    value: bool,
    server: Option<String>,
    world: Option<String>,
    expiry: Option<u64>,
    context: BTreeMap<String, String>,
}

impl NodeBuilder {
    fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            value: true,
            server: None,
            world: None,
            expiry: None,
            context: BTreeMap::new(),
        }
    }

    pub fn value(mut self, value: bool) -> Self {
        self.value = value;
        self
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn world(mut self, world: impl Into<String>) -> Self {
        self.world = Some(world.into());
        self
    }

    /// Expiry as absolute unix-epoch seconds.
    pub fn expiry(mut self, at: u64) -> Self {
        self.expiry = Some(at);
        self
    }

    /// Mark the node temporary with a sentinel expiry. Only useful for
    /// equality probes, where the expiry instant itself is ignored.
    pub fn temporary(mut self, temporary: bool) -> Self {
        self.expiry = temporary.then_some(10);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<Node, NodeError> {
        if self.permission.is_empty() {
            return Err(NodeError::EmptyPermission);
        }

        Ok(Node {
            permission: self.permission,
            value: self.value,
            server: self.server,
            world: self.world,
            expiry: self.expiry,
            context: self.context,
        })
    }
}
