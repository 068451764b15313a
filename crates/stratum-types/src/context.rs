//! The query-time evaluation environment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Keys of the tag map with dedicated scoping semantics. They are
/// stripped before free-form tag matching.
pub const SERVER_KEY: &str = "server";
pub const WORLD_KEY: &str = "world";

/// The evaluation context of a resolution query.
///
/// The tag map may carry the distinguished `server` and `world` keys;
/// the remaining entries are matched against node tags. The boolean
/// flags control how unscoped nodes and group-inheritance edges behave
/// when a server or world is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contexts {
    tags: BTreeMap<String, String>,

    /// Whether group inheritance is followed at all.
    pub apply_groups: bool,

    /// Whether a node without a server applies when one is requested.
    pub include_global: bool,

    /// Whether a node without a world applies when one is requested.
    pub include_global_world: bool,

    /// As `include_global`, restricted to group-inheritance edges.
    pub apply_global_groups: bool,

    /// As `include_global_world`, restricted to group-inheritance edges.
    pub apply_global_world_groups: bool,
}

impl Contexts {
    pub fn new(
        tags: BTreeMap<String, String>,
        include_global: bool,
        include_global_world: bool,
        apply_groups: bool,
        apply_global_groups: bool,
        apply_global_world_groups: bool,
    ) -> Self {
        Self {
            tags,
            apply_groups,
            include_global,
            include_global_world,
            apply_global_groups,
            apply_global_world_groups,
        }
    }

    /// A context that matches everything: no tags, every flag enabled.
    pub fn allow_all() -> Self {
        Self::new(BTreeMap::new(), true, true, true, true, true)
    }

    /// Build a context scoped to a server and optionally a world, with
    /// all other flags enabled.
    pub fn of_scope(server: Option<&str>, world: Option<&str>, include_global: bool) -> Self {
        let mut tags = BTreeMap::new();
        if let Some(server) = server.filter(|s| !s.is_empty()) {
            tags.insert(SERVER_KEY.to_string(), server.to_string());
        }
        if let Some(world) = world.filter(|w| !w.is_empty()) {
            tags.insert(WORLD_KEY.to_string(), world.to_string());
        }
        Self::new(tags, include_global, true, true, true, true)
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn insert_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    /// The requested server, if any. Empty strings count as absent.
    pub fn server(&self) -> Option<&str> {
        self.tags.get(SERVER_KEY).map(String::as_str).filter(|s| !s.is_empty())
    }

    /// The requested world, if any. Empty strings count as absent.
    pub fn world(&self) -> Option<&str> {
        self.tags.get(WORLD_KEY).map(String::as_str).filter(|w| !w.is_empty())
    }

    /// The tag map with the `server` and `world` keys stripped, as
    /// matched against node tags.
    pub fn plain_tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.tags.clone();
        tags.remove(SERVER_KEY);
        tags.remove(WORLD_KEY);
        tags
    }
}

impl Default for Contexts {
    fn default() -> Self {
        Self::allow_all()
    }
}
