//! Shared fixtures for resolution tests.

use std::sync::Arc;

use stratum_config::ResolverConfig;
use stratum_core::{MapGroupLookup, Node, NullEventSink, PermissionHolder};

pub fn holder(name: &str) -> Arc<PermissionHolder> {
    Arc::new(PermissionHolder::group(
        name,
        ResolverConfig::default(),
        Arc::new(NullEventSink),
    ))
}

pub fn grant(permission: &str) -> Node {
    Node::builder(permission).build().unwrap()
}

pub fn deny(permission: &str) -> Node {
    Node::builder(permission).value(false).build().unwrap()
}

pub fn lookup_of(groups: &[&Arc<PermissionHolder>]) -> MapGroupLookup {
    let mut lookup = MapGroupLookup::new();
    for group in groups {
        lookup.insert(Arc::clone(group));
    }
    lookup
}

pub fn universe(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|s| s.to_string()).collect()
}
