//! # Stratum Core - Permission Resolution Engine
//!
//! The resolution core of the Stratum permission engine: priority
//! ordering over permission nodes, per-holder node storage with expiry
//! auditing, group-inheritance traversal with cycle protection, context
//! filtering, and the export pipeline producing a flat effective
//! permission map.
//!
//! Collaborators (group lookup, event sink, resolver flags) are
//! injected; the core holds no global state.

pub mod comparator;
pub mod events;
pub mod export;
pub mod graph;
pub mod holder;

pub use comparator::{priority_cmp, LocalizedNode};
pub use events::{ChannelEventSink, EventSink, NullEventSink};
pub use export::export_to_legacy;
pub use graph::{GroupLookup, InheritanceInfo, MapGroupLookup};
pub use holder::PermissionHolder;

pub use stratum_types::{
    Contexts, HolderError, HolderEvent, HolderKind, HolderRef, Node, NodeBuilder, Tristate,
};
