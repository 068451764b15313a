//! # Stratum Types
//!
//! Shared type definitions for the Stratum permission engine.
//!
//! This crate provides the domain types used across the Stratum
//! workspace, ensuring a single source of truth and preventing
//! circular dependencies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod context;
pub mod event;
pub mod node;

pub use context::Contexts;
pub use event::{HolderEvent, HolderKind, HolderRef};
pub use node::{Node, NodeBuilder};

// ============================================================================
// Tristate
// ============================================================================

/// The result of a permission lookup.
///
/// `Undefined` means the holder carries no matching node at all, which
/// is distinct from an explicit `False` (deny) entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tristate {
    True,
    False,
    Undefined,
}

impl Tristate {
    /// Collapse to a boolean, treating `Undefined` as absent.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Tristate::True => Some(true),
            Tristate::False => Some(false),
            Tristate::Undefined => None,
        }
    }

    pub fn is_undefined(self) -> bool {
        matches!(self, Tristate::Undefined)
    }
}

impl From<bool> for Tristate {
    fn from(value: bool) -> Self {
        if value {
            Tristate::True
        } else {
            Tristate::False
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors returned by holder mutation operations.
///
/// Both variants are caller-recoverable: they report a precondition
/// failure, not a corrupted holder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HolderError {
    /// The holder already carries an equivalent node.
    #[error("holder already has an equivalent node")]
    AlreadyHas,

    /// The holder does not carry an equivalent node.
    #[error("holder lacks an equivalent node")]
    Lacks,
}

/// Errors produced when constructing or parsing nodes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("permission string must not be empty")]
    EmptyPermission,
}

/// Errors returned by holder registries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
