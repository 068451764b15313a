//! # Stratum Store - Holder Registries
//!
//! Keeps track of the live user and group holders and backs the
//! group-inheritance lookup of the resolution core.

pub mod memory;

pub use memory::MemoryRegistry;
