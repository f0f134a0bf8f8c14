//! Domain model for projects, registrations and their readers.
//!
//! # Responsibility
//! - Define canonical data structures used by the visibility rules.
//! - Keep one node shape for live projects and frozen registrations.
//!
//! # Invariants
//! - Every node is identified by a stable `NodeId`.
//! - Deletion is represented by soft-delete tombstones, not hard delete.

pub mod access;
pub mod node;
pub mod registration;
