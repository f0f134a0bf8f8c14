//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from visibility rules.
//!
//! # Invariants
//! - Repository writes must enforce `Node::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod node_repo;

pub use node_repo::{
    NodeLink, NodeLinkId, NodeQuery, NodeRepository, ReadScope, RepoError, RepoResult,
    SqliteNodeRepository,
};
