//! Authorization provider contract.
//!
//! # Responsibility
//! - Answer "which permission does this identity hold on this node".
//! - Keep identity resolution outside the visibility rules.
//!
//! # Invariants
//! - Anonymous identities never hold a permission.
//! - Permission levels are cumulative (`admin` grants `write` and `read`).

use crate::model::access::{Identity, Permission};
use crate::model::node::Node;

/// Source of per-node permissions for request identities.
pub trait Authorizer {
    /// Highest permission `identity` holds directly on `node`.
    fn permission(&self, identity: Identity, node: &Node) -> Option<Permission>;

    fn has_permission(&self, identity: Identity, node: &Node, required: Permission) -> bool {
        self.permission(identity, node)
            .is_some_and(|held| held.grants(required))
    }

    /// Expanded permission list, lowest first. Empty when none is held.
    fn permissions(&self, identity: Identity, node: &Node) -> Vec<Permission> {
        self.permission(identity, node)
            .map(|held| held.expand().to_vec())
            .unwrap_or_default()
    }
}

/// Authorizer reading the node's own contributor list.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContributorAuthorizer;

impl Authorizer for ContributorAuthorizer {
    fn permission(&self, identity: Identity, node: &Node) -> Option<Permission> {
        let user_id = identity.user_id()?;
        node.contributor(user_id)
            .map(|contributor| contributor.permission)
    }
}
