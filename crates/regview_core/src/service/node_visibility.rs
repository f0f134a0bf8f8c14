//! Generic node read rules.
//!
//! # Responsibility
//! - Decide whether an identity may read a node, registration or not.
//! - Load a node's ancestor chain for inheritance and admin checks.
//!
//! # Invariants
//! - Public nodes are readable by everyone, anonymous included.
//! - Admins of any ancestor may read every descendant.
//! - Ancestor walks terminate even on corrupted parent cycles.

use crate::auth::Authorizer;
use crate::model::access::{Identity, Permission};
use crate::model::node::Node;
use crate::repo::node_repo::{NodeRepository, RepoResult};
use std::collections::HashSet;

/// Read rules shared by every node type.
pub struct NodeVisibility<'a, R: NodeRepository, A: Authorizer> {
    repo: &'a R,
    authorizer: &'a A,
}

impl<'a, R: NodeRepository, A: Authorizer> NodeVisibility<'a, R, A> {
    pub fn new(repo: &'a R, authorizer: &'a A) -> Self {
        Self { repo, authorizer }
    }

    /// Ancestors of `node`, nearest first. Deleted ancestors are included.
    pub fn ancestors(&self, node: &Node) -> RepoResult<Vec<Node>> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::from([node.id]);
        let mut cursor = node.parent_id;

        while let Some(parent_id) = cursor {
            if !visited.insert(parent_id) {
                break;
            }
            let Some(parent) = self.repo.get_node(parent_id, true)? else {
                break;
            };
            cursor = parent.parent_id;
            ancestors.push(parent);
        }

        Ok(ancestors)
    }

    /// `node` followed by its ancestors, up to the root.
    pub fn lineage(&self, node: &Node) -> RepoResult<Vec<Node>> {
        let mut lineage = vec![node.clone()];
        lineage.extend(self.ancestors(node)?);
        Ok(lineage)
    }

    /// Whether `identity` is admin on any ancestor of `node`.
    pub fn is_admin_parent(&self, identity: Identity, node: &Node) -> RepoResult<bool> {
        if identity.is_anonymous() || node.parent_id.is_none() {
            return Ok(false);
        }
        Ok(self.ancestors(node)?.iter().any(|ancestor| {
            self.authorizer
                .has_permission(identity, ancestor, Permission::Admin)
        }))
    }

    pub fn can_view(&self, identity: Identity, node: &Node) -> RepoResult<bool> {
        if node.is_public
            || self
                .authorizer
                .has_permission(identity, node, Permission::Read)
        {
            return Ok(true);
        }
        self.is_admin_parent(identity, node)
    }

    /// Permissions reported to the requester; `[read]` when none is held.
    pub fn current_user_permissions(&self, identity: Identity, node: &Node) -> Vec<Permission> {
        let permissions = self.authorizer.permissions(identity, node);
        if permissions.is_empty() {
            vec![Permission::Read]
        } else {
            permissions
        }
    }
}
