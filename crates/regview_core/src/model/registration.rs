//! Registration read model and withdrawal redaction.
//!
//! # Responsibility
//! - Resolve withdrawal/embargo state that registrations inherit from their
//!   ancestors.
//! - Build the record handed to the serialization layer, with redaction
//!   applied for withdrawn registrations.
//!
//! # Invariants
//! - A withdrawn view exposes only `WITHDRAWAL_VISIBLE_FIELDS`; every other
//!   field is `None` whatever the requester's access level.
//! - Redaction runs after the full view is built, so newly added fields are
//!   hidden unless explicitly listed as visible.

use crate::model::access::{Permission, UserId};
use crate::model::node::{Node, NodeCategory, NodeId, NodeLicense};
use serde::Serialize;

/// Fields still shown for a withdrawn registration.
pub const WITHDRAWAL_VISIBLE_FIELDS: &[&str] = &[
    "id",
    "title",
    "description",
    "date_created",
    "registration",
    "withdrawn",
    "date_registered",
    "withdrawal_justification",
    "registration_supplement",
    "contributors",
];

/// Fields presented as null once a registration is withdrawn.
pub const WITHDRAWAL_REDACTED_FIELDS: &[&str] = &[
    "category",
    "date_modified",
    "fork",
    "collection",
    "node_license",
    "tags",
    "public",
    "current_user_permissions",
    "pending_embargo_approval",
    "pending_registration_approval",
    "pending_withdrawal",
    "embargo_end_date",
    "registered_meta",
    "registered_by",
    "registered_from",
    "parent",
    "root",
    "linked_nodes_count",
];

/// Withdrawal and embargo state after ancestor inheritance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithdrawalState {
    pub withdrawn: bool,
    pub pending_withdrawal: bool,
    pub justification: Option<String>,
    pub embargo_end_date: Option<i64>,
}

impl WithdrawalState {
    /// Resolves inherited state from `lineage`, ordered from the node itself
    /// up to its root.
    ///
    /// A withdrawn registration anywhere in the lineage withdraws the node,
    /// with the nearest withdrawn record supplying the justification. A
    /// pending withdrawal only counts from the nearest record flagging one,
    /// and only when nothing above is withdrawn. The nearest registration
    /// carrying an embargo decides the embargo.
    pub fn resolve<'a>(lineage: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut state = Self::default();
        let mut pending_found = false;
        let mut embargo_found = false;

        for meta in lineage
            .into_iter()
            .filter_map(|node| node.registration.as_ref())
        {
            if meta.withdrawn && !state.withdrawn {
                state.withdrawn = true;
                state.justification = meta.withdrawal_justification.clone();
            }
            if !pending_found && meta.has_withdrawal() {
                state.pending_withdrawal = meta.pending_withdrawal;
                pending_found = true;
            }
            if !embargo_found && meta.embargo_end_date.is_some() {
                state.embargo_end_date = meta.embargo_end_date;
                embargo_found = true;
            }
        }

        if state.withdrawn {
            state.pending_withdrawal = false;
        }
        state
    }
}

/// Registration lifecycle as seen by the visibility rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    Private,
    Public,
    PublicPendingWithdrawal,
    Withdrawn,
}

impl RegistrationState {
    pub fn of(node: &Node, withdrawal: &WithdrawalState) -> Self {
        if withdrawal.withdrawn {
            Self::Withdrawn
        } else if !node.is_public {
            Self::Private
        } else if withdrawal.pending_withdrawal {
            Self::PublicPendingWithdrawal
        } else {
            Self::Public
        }
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// Only `Private -> Public` is driven by this crate; the withdrawal edges
    /// belong to external approval workflows.
    pub fn can_transition_to(self, next: RegistrationState) -> bool {
        matches!(
            (self, next),
            (Self::Private, Self::Public)
                | (Self::Public, Self::PublicPendingWithdrawal)
                | (Self::PublicPendingWithdrawal, Self::Withdrawn)
                | (Self::PublicPendingWithdrawal, Self::Public)
        )
    }
}

/// Record handed to the serialization layer.
///
/// Redacted fields stay present and serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationView {
    pub id: NodeId,
    pub title: String,
    pub description: String,
    pub date_created: i64,
    /// Always `true`; kept for schema compatibility.
    pub registration: bool,
    pub withdrawn: bool,
    pub date_registered: Option<i64>,
    pub withdrawal_justification: Option<String>,
    pub registration_supplement: Option<String>,
    /// The only relationship a withdrawn registration still exposes.
    pub contributors: Vec<UserId>,

    pub category: Option<NodeCategory>,
    pub date_modified: Option<i64>,
    pub fork: Option<bool>,
    pub collection: Option<bool>,
    pub node_license: Option<NodeLicense>,
    pub tags: Option<Vec<String>>,
    pub public: Option<bool>,
    pub current_user_permissions: Option<Vec<Permission>>,
    pub pending_embargo_approval: Option<bool>,
    pub pending_registration_approval: Option<bool>,
    pub pending_withdrawal: Option<bool>,
    pub embargo_end_date: Option<i64>,
    pub registered_meta: Option<serde_json::Value>,
    pub registered_by: Option<UserId>,
    pub registered_from: Option<NodeId>,
    pub parent: Option<NodeId>,
    pub root: Option<NodeId>,
    pub linked_nodes_count: Option<u32>,
}

impl RegistrationView {
    /// Builds the view for `node` and redacts it when withdrawn.
    ///
    /// `permissions` is the requester's expanded permission list;
    /// `linked_nodes_count` counts only node links the requester may see.
    pub fn build(
        node: &Node,
        withdrawal: &WithdrawalState,
        permissions: Vec<Permission>,
        linked_nodes_count: u32,
    ) -> Self {
        let meta = node.registration.as_ref();
        let mut view = Self {
            id: node.id,
            title: node.title.clone(),
            description: node.description.clone(),
            date_created: node.created_at,
            registration: true,
            withdrawn: withdrawal.withdrawn,
            date_registered: meta.map(|meta| meta.registered_at),
            withdrawal_justification: withdrawal.justification.clone(),
            registration_supplement: meta.and_then(|meta| meta.registration_supplement.clone()),
            contributors: node
                .contributors
                .iter()
                .map(|contributor| contributor.user_id)
                .collect(),

            category: Some(node.category),
            date_modified: Some(node.modified_at),
            fork: Some(node.is_fork),
            collection: Some(node.is_collection),
            node_license: node.license.clone(),
            tags: Some(node.tags.clone()),
            public: Some(node.is_public),
            current_user_permissions: Some(permissions),
            pending_embargo_approval: meta.map(|meta| meta.pending_embargo_approval),
            pending_registration_approval: meta.map(|meta| meta.pending_registration_approval),
            pending_withdrawal: Some(withdrawal.pending_withdrawal),
            embargo_end_date: withdrawal.embargo_end_date,
            registered_meta: meta.and_then(|meta| meta.registered_meta.clone()),
            registered_by: meta.and_then(|meta| meta.registered_by),
            registered_from: meta.and_then(|meta| meta.registered_from),
            parent: node.parent_id,
            root: Some(node.root_id),
            linked_nodes_count: Some(linked_nodes_count),
        };

        if view.withdrawn {
            view.redact();
        }
        view
    }

    /// Nulls every field outside `WITHDRAWAL_VISIBLE_FIELDS`.
    fn redact(&mut self) {
        self.category = None;
        self.date_modified = None;
        self.fork = None;
        self.collection = None;
        self.node_license = None;
        self.tags = None;
        self.public = None;
        self.current_user_permissions = None;
        self.pending_embargo_approval = None;
        self.pending_registration_approval = None;
        self.pending_withdrawal = None;
        self.embargo_end_date = None;
        self.registered_meta = None;
        self.registered_by = None;
        self.registered_from = None;
        self.parent = None;
        self.root = None;
        self.linked_nodes_count = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{
        RegistrationState, RegistrationView, WithdrawalState, WITHDRAWAL_REDACTED_FIELDS,
        WITHDRAWAL_VISIBLE_FIELDS,
    };
    use crate::model::access::Permission;
    use crate::model::node::Node;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn registration() -> Node {
        let mut source = Node::new("Study", 1_000);
        source.set_tags(["survey"]);
        let mut registration = Node::registration_of(&source, Uuid::new_v4(), 2_000);
        registration.is_public = true;
        registration
    }

    #[test]
    fn field_lists_cover_the_whole_view() {
        let node = registration();
        let view = RegistrationView::build(&node, &WithdrawalState::default(), vec![], 0);
        let json = serde_json::to_value(&view).expect("view serializes");
        let keys: BTreeSet<&str> = json
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        let listed: BTreeSet<&str> = WITHDRAWAL_VISIBLE_FIELDS
            .iter()
            .chain(WITHDRAWAL_REDACTED_FIELDS)
            .copied()
            .collect();
        assert_eq!(keys, listed);
    }

    #[test]
    fn withdrawn_view_nulls_redacted_fields() {
        let node = registration();
        let withdrawal = WithdrawalState {
            withdrawn: true,
            justification: Some("data error".to_string()),
            ..WithdrawalState::default()
        };
        let view = RegistrationView::build(&node, &withdrawal, vec![Permission::Read], 3);
        let json = serde_json::to_value(&view).expect("view serializes");

        for field in WITHDRAWAL_REDACTED_FIELDS {
            assert!(json[*field].is_null(), "{field} should be null");
        }
        assert_eq!(json["title"], "Study");
        assert_eq!(json["withdrawal_justification"], "data error");
        assert_eq!(json["withdrawn"], true);
    }

    #[test]
    fn resolve_inherits_withdrawal_from_root() {
        let mut root = registration();
        root.registration.as_mut().expect("meta").withdrawn = true;
        let child = Node::child_of(&root, "component", 2_500);

        let state = WithdrawalState::resolve([&child, &root]);
        assert!(state.withdrawn);
        assert!(!state.pending_withdrawal);
    }

    #[test]
    fn resolve_withdrawn_root_wins_over_pending_component() {
        let mut root = registration();
        {
            let meta = root.registration.as_mut().expect("meta");
            meta.withdrawn = true;
            meta.withdrawal_justification = Some("retracted".to_string());
        }
        let mut child = Node::child_of(&root, "component", 2_500);
        child.registration.as_mut().expect("meta").pending_withdrawal = true;

        let state = WithdrawalState::resolve([&child, &root]);
        assert!(state.withdrawn);
        assert!(!state.pending_withdrawal);
        assert_eq!(state.justification.as_deref(), Some("retracted"));
    }

    #[test]
    fn resolve_pending_withdrawal_comes_from_nearest_record() {
        let root = registration();
        let mut child = Node::child_of(&root, "component", 2_500);
        child.registration.as_mut().expect("meta").pending_withdrawal = true;

        let state = WithdrawalState::resolve([&child, &root]);
        assert!(!state.withdrawn);
        assert!(state.pending_withdrawal);
    }

    #[test]
    fn resolve_prefers_nearest_embargo() {
        let mut root = registration();
        root.registration.as_mut().expect("meta").embargo_end_date = Some(9_000);
        let mut child = Node::child_of(&root, "component", 2_500);
        child.registration.as_mut().expect("meta").embargo_end_date = Some(7_000);

        assert_eq!(
            WithdrawalState::resolve([&child, &root]).embargo_end_date,
            Some(7_000)
        );
    }

    #[test]
    fn state_machine_never_returns_to_private() {
        use RegistrationState::*;
        for from in [Public, PublicPendingWithdrawal, Withdrawn] {
            assert!(!from.can_transition_to(Private));
        }
        assert!(Private.can_transition_to(Public));
        assert!(!Withdrawn.can_transition_to(Public));
    }
}
