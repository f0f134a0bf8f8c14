//! Registration visibility use-case service.
//!
//! # Responsibility
//! - List, retrieve and publish registrations for a requesting identity.
//! - Apply withdrawal redaction and gate relationship traversal.
//! - Hide withdrawn registrations when a filter touches a redacted field.
//!
//! # Invariants
//! - Only non-deleted, non-collection registrations are ever returned.
//! - A registration goes from private to public at most once and never back.
//! - A withdrawn registration exposes its contributors and nothing else.
//! - Publishing re-checks every rule against a fresh read inside the write
//!   transaction.

use crate::auth::Authorizer;
use crate::config::PolicyConfig;
use crate::filter::{parse_filter_params, FilterError, FilterExpr};
use crate::model::access::{Identity, Permission, UserId};
use crate::model::node::{Contributor, Node, NodeId};
use crate::model::registration::{RegistrationState, RegistrationView, WithdrawalState};
use crate::repo::node_repo::{
    NodeLink, NodeLinkId, NodeQuery, NodeRepository, ReadScope, RepoError,
};
use crate::service::node_visibility::NodeVisibility;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const PERMISSION_DENIED: &str = "You do not have permission to perform this action.";
const PUBLIC_IS_ONE_WAY: &str = "Registrations can only be turned from private to public.";
const UNAPPROVED_EMBARGO: &str = "A registration with an unapproved embargo cannot be made public.";
const UNAPPROVED_REGISTRATION: &str = "An unapproved registration cannot be made public.";
const WITHDRAWN_REGISTRATION: &str = "A withdrawn registration cannot be made public.";
const WITHDRAWN_RELATIONSHIP: &str =
    "This registration has been withdrawn; only its contributors can be accessed.";

/// Errors from registration visibility operations.
#[derive(Debug)]
pub enum PolicyError {
    /// Registration is absent, deleted, a collection or hidden from the requester.
    NotFound(NodeId),
    /// Relationship name is not known.
    RelationshipNotFound(String),
    PermissionDenied(String),
    Validation(String),
    /// Filter query parameters were rejected.
    Filter(FilterError),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl PolicyError {
    /// HTTP status an API layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::RelationshipNotFound(_) => 404,
            Self::PermissionDenied(_) => 403,
            Self::Validation(_) | Self::Filter(_) => 400,
            Self::Repo(_) => 500,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::RelationshipNotFound(_) => "not_found",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Validation(_) => "validation",
            Self::Filter(_) => "invalid_filter",
            Self::Repo(_) => "repo",
        }
    }
}

impl Display for PolicyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "registration not found: {id}"),
            Self::RelationshipNotFound(name) => write!(f, "relationship not found: `{name}`"),
            Self::PermissionDenied(message) | Self::Validation(message) => f.write_str(message),
            Self::Filter(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PolicyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Filter(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for PolicyError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::PublicFlagReset(_) => Self::Validation(PUBLIC_IS_ONE_WAY.to_string()),
            RepoError::UnsupportedFilter(message) => Self::Validation(message),
            other => Self::Repo(other),
        }
    }
}

impl From<FilterError> for PolicyError {
    fn from(value: FilterError) -> Self {
        Self::Filter(value)
    }
}

/// Paging request for `list`. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub page: u32,
    /// Falls back to the configured default; clamped to the configured max.
    pub page_size: Option<u32>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: None,
        }
    }
}

/// One page of listed registrations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationPage {
    /// Sorted by `date_created DESC, id ASC`.
    pub items: Vec<RegistrationView>,
    /// Matches across all pages.
    pub total: usize,
    pub page: u32,
    pub page_size: u32,
}

/// Traversable relationships of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    Contributors,
    LinkedNodes,
    Children,
    RegisteredFrom,
    RegisteredBy,
    Parent,
    Root,
}

impl Relationship {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "contributors" => Some(Self::Contributors),
            "linked_nodes" | "linked-nodes" => Some(Self::LinkedNodes),
            "children" => Some(Self::Children),
            "registered_from" => Some(Self::RegisteredFrom),
            "registered_by" => Some(Self::RegisteredBy),
            "parent" => Some(Self::Parent),
            "root" => Some(Self::Root),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contributors => "contributors",
            Self::LinkedNodes => "linked_nodes",
            Self::Children => "children",
            Self::RegisteredFrom => "registered_from",
            Self::RegisteredBy => "registered_by",
            Self::Parent => "parent",
            Self::Root => "root",
        }
    }
}

/// Node-link pointer whose target the requester may read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedNodeView {
    pub link_id: NodeLinkId,
    pub target_id: NodeId,
    pub title: String,
    pub registration: bool,
    pub date_created: i64,
}

/// Resolved relationship payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "relationship", content = "data", rename_all = "snake_case")]
pub enum RelationshipView {
    Contributors(Vec<Contributor>),
    LinkedNodes(Vec<LinkedNodeView>),
    Children(Vec<RegistrationView>),
    RegisteredFrom(Option<NodeId>),
    RegisteredBy(Option<UserId>),
    Parent(Option<NodeId>),
    Root(NodeId),
}

/// What a `public: true` update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicTransition {
    Published,
    AlreadyPublic,
    /// An approved embargo is still running; termination was requested instead.
    EmbargoTerminationRequested,
}

impl PublicTransition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::AlreadyPublic => "already_public",
            Self::EmbargoTerminationRequested => "embargo_termination_requested",
        }
    }
}

/// Registration visibility facade over the node store and authorizer.
pub struct RegistrationVisibilityPolicy<R: NodeRepository, A: Authorizer> {
    repo: R,
    authorizer: A,
    config: PolicyConfig,
}

impl<R: NodeRepository, A: Authorizer> RegistrationVisibilityPolicy<R, A> {
    pub fn new(repo: R, authorizer: A, config: PolicyConfig) -> Self {
        Self {
            repo,
            authorizer,
            config,
        }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    fn nodes(&self) -> NodeVisibility<'_, R, A> {
        NodeVisibility::new(&self.repo, &self.authorizer)
    }

    /// Lists registrations the requester may see, optionally filtered.
    ///
    /// Withdrawn registrations are dropped entirely when `filter` compares
    /// any configured withdrawal-filter field, since their stored values for
    /// those fields are hidden from readers.
    pub fn list(
        &self,
        requester: Identity,
        filter: Option<&FilterExpr>,
        options: ListOptions,
    ) -> Result<RegistrationPage, PolicyError> {
        let started_at = Instant::now();
        let scope = match requester.user_id() {
            Some(user_id) => ReadScope::PublicOrContributor(user_id),
            None => ReadScope::Public,
        };
        let query = NodeQuery {
            registrations_only: true,
            scope,
            filter: filter.cloned(),
            ..NodeQuery::default()
        };
        let exclude_withdrawn = filter.is_some_and(|filter| self.filters_on_withdrawal_fields(filter));

        let candidates = self.repo.find_nodes(&query).map_err(|err| {
            warn!(
                "event=registration_list module=policy status=error requester={requester} error={err}"
            );
            PolicyError::from(err)
        })?;

        let mut entries = Vec::with_capacity(candidates.len());
        let mut excluded = 0usize;
        for node in candidates {
            let withdrawal = self.withdrawal_state(&node)?;
            if exclude_withdrawn && withdrawal.withdrawn {
                excluded += 1;
                continue;
            }
            entries.push((node, withdrawal));
        }

        let total = entries.len();
        let page = options.page.max(1);
        let page_size = self.config.page_size(options.page_size);
        let offset = (page as usize - 1).saturating_mul(page_size as usize);
        let items = entries
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .map(|(node, withdrawal)| self.view_with(requester, &node, withdrawal))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "event=registration_list module=policy status=ok requester={requester} total={total} excluded_withdrawn={excluded} page={page} page_size={page_size} duration_ms={}",
            started_at.elapsed().as_millis()
        );
        Ok(RegistrationPage {
            items,
            total,
            page,
            page_size,
        })
    }

    /// Parses `filter[field][op]=value` parameters, then lists.
    ///
    /// Keys that are not filters are ignored.
    pub fn list_from_query_params<'a, I>(
        &self,
        requester: Identity,
        params: I,
        options: ListOptions,
    ) -> Result<RegistrationPage, PolicyError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let filter = parse_filter_params(params).map_err(|err| {
            debug!("event=registration_list module=policy status=rejected error={err}");
            PolicyError::from(err)
        })?;
        self.list(requester, filter.as_ref(), options)
    }

    /// Whether `filter` compares any configured withdrawal-filter field.
    pub fn filters_on_withdrawal_fields(&self, filter: &FilterExpr) -> bool {
        filter.references_any(&self.config.withdrawal_filter_fields)
    }

    /// Returns one registration with redaction applied.
    ///
    /// Private registrations the requester cannot read are `NotFound` for
    /// anonymous requesters and `PermissionDenied` for everyone else.
    pub fn retrieve(&self, requester: Identity, id: NodeId) -> Result<RegistrationView, PolicyError> {
        let node = self.load_registration(id)?;
        self.ensure_visible(requester, &node)?;
        self.view_of(requester, &node)
    }

    /// Applies an attribute patch. Only `{"public": true}` is accepted.
    pub fn update(
        &self,
        requester: Identity,
        id: NodeId,
        patch: &Map<String, Value>,
    ) -> Result<RegistrationView, PolicyError> {
        let started_at = Instant::now();
        let node = self.load_registration(id)?;
        self.ensure_visible(requester, &node)?;

        let result = self.repo.update_node_with(
            id,
            |fresh: &mut Node| -> Result<PublicTransition, PolicyError> {
                if !fresh.is_registration() || fresh.is_collection {
                    return Err(PolicyError::NotFound(id));
                }
                if !self
                    .authorizer
                    .has_permission(requester, fresh, Permission::Admin)
                {
                    return Err(PolicyError::PermissionDenied(PERMISSION_DENIED.to_string()));
                }
                validate_public_patch(patch)?;
                self.apply_public(fresh)
            },
        );

        match result {
            Ok((updated, transition)) => {
                info!(
                    "event=registration_update module=policy status=ok node_id={id} requester={requester} transition={} duration_ms={}",
                    transition.as_str(),
                    started_at.elapsed().as_millis()
                );
                self.view_of(requester, &updated)
            }
            Err(err) => {
                warn!(
                    "event=registration_update module=policy status=error node_id={id} requester={requester} error_kind={} error={err}",
                    err.kind()
                );
                Err(err)
            }
        }
    }

    /// Resolves one relationship of a registration.
    pub fn relationship_access(
        &self,
        requester: Identity,
        id: NodeId,
        relationship_name: &str,
    ) -> Result<RelationshipView, PolicyError> {
        let relationship = Relationship::parse(relationship_name)
            .ok_or_else(|| PolicyError::RelationshipNotFound(relationship_name.to_string()))?;
        let node = self.load_registration(id)?;
        let withdrawal = self.withdrawal_state(&node)?;

        if withdrawal.withdrawn && relationship != Relationship::Contributors {
            warn!(
                "event=relationship_access module=policy status=denied node_id={id} requester={requester} relationship={} reason=withdrawn",
                relationship.as_str()
            );
            return Err(PolicyError::PermissionDenied(
                WITHDRAWN_RELATIONSHIP.to_string(),
            ));
        }
        self.ensure_visible(requester, &node)?;

        let meta = node.registration.as_ref();
        Ok(match relationship {
            Relationship::Contributors => RelationshipView::Contributors(node.contributors.clone()),
            Relationship::LinkedNodes => RelationshipView::LinkedNodes(
                self.visible_linked_nodes(requester, &node)?
                    .into_iter()
                    .map(|(link, target)| LinkedNodeView {
                        link_id: link.id,
                        target_id: target.id,
                        title: target.title,
                        registration: target.registration.is_some(),
                        date_created: target.created_at,
                    })
                    .collect(),
            ),
            Relationship::Children => RelationshipView::Children(self.children(requester, &node)?),
            Relationship::RegisteredFrom => {
                RelationshipView::RegisteredFrom(meta.and_then(|meta| meta.registered_from))
            }
            Relationship::RegisteredBy => {
                RelationshipView::RegisteredBy(meta.and_then(|meta| meta.registered_by))
            }
            Relationship::Parent => RelationshipView::Parent(node.parent_id),
            Relationship::Root => RelationshipView::Root(node.root_id),
        })
    }

    /// Number of linked nodes the requester may read; `None` when withdrawn.
    pub fn linked_nodes_count(
        &self,
        requester: Identity,
        id: NodeId,
    ) -> Result<Option<u32>, PolicyError> {
        let node = self.load_registration(id)?;
        self.ensure_visible(requester, &node)?;
        if self.withdrawal_state(&node)?.withdrawn {
            return Ok(None);
        }
        Ok(Some(count_u32(
            self.visible_linked_nodes(requester, &node)?.len(),
        )))
    }

    fn load_registration(&self, id: NodeId) -> Result<Node, PolicyError> {
        match self.repo.get_node(id, false)? {
            Some(node) if node.is_registration() && !node.is_collection => Ok(node),
            _ => Err(PolicyError::NotFound(id)),
        }
    }

    fn ensure_visible(&self, requester: Identity, node: &Node) -> Result<(), PolicyError> {
        if self.nodes().can_view(requester, node)? {
            return Ok(());
        }

        debug!(
            "event=registration_access module=policy status=denied node_id={} requester={requester}",
            node.id
        );
        if requester.is_anonymous() {
            Err(PolicyError::NotFound(node.id))
        } else {
            Err(PolicyError::PermissionDenied(PERMISSION_DENIED.to_string()))
        }
    }

    fn withdrawal_state(&self, node: &Node) -> Result<WithdrawalState, PolicyError> {
        let lineage = self.nodes().lineage(node)?;
        Ok(WithdrawalState::resolve(&lineage))
    }

    fn view_of(&self, requester: Identity, node: &Node) -> Result<RegistrationView, PolicyError> {
        let withdrawal = self.withdrawal_state(node)?;
        self.view_with(requester, node, withdrawal)
    }

    fn view_with(
        &self,
        requester: Identity,
        node: &Node,
        withdrawal: WithdrawalState,
    ) -> Result<RegistrationView, PolicyError> {
        let linked_nodes_count = if withdrawal.withdrawn {
            0
        } else {
            count_u32(self.visible_linked_nodes(requester, node)?.len())
        };
        let permissions = self.nodes().current_user_permissions(requester, node);
        Ok(RegistrationView::build(
            node,
            &withdrawal,
            permissions,
            linked_nodes_count,
        ))
    }

    /// Linked targets that are live, not collections and readable.
    fn visible_linked_nodes(
        &self,
        requester: Identity,
        node: &Node,
    ) -> Result<Vec<(NodeLink, Node)>, PolicyError> {
        let nodes = self.nodes();
        let mut visible = Vec::new();
        for link in self.repo.list_node_links(node.id)? {
            let Some(target) = self.repo.get_node(link.target_id, false)? else {
                continue;
            };
            if target.is_collection || !nodes.can_view(requester, &target)? {
                continue;
            }
            visible.push((link, target));
        }
        Ok(visible)
    }

    fn children(&self, requester: Identity, node: &Node) -> Result<Vec<RegistrationView>, PolicyError> {
        let scope = match requester.user_id() {
            Some(user_id) => ReadScope::PublicOrContributor(user_id),
            None => ReadScope::Public,
        };
        let query = NodeQuery {
            registrations_only: true,
            scope,
            parent: Some(node.id),
            ..NodeQuery::default()
        };
        self.repo
            .find_nodes(&query)?
            .iter()
            .map(|child| self.view_of(requester, child))
            .collect()
    }

    /// Moves a fresh registration read towards public.
    fn apply_public(&self, node: &mut Node) -> Result<PublicTransition, PolicyError> {
        if node.is_public {
            return Ok(PublicTransition::AlreadyPublic);
        }

        let withdrawal = self.withdrawal_state(node)?;
        if !RegistrationState::of(node, &withdrawal).can_transition_to(RegistrationState::Public) {
            return Err(PolicyError::Validation(WITHDRAWN_REGISTRATION.to_string()));
        }
        let embargo_end_date = withdrawal.embargo_end_date;
        let now = now_epoch_ms();
        let Some(meta) = node.registration.as_mut() else {
            return Err(PolicyError::NotFound(node.id));
        };
        if meta.pending_embargo_approval {
            return Err(PolicyError::Validation(UNAPPROVED_EMBARGO.to_string()));
        }
        if meta.pending_registration_approval {
            return Err(PolicyError::Validation(UNAPPROVED_REGISTRATION.to_string()));
        }

        let transition = if embargo_end_date.is_some_and(|end| end > now) {
            meta.pending_embargo_termination = true;
            PublicTransition::EmbargoTerminationRequested
        } else {
            node.make_public();
            PublicTransition::Published
        };
        node.modified_at = node.modified_at.max(now);
        Ok(transition)
    }
}

/// Accepts exactly `{"public": true}`.
fn validate_public_patch(patch: &Map<String, Value>) -> Result<(), PolicyError> {
    if let Some(field) = patch.keys().find(|key| key.as_str() != "public") {
        return Err(PolicyError::Validation(format!(
            "'{field}' is a read-only field."
        )));
    }
    match patch.get("public") {
        Some(Value::Bool(true)) => Ok(()),
        Some(Value::Bool(false)) | None => {
            Err(PolicyError::Validation(PUBLIC_IS_ONE_WAY.to_string()))
        }
        Some(other) => Err(PolicyError::Validation(format!(
            "'public' must be a boolean, got {other}."
        ))),
    }
}

fn count_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::{validate_public_patch, PolicyError, Relationship};
    use crate::repo::node_repo::RepoError;
    use serde_json::json;
    use uuid::Uuid;

    fn patch(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().expect("object patch")
    }

    #[test]
    fn public_patch_accepts_only_true() {
        assert!(validate_public_patch(&patch(json!({"public": true}))).is_ok());

        let err = validate_public_patch(&patch(json!({"public": false}))).expect_err("false");
        assert_eq!(
            err.to_string(),
            "Registrations can only be turned from private to public."
        );
        assert!(validate_public_patch(&patch(json!({}))).is_err());
        assert!(validate_public_patch(&patch(json!({"public": "true"}))).is_err());
    }

    #[test]
    fn public_patch_rejects_other_attributes() {
        let err = validate_public_patch(&patch(json!({"public": true, "title": "x"})))
            .expect_err("title is read-only");
        assert_eq!(err.to_string(), "'title' is a read-only field.");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn relationship_names_accept_both_link_spellings() {
        assert_eq!(
            Relationship::parse("linked-nodes"),
            Some(Relationship::LinkedNodes)
        );
        assert_eq!(
            Relationship::parse("linked_nodes"),
            Some(Relationship::LinkedNodes)
        );
        assert_eq!(Relationship::parse("forks"), None);
    }

    #[test]
    fn status_codes_follow_error_kind() {
        let id = Uuid::new_v4();
        assert_eq!(PolicyError::NotFound(id).status_code(), 404);
        assert_eq!(
            PolicyError::PermissionDenied("no".to_string()).status_code(),
            403
        );
        assert_eq!(
            PolicyError::from(RepoError::PublicFlagReset(id)).status_code(),
            400
        );
        assert_eq!(
            PolicyError::from(RepoError::InvalidData("bad".to_string())).status_code(),
            500
        );
    }
}
