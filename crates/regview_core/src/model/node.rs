//! Node domain model.
//!
//! # Responsibility
//! - Define the canonical record shared by live projects and registrations.
//! - Provide lifecycle helpers for soft-delete and the one-way public flag.
//!
//! # Invariants
//! - `id` is stable and never reused for another node.
//! - `is_deleted` is the source of truth for tombstone state.
//! - `is_public` never transitions from `true` back to `false` on a
//!   registration.
//! - Registration-only state lives in `registration`, so a live project can
//!   never carry withdrawal or embargo flags.

use crate::model::access::{Permission, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for projects, components and registrations.
pub type NodeId = Uuid;

/// Category choices a node may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    #[serde(rename = "")]
    Uncategorized,
    #[serde(rename = "project")]
    Project,
    #[serde(rename = "hypothesis")]
    Hypothesis,
    #[serde(rename = "methods and measures")]
    MethodsAndMeasures,
    #[serde(rename = "procedure")]
    Procedure,
    #[serde(rename = "instrumentation")]
    Instrumentation,
    #[serde(rename = "data")]
    Data,
    #[serde(rename = "analysis")]
    Analysis,
    #[serde(rename = "communication")]
    Communication,
    #[serde(rename = "software")]
    Software,
    #[serde(rename = "other")]
    Other,
}

impl NodeCategory {
    pub const ALL: [NodeCategory; 11] = [
        Self::Uncategorized,
        Self::Project,
        Self::Hypothesis,
        Self::MethodsAndMeasures,
        Self::Procedure,
        Self::Instrumentation,
        Self::Data,
        Self::Analysis,
        Self::Communication,
        Self::Software,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uncategorized => "",
            Self::Project => "project",
            Self::Hypothesis => "hypothesis",
            Self::MethodsAndMeasures => "methods and measures",
            Self::Procedure => "procedure",
            Self::Instrumentation => "instrumentation",
            Self::Data => "data",
            Self::Analysis => "analysis",
            Self::Communication => "communication",
            Self::Software => "software",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
    }
}

/// License applied to a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLicense {
    pub name: String,
    pub year: Option<String>,
    pub copyright_holders: Vec<String>,
}

/// One contributor entry. List order is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub user_id: UserId,
    pub permission: Permission,
    /// Listed in citations when `true`.
    pub bibliographic: bool,
}

/// Registration-only state of a frozen node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationMeta {
    /// Unix epoch milliseconds.
    pub registered_at: i64,
    pub registered_by: Option<UserId>,
    /// Live project this registration was branched from.
    pub registered_from: Option<NodeId>,
    /// Name of the registration template used.
    pub registration_supplement: Option<String>,
    /// Supplemental questions and responses, kept as raw JSON.
    pub registered_meta: Option<serde_json::Value>,
    pub withdrawn: bool,
    pub pending_withdrawal: bool,
    pub withdrawal_justification: Option<String>,
    /// Unix epoch milliseconds.
    pub embargo_end_date: Option<i64>,
    pub pending_embargo_approval: bool,
    /// An admin asked to lift an active embargo early.
    pub pending_embargo_termination: bool,
    pub pending_registration_approval: bool,
}

impl RegistrationMeta {
    pub fn new(registered_at: i64) -> Self {
        Self {
            registered_at,
            registered_by: None,
            registered_from: None,
            registration_supplement: None,
            registered_meta: None,
            withdrawn: false,
            pending_withdrawal: false,
            withdrawal_justification: None,
            embargo_end_date: None,
            pending_embargo_approval: false,
            pending_embargo_termination: false,
            pending_registration_approval: false,
        }
    }

    /// Whether this record carries its own withdrawal decision, pending or final.
    pub fn has_withdrawal(&self) -> bool {
        self.withdrawn || self.pending_withdrawal
    }
}

/// Canonical record for projects, components and registrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub title: String,
    pub description: String,
    pub category: NodeCategory,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub modified_at: i64,
    /// Lowercase, deduplicated, sorted.
    pub tags: Vec<String>,
    pub is_public: bool,
    pub is_deleted: bool,
    /// Collections are a separate resource and never surface as nodes.
    pub is_collection: bool,
    pub is_fork: bool,
    pub parent_id: Option<NodeId>,
    /// Top-most ancestor; equals `id` for root nodes.
    pub root_id: NodeId,
    pub license: Option<NodeLicense>,
    pub contributors: Vec<Contributor>,
    /// `Some` exactly when this node is a registration.
    pub registration: Option<RegistrationMeta>,
}

impl Node {
    /// Creates a private, root-level live project.
    pub fn new(title: impl Into<String>, created_at: i64) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            title: title.into(),
            description: String::new(),
            category: NodeCategory::Project,
            created_at,
            modified_at: created_at,
            tags: Vec::new(),
            is_public: false,
            is_deleted: false,
            is_collection: false,
            is_fork: false,
            parent_id: None,
            root_id: id,
            license: None,
            contributors: Vec::new(),
            registration: None,
        }
    }

    /// Creates a component nested under `parent`.
    pub fn child_of(parent: &Node, title: impl Into<String>, created_at: i64) -> Self {
        let mut node = Self::new(title, created_at);
        node.category = NodeCategory::Uncategorized;
        node.parent_id = Some(parent.id);
        node.root_id = parent.root_id;
        node.registration = parent
            .registration
            .as_ref()
            .map(|meta| RegistrationMeta::new(meta.registered_at));
        node
    }

    /// Freezes `source` into a new private registration.
    ///
    /// Copies descriptive fields, tags, license and contributors; the result
    /// is root-level unless re-parented by the caller.
    pub fn registration_of(source: &Node, registered_by: UserId, registered_at: i64) -> Self {
        let id = Uuid::new_v4();
        let mut meta = RegistrationMeta::new(registered_at);
        meta.registered_by = Some(registered_by);
        meta.registered_from = Some(source.id);

        Self {
            id,
            title: source.title.clone(),
            description: source.description.clone(),
            category: source.category,
            created_at: source.created_at,
            modified_at: registered_at,
            tags: source.tags.clone(),
            is_public: false,
            is_deleted: false,
            is_collection: false,
            is_fork: source.is_fork,
            parent_id: None,
            root_id: id,
            license: source.license.clone(),
            contributors: source.contributors.clone(),
            registration: Some(meta),
        }
    }

    pub fn is_registration(&self) -> bool {
        self.registration.is_some()
    }

    /// Whether this node's own registration record is withdrawn.
    ///
    /// Does not look at ancestors; see `WithdrawalState::resolve`.
    pub fn is_withdrawn(&self) -> bool {
        self.registration.as_ref().is_some_and(|meta| meta.withdrawn)
    }

    pub fn contributor(&self, user_id: UserId) -> Option<&Contributor> {
        self.contributors
            .iter()
            .find(|contributor| contributor.user_id == user_id)
    }

    /// Appends a contributor at the end of the display order.
    pub fn add_contributor(
        &mut self,
        user_id: UserId,
        permission: Permission,
        bibliographic: bool,
    ) -> Result<(), NodeValidationError> {
        if self.contributor(user_id).is_some() {
            return Err(NodeValidationError::DuplicateContributor(user_id));
        }
        self.contributors.push(Contributor {
            user_id,
            permission,
            bibliographic,
        });
        Ok(())
    }

    /// Replaces tags with their normalized, deduplicated form.
    pub fn set_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
    }

    /// Flips the node public. Returns whether anything changed.
    ///
    /// There is deliberately no inverse operation.
    pub fn make_public(&mut self) -> bool {
        let changed = !self.is_public;
        self.is_public = true;
        changed
    }

    /// Marks this node as softly deleted (tombstoned).
    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
    }

    /// Validates structural invariants before persistence.
    pub fn validate(&self) -> Result<(), NodeValidationError> {
        if self.title.trim().is_empty() {
            return Err(NodeValidationError::EmptyTitle);
        }
        if self.modified_at < self.created_at {
            return Err(NodeValidationError::ModifiedBeforeCreated {
                created_at: self.created_at,
                modified_at: self.modified_at,
            });
        }
        if self.parent_id.is_none() && self.root_id != self.id {
            return Err(NodeValidationError::RootMismatch);
        }
        if self.parent_id == Some(self.id) {
            return Err(NodeValidationError::SelfParent);
        }

        let mut seen = BTreeSet::new();
        for contributor in &self.contributors {
            if !seen.insert(contributor.user_id) {
                return Err(NodeValidationError::DuplicateContributor(
                    contributor.user_id,
                ));
            }
        }

        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(NodeValidationError::EmptyTag);
        }

        if let Some(meta) = self.registration.as_ref() {
            if meta.withdrawn && meta.pending_withdrawal {
                return Err(NodeValidationError::WithdrawnAndPendingWithdrawal);
            }
            if let Some(end) = meta.embargo_end_date {
                if end < meta.registered_at {
                    return Err(NodeValidationError::EmbargoEndsBeforeRegistration {
                        registered_at: meta.registered_at,
                        embargo_end_date: end,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Normalizes tag values: trimmed, lowercase, deduplicated, sorted.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .filter_map(|tag| {
            let trimmed = tag.as_ref().trim();
            (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Node structural validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValidationError {
    EmptyTitle,
    EmptyTag,
    ModifiedBeforeCreated { created_at: i64, modified_at: i64 },
    RootMismatch,
    SelfParent,
    DuplicateContributor(UserId),
    WithdrawnAndPendingWithdrawal,
    EmbargoEndsBeforeRegistration {
        registered_at: i64,
        embargo_end_date: i64,
    },
}

impl Display for NodeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "node title must not be empty"),
            Self::EmptyTag => write!(f, "node tags must not be empty"),
            Self::ModifiedBeforeCreated {
                created_at,
                modified_at,
            } => write!(
                f,
                "modified_at ({modified_at}) must not be earlier than created_at ({created_at})"
            ),
            Self::RootMismatch => write!(f, "root-level node must be its own root"),
            Self::SelfParent => write!(f, "node cannot be its own parent"),
            Self::DuplicateContributor(user_id) => {
                write!(f, "user {user_id} is already a contributor")
            }
            Self::WithdrawnAndPendingWithdrawal => write!(
                f,
                "registration cannot be withdrawn and pending withdrawal at once"
            ),
            Self::EmbargoEndsBeforeRegistration {
                registered_at,
                embargo_end_date,
            } => write!(
                f,
                "embargo end ({embargo_end_date}) precedes registration date ({registered_at})"
            ),
        }
    }
}

impl Error for NodeValidationError {}
