//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and authorizer calls into visibility rules.
//! - Keep CLI and API layers decoupled from storage details.

pub mod node_visibility;
pub mod registration_policy;

pub use node_visibility::NodeVisibility;
pub use registration_policy::{
    LinkedNodeView, ListOptions, PolicyError, PublicTransition, RegistrationPage,
    RegistrationVisibilityPolicy, Relationship, RelationshipView,
};
