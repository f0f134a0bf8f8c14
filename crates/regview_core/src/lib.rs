//! Registration visibility and access-control core.
//! This crate is the single source of truth for who may see which
//! registration, and which of its fields.

pub mod auth;
pub mod config;
pub mod db;
pub mod filter;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use auth::{Authorizer, ContributorAuthorizer};
pub use config::{AppConfig, ConfigError, PolicyConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use filter::{parse_filter_params, FilterError, FilterExpr, FilterOp, FilterValue};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::access::{Identity, Permission, UserId};
pub use model::node::{Contributor, Node, NodeCategory, NodeId, NodeValidationError};
pub use model::registration::{RegistrationState, RegistrationView, WithdrawalState};
pub use repo::node_repo::{
    NodeQuery, NodeRepository, ReadScope, RepoError, RepoResult, SqliteNodeRepository,
};
pub use service::registration_policy::{
    ListOptions, PolicyError, RegistrationPage, RegistrationVisibilityPolicy, RelationshipView,
};
