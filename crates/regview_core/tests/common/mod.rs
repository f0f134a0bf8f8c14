#![allow(dead_code)]

use regview_core::db::open_db_in_memory;
use regview_core::model::access::{Permission, UserId};
use regview_core::model::node::Node;
use regview_core::repo::{NodeRepository, SqliteNodeRepository};
use regview_core::{ContributorAuthorizer, PolicyConfig, RegistrationVisibilityPolicy};
use rusqlite::Connection;
use uuid::Uuid;

pub type SqlitePolicy<'conn> =
    RegistrationVisibilityPolicy<SqliteNodeRepository<'conn>, ContributorAuthorizer>;

/// 3000-01-01T00:00:00Z in epoch milliseconds.
pub const FAR_FUTURE_MS: i64 = 32_503_680_000_000;

pub fn open() -> Connection {
    open_db_in_memory().expect("open in-memory db")
}

pub fn repo(conn: &Connection) -> SqliteNodeRepository<'_> {
    SqliteNodeRepository::try_new(conn).expect("repo on migrated connection")
}

pub fn policy(conn: &Connection) -> SqlitePolicy<'_> {
    policy_with(conn, PolicyConfig::default())
}

pub fn policy_with(conn: &Connection, config: PolicyConfig) -> SqlitePolicy<'_> {
    RegistrationVisibilityPolicy::new(repo(conn), ContributorAuthorizer, config)
}

/// Contributors used across scenarios.
pub struct Users {
    pub admin: UserId,
    pub writer: UserId,
    pub reader: UserId,
    pub stranger: UserId,
}

impl Users {
    pub fn new() -> Self {
        Self {
            admin: Uuid::new_v4(),
            writer: Uuid::new_v4(),
            reader: Uuid::new_v4(),
            stranger: Uuid::new_v4(),
        }
    }
}

/// Private live project with `users.admin/writer/reader` as contributors.
pub fn project(users: &Users, title: &str, created_at: i64) -> Node {
    let mut node = Node::new(title, created_at);
    node.add_contributor(users.admin, Permission::Admin, true)
        .expect("add admin");
    node.add_contributor(users.writer, Permission::Write, true)
        .expect("add writer");
    node.add_contributor(users.reader, Permission::Read, false)
        .expect("add reader");
    node
}

/// Stores a registration of `source` and returns it.
pub fn register(
    repo: &impl NodeRepository,
    users: &Users,
    source: &Node,
    registered_at: i64,
    public: bool,
) -> Node {
    let mut registration = Node::registration_of(source, users.admin, registered_at);
    registration.is_public = public;
    repo.create_node(&registration).expect("create registration");
    registration
}

/// Stores a public registration of a fresh project titled `title`.
pub fn public_registration(
    repo: &impl NodeRepository,
    users: &Users,
    title: &str,
    created_at: i64,
) -> Node {
    let source = project(users, title, created_at);
    register(repo, users, &source, created_at + 1_000, true)
}

/// Marks a stored registration withdrawn with `justification`.
pub fn withdraw(repo: &impl NodeRepository, node: &mut Node, justification: &str) {
    let meta = node.registration.as_mut().expect("registration meta");
    meta.withdrawn = true;
    meta.pending_withdrawal = false;
    meta.withdrawal_justification = Some(justification.to_string());
    repo.save_node(node).expect("save withdrawn registration");
}
