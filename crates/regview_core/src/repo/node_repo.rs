//! Node repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide find/get/save APIs over the canonical `nodes` storage.
//! - Compile filter expressions into SQL against stored values.
//! - Offer a check-then-write primitive that runs inside one immediate
//!   transaction.
//!
//! # Invariants
//! - Write paths call `Node::validate()` before SQL mutations.
//! - A stored registration's `is_public` never goes from 1 back to 0.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::filter::{FieldComparison, FilterExpr, FilterOp, FilterValue};
use crate::model::access::{Permission, UserId};
use crate::model::node::{
    Contributor, Node, NodeCategory, NodeId, NodeLicense, NodeValidationError, RegistrationMeta,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const NODE_SELECT_SQL: &str = "SELECT
    id,
    title,
    description,
    category,
    created_at,
    modified_at,
    is_public,
    is_deleted,
    is_collection,
    is_fork,
    is_registration,
    parent_id,
    root_id,
    license_name,
    license_year,
    license_copyright_holders,
    registered_at,
    registered_by,
    registered_from,
    registration_supplement,
    registered_meta,
    withdrawn,
    pending_withdrawal,
    withdrawal_justification,
    embargo_end_date,
    pending_embargo_approval,
    pending_embargo_termination,
    pending_registration_approval
FROM nodes";

/// Stable identifier of one node link pointer.
pub type NodeLinkId = Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for node persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(NodeValidationError),
    Db(DbError),
    NotFound(NodeId),
    InvalidData(String),
    /// Filter names a field or operator the store cannot translate.
    UnsupportedFilter(String),
    /// Attempted write would make a public registration private again.
    PublicFlagReset(NodeId),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "node not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted node data: {message}"),
            Self::UnsupportedFilter(message) => write!(f, "unsupported filter: {message}"),
            Self::PublicFlagReset(id) => {
                write!(f, "public registration {id} cannot be made private")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "node repository requires schema version {expected_version}, got {actual_version}"
            ),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NodeValidationError> for RepoError {
    fn from(value: NodeValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Which nodes a reader may list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadScope {
    /// No visibility restriction.
    #[default]
    All,
    Public,
    /// Public nodes plus nodes the user contributes to.
    PublicOrContributor(UserId),
}

/// Query options for finding nodes.
#[derive(Debug, Clone, Default)]
pub struct NodeQuery {
    pub registrations_only: bool,
    pub include_deleted: bool,
    pub include_collections: bool,
    pub scope: ReadScope,
    pub parent: Option<NodeId>,
    pub filter: Option<FilterExpr>,
}

/// Pointer from one node to another, distinct from parent/child nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLink {
    pub id: NodeLinkId,
    pub node_id: NodeId,
    pub target_id: NodeId,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Repository interface for the node store.
pub trait NodeRepository {
    fn create_node(&self, node: &Node) -> RepoResult<NodeId>;
    /// Overwrites every mutable column plus tags and contributors.
    fn save_node(&self, node: &Node) -> RepoResult<()>;
    fn get_node(&self, id: NodeId, include_deleted: bool) -> RepoResult<Option<Node>>;
    /// Ordered by `created_at DESC, id ASC`.
    fn find_nodes(&self, query: &NodeQuery) -> RepoResult<Vec<Node>>;
    /// Re-reads `id` inside an immediate write transaction, lets `mutate`
    /// inspect and change the fresh row, then persists it.
    ///
    /// Nothing is written when `mutate` fails.
    fn update_node_with<T, E, F>(&self, id: NodeId, mutate: F) -> Result<(Node, T), E>
    where
        F: FnOnce(&mut Node) -> Result<T, E>,
        E: From<RepoError>;
    fn soft_delete_node(&self, id: NodeId) -> RepoResult<()>;
    fn create_node_link(&self, node_id: NodeId, target_id: NodeId) -> RepoResult<NodeLink>;
    /// Active links of `node_id`, oldest first.
    fn list_node_links(&self, node_id: NodeId) -> RepoResult<Vec<NodeLink>>;
}

/// SQLite-backed node repository.
pub struct SqliteNodeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNodeRepository<'conn> {
    /// Constructs a repository from a fully migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let actual_version: u32 =
            conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    fn write_transaction(&self) -> RepoResult<Transaction<'conn>> {
        Ok(Transaction::new_unchecked(
            self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl NodeRepository for SqliteNodeRepository<'_> {
    fn create_node(&self, node: &Node) -> RepoResult<NodeId> {
        node.validate()?;

        let tx = self.write_transaction()?;
        insert_node_row(&tx, node)?;
        replace_contributors(&tx, node)?;
        replace_tags(&tx, node)?;
        tx.commit()?;

        Ok(node.id)
    }

    fn save_node(&self, node: &Node) -> RepoResult<()> {
        node.validate()?;

        let tx = self.write_transaction()?;
        let stored = load_node(&tx, node.id, true)?.ok_or(RepoError::NotFound(node.id))?;
        write_existing_node(&tx, &stored, node)?;
        tx.commit()?;
        Ok(())
    }

    fn get_node(&self, id: NodeId, include_deleted: bool) -> RepoResult<Option<Node>> {
        load_node(self.conn, id, include_deleted)
    }

    fn find_nodes(&self, query: &NodeQuery) -> RepoResult<Vec<Node>> {
        let mut sql = format!("{NODE_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        if !query.include_collections {
            sql.push_str(" AND is_collection = 0");
        }
        if query.registrations_only {
            sql.push_str(" AND is_registration = 1");
        }
        if let Some(parent) = query.parent {
            sql.push_str(" AND parent_id = ?");
            bind_values.push(Value::Text(parent.to_string()));
        }

        match query.scope {
            ReadScope::All => {}
            ReadScope::Public => sql.push_str(" AND is_public = 1"),
            ReadScope::PublicOrContributor(user_id) => {
                sql.push_str(
                    " AND (is_public = 1 OR EXISTS (
                        SELECT 1
                        FROM node_contributors c
                        WHERE c.node_id = nodes.id
                          AND c.user_id = ?
                    ))",
                );
                bind_values.push(Value::Text(user_id.to_string()));
            }
        }

        if let Some(filter) = query.filter.as_ref() {
            sql.push_str(" AND ");
            push_filter_sql(filter, &mut sql, &mut bind_values)?;
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_node_row(row)?);
        }
        drop(rows);

        for node in &mut nodes {
            attach_children(self.conn, node)?;
        }
        Ok(nodes)
    }

    fn update_node_with<T, E, F>(&self, id: NodeId, mutate: F) -> Result<(Node, T), E>
    where
        F: FnOnce(&mut Node) -> Result<T, E>,
        E: From<RepoError>,
    {
        let tx = self.write_transaction()?;
        let stored = load_node(&tx, id, false)?.ok_or(RepoError::NotFound(id))?;
        let mut node = stored.clone();
        let outcome = mutate(&mut node)?;

        node.validate().map_err(RepoError::from)?;
        write_existing_node(&tx, &stored, &node)?;
        tx.commit().map_err(RepoError::from)?;
        Ok((node, outcome))
    }

    fn soft_delete_node(&self, id: NodeId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE nodes
             SET
                is_deleted = 1,
                modified_at = MAX(modified_at, strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            [id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn create_node_link(&self, node_id: NodeId, target_id: NodeId) -> RepoResult<NodeLink> {
        for id in [node_id, target_id] {
            if load_node(self.conn, id, true)?.is_none() {
                return Err(RepoError::NotFound(id));
            }
        }

        let link_id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO node_links (id, node_id, target_id) VALUES (?1, ?2, ?3);",
            params![
                link_id.to_string(),
                node_id.to_string(),
                target_id.to_string()
            ],
        )?;
        let created_at: i64 = self.conn.query_row(
            "SELECT created_at FROM node_links WHERE id = ?1;",
            [link_id.to_string()],
            |row| row.get(0),
        )?;

        Ok(NodeLink {
            id: link_id,
            node_id,
            target_id,
            created_at,
        })
    }

    fn list_node_links(&self, node_id: NodeId) -> RepoResult<Vec<NodeLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, node_id, target_id, created_at
             FROM node_links
             WHERE node_id = ?1
               AND is_deleted = 0
             ORDER BY created_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([node_id.to_string()])?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            links.push(NodeLink {
                id: parse_uuid_column(row, "id")?,
                node_id: parse_uuid_column(row, "node_id")?,
                target_id: parse_uuid_column(row, "target_id")?,
                created_at: row.get("created_at")?,
            });
        }
        Ok(links)
    }
}

fn load_node(conn: &Connection, id: NodeId, include_deleted: bool) -> RepoResult<Option<Node>> {
    let mut stmt = conn.prepare(&format!(
        "{NODE_SELECT_SQL}
         WHERE id = ?1
           AND (?2 = 1 OR is_deleted = 0);"
    ))?;

    let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut node = parse_node_row(row)?;
    attach_children(conn, &mut node)?;
    Ok(Some(node))
}

fn insert_node_row(conn: &Connection, node: &Node) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO nodes (id, title, created_at, root_id) VALUES (?1, ?2, ?3, ?4);",
        params![
            node.id.to_string(),
            node.title.as_str(),
            node.created_at,
            node.root_id.to_string()
        ],
    )?;
    update_node_row(conn, node)
}

/// Writes `node` over `stored`, refusing to unpublish a registration.
fn write_existing_node(conn: &Connection, stored: &Node, node: &Node) -> RepoResult<()> {
    if stored.is_registration() && stored.is_public && !node.is_public {
        return Err(RepoError::PublicFlagReset(node.id));
    }
    update_node_row(conn, node)?;
    replace_contributors(conn, node)?;
    replace_tags(conn, node)
}

fn update_node_row(conn: &Connection, node: &Node) -> RepoResult<()> {
    let meta = node.registration.as_ref();
    let license_holders = node
        .license
        .as_ref()
        .map(|license| serde_json::to_string(&license.copyright_holders))
        .transpose()
        .map_err(|err| RepoError::InvalidData(format!("license holders: {err}")))?;
    let registered_meta = meta
        .and_then(|meta| meta.registered_meta.as_ref())
        .map(serde_json::to_string)
        .transpose()
        .map_err(|err| RepoError::InvalidData(format!("registered_meta: {err}")))?;

    let changed = conn.execute(
        "UPDATE nodes
         SET
            title = ?2,
            description = ?3,
            category = ?4,
            created_at = ?5,
            modified_at = ?6,
            is_public = ?7,
            is_deleted = ?8,
            is_collection = ?9,
            is_fork = ?10,
            is_registration = ?11,
            parent_id = ?12,
            root_id = ?13,
            license_name = ?14,
            license_year = ?15,
            license_copyright_holders = ?16,
            registered_at = ?17,
            registered_by = ?18,
            registered_from = ?19,
            registration_supplement = ?20,
            registered_meta = ?21,
            withdrawn = ?22,
            pending_withdrawal = ?23,
            withdrawal_justification = ?24,
            embargo_end_date = ?25,
            pending_embargo_approval = ?26,
            pending_embargo_termination = ?27,
            pending_registration_approval = ?28
         WHERE id = ?1;",
        params![
            node.id.to_string(),
            node.title.as_str(),
            node.description.as_str(),
            node.category.as_str(),
            node.created_at,
            node.modified_at,
            bool_to_int(node.is_public),
            bool_to_int(node.is_deleted),
            bool_to_int(node.is_collection),
            bool_to_int(node.is_fork),
            bool_to_int(meta.is_some()),
            node.parent_id.map(|id| id.to_string()),
            node.root_id.to_string(),
            node.license.as_ref().map(|license| license.name.as_str()),
            node.license
                .as_ref()
                .and_then(|license| license.year.as_deref()),
            license_holders,
            meta.map(|meta| meta.registered_at),
            meta.and_then(|meta| meta.registered_by)
                .map(|id| id.to_string()),
            meta.and_then(|meta| meta.registered_from)
                .map(|id| id.to_string()),
            meta.and_then(|meta| meta.registration_supplement.as_deref()),
            registered_meta,
            bool_to_int(meta.is_some_and(|meta| meta.withdrawn)),
            bool_to_int(meta.is_some_and(|meta| meta.pending_withdrawal)),
            meta.and_then(|meta| meta.withdrawal_justification.as_deref()),
            meta.and_then(|meta| meta.embargo_end_date),
            bool_to_int(meta.is_some_and(|meta| meta.pending_embargo_approval)),
            bool_to_int(meta.is_some_and(|meta| meta.pending_embargo_termination)),
            bool_to_int(meta.is_some_and(|meta| meta.pending_registration_approval)),
        ],
    )?;

    if changed == 0 {
        return Err(RepoError::NotFound(node.id));
    }
    Ok(())
}

fn replace_contributors(conn: &Connection, node: &Node) -> RepoResult<()> {
    let node_id = node.id.to_string();
    conn.execute(
        "DELETE FROM node_contributors WHERE node_id = ?1;",
        [node_id.as_str()],
    )?;
    for (index, contributor) in node.contributors.iter().enumerate() {
        let sort_order = i64::try_from(index)
            .map_err(|_| RepoError::InvalidData("too many contributors".to_string()))?;
        conn.execute(
            "INSERT INTO node_contributors (node_id, user_id, permission, bibliographic, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                node_id.as_str(),
                contributor.user_id.to_string(),
                contributor.permission.as_str(),
                bool_to_int(contributor.bibliographic),
                sort_order,
            ],
        )?;
    }
    Ok(())
}

fn replace_tags(conn: &Connection, node: &Node) -> RepoResult<()> {
    let node_id = node.id.to_string();
    conn.execute("DELETE FROM node_tags WHERE node_id = ?1;", [node_id.as_str()])?;
    for tag in &node.tags {
        conn.execute(
            "INSERT OR IGNORE INTO node_tags (node_id, tag) VALUES (?1, ?2);",
            params![node_id.as_str(), tag.as_str()],
        )?;
    }
    Ok(())
}

fn attach_children(conn: &Connection, node: &mut Node) -> RepoResult<()> {
    let node_id = node.id.to_string();

    let mut stmt = conn.prepare(
        "SELECT user_id, permission, bibliographic
         FROM node_contributors
         WHERE node_id = ?1
         ORDER BY sort_order ASC;",
    )?;
    let mut rows = stmt.query([node_id.as_str()])?;
    let mut contributors = Vec::new();
    while let Some(row) = rows.next()? {
        let permission_text: String = row.get("permission")?;
        let permission = Permission::parse(&permission_text).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid permission `{permission_text}` in node_contributors.permission"
            ))
        })?;
        contributors.push(Contributor {
            user_id: parse_uuid_column(row, "user_id")?,
            permission,
            bibliographic: parse_flag(row, "bibliographic")?,
        });
    }

    let mut stmt = conn.prepare("SELECT tag FROM node_tags WHERE node_id = ?1 ORDER BY tag ASC;")?;
    let mut rows = stmt.query([node_id.as_str()])?;
    let mut tags = Vec::new();
    while let Some(row) = rows.next()? {
        tags.push(row.get::<_, String>(0)?);
    }

    node.contributors = contributors;
    node.tags = tags;
    Ok(())
}

fn parse_node_row(row: &Row<'_>) -> RepoResult<Node> {
    let category_text: String = row.get("category")?;
    let category = NodeCategory::parse(&category_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid category `{category_text}` in nodes.category"))
    })?;

    let license = match row.get::<_, Option<String>>("license_name")? {
        Some(name) => {
            let holders_text: Option<String> = row.get("license_copyright_holders")?;
            let copyright_holders = match holders_text {
                Some(text) => serde_json::from_str(&text).map_err(|err| {
                    RepoError::InvalidData(format!(
                        "invalid nodes.license_copyright_holders: {err}"
                    ))
                })?,
                None => Vec::new(),
            };
            Some(NodeLicense {
                name,
                year: row.get("license_year")?,
                copyright_holders,
            })
        }
        None => None,
    };

    let registration = if parse_flag(row, "is_registration")? {
        let registered_at = row
            .get::<_, Option<i64>>("registered_at")?
            .ok_or_else(|| {
                RepoError::InvalidData("registration without nodes.registered_at".to_string())
            })?;
        let registered_meta = match row.get::<_, Option<String>>("registered_meta")? {
            Some(text) => Some(serde_json::from_str(&text).map_err(|err| {
                RepoError::InvalidData(format!("invalid nodes.registered_meta: {err}"))
            })?),
            None => None,
        };
        Some(RegistrationMeta {
            registered_at,
            registered_by: parse_optional_uuid_column(row, "registered_by")?,
            registered_from: parse_optional_uuid_column(row, "registered_from")?,
            registration_supplement: row.get("registration_supplement")?,
            registered_meta,
            withdrawn: parse_flag(row, "withdrawn")?,
            pending_withdrawal: parse_flag(row, "pending_withdrawal")?,
            withdrawal_justification: row.get("withdrawal_justification")?,
            embargo_end_date: row.get("embargo_end_date")?,
            pending_embargo_approval: parse_flag(row, "pending_embargo_approval")?,
            pending_embargo_termination: parse_flag(row, "pending_embargo_termination")?,
            pending_registration_approval: parse_flag(row, "pending_registration_approval")?,
        })
    } else {
        None
    };

    let node = Node {
        id: parse_uuid_column(row, "id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        category,
        created_at: row.get("created_at")?,
        modified_at: row.get("modified_at")?,
        tags: Vec::new(),
        is_public: parse_flag(row, "is_public")?,
        is_deleted: parse_flag(row, "is_deleted")?,
        is_collection: parse_flag(row, "is_collection")?,
        is_fork: parse_flag(row, "is_fork")?,
        parent_id: parse_optional_uuid_column(row, "parent_id")?,
        root_id: parse_uuid_column(row, "root_id")?,
        license,
        contributors: Vec::new(),
        registration,
    };
    Ok(node)
}

/// Appends the SQL form of `expr` to `sql`, pushing bind values in order.
fn push_filter_sql(expr: &FilterExpr, sql: &mut String, binds: &mut Vec<Value>) -> RepoResult<()> {
    match expr {
        FilterExpr::Compare(comparison) => push_comparison_sql(comparison, sql, binds),
        FilterExpr::And(children) => push_group_sql(children, " AND ", "1 = 1", sql, binds),
        FilterExpr::Or(children) => push_group_sql(children, " OR ", "1 = 0", sql, binds),
    }
}

fn push_group_sql(
    children: &[FilterExpr],
    joiner: &str,
    empty: &str,
    sql: &mut String,
    binds: &mut Vec<Value>,
) -> RepoResult<()> {
    if children.is_empty() {
        sql.push_str(empty);
        return Ok(());
    }
    sql.push('(');
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            sql.push_str(joiner);
        }
        push_filter_sql(child, sql, binds)?;
    }
    sql.push(')');
    Ok(())
}

fn push_comparison_sql(
    comparison: &FieldComparison,
    sql: &mut String,
    binds: &mut Vec<Value>,
) -> RepoResult<()> {
    let column = match comparison.field.as_str() {
        "id" => "nodes.id",
        "title" => "nodes.title",
        "description" => "nodes.description",
        "category" => "nodes.category",
        "public" => "nodes.is_public",
        "date_created" => "nodes.created_at",
        "date_modified" => "nodes.modified_at",
        "parent" => "nodes.parent_id",
        "root" => "nodes.root_id",
        "tags" => return push_tags_sql(comparison, sql, binds),
        "contributors" => return push_contributors_sql(comparison, sql, binds),
        other => {
            return Err(RepoError::UnsupportedFilter(format!(
                "field `{other}` has no storage column"
            )))
        }
    };

    let unsupported = || {
        RepoError::UnsupportedFilter(format!(
            "operator `{}` with {:?} on `{}`",
            comparison.op, comparison.value, comparison.field
        ))
    };

    match (comparison.op, &comparison.value) {
        (FilterOp::Eq, FilterValue::Null) => sql.push_str(&format!("{column} IS NULL")),
        (FilterOp::Ne, FilterValue::Null) => sql.push_str(&format!("{column} IS NOT NULL")),
        (FilterOp::Eq, value) => {
            sql.push_str(&format!("{column} = ?"));
            binds.push(scalar_value(value).ok_or_else(unsupported)?);
        }
        (FilterOp::Ne, value) => {
            sql.push_str(&format!("{column} IS NOT ?"));
            binds.push(scalar_value(value).ok_or_else(unsupported)?);
        }
        (FilterOp::Contains, FilterValue::Text(text)) => {
            sql.push_str(&format!("instr({column}, ?) > 0"));
            binds.push(Value::Text(text.clone()));
        }
        (FilterOp::Icontains, FilterValue::Text(text)) => {
            sql.push_str(&format!("instr(lower({column}), lower(?)) > 0"));
            binds.push(Value::Text(text.clone()));
        }
        (op @ (FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte), value) => {
            let symbol = match op {
                FilterOp::Gt => ">",
                FilterOp::Gte => ">=",
                FilterOp::Lt => "<",
                _ => "<=",
            };
            sql.push_str(&format!("{column} {symbol} ?"));
            binds.push(scalar_value(value).ok_or_else(unsupported)?);
        }
        (FilterOp::In, FilterValue::List(values)) if !values.is_empty() => {
            let placeholders = vec!["?"; values.len()].join(", ");
            sql.push_str(&format!("{column} IN ({placeholders})"));
            binds.extend(values.iter().cloned().map(Value::Text));
        }
        _ => return Err(unsupported()),
    }
    Ok(())
}

fn push_tags_sql(
    comparison: &FieldComparison,
    sql: &mut String,
    binds: &mut Vec<Value>,
) -> RepoResult<()> {
    const ANY_TAG: &str = "EXISTS (SELECT 1 FROM node_tags t WHERE t.node_id = nodes.id)";
    const TAG_EQUALS: &str =
        "EXISTS (SELECT 1 FROM node_tags t WHERE t.node_id = nodes.id AND t.tag = lower(?))";

    match (comparison.op, &comparison.value) {
        (FilterOp::Eq | FilterOp::Contains, FilterValue::Null) => {
            sql.push_str(&format!("NOT {ANY_TAG}"));
        }
        (FilterOp::Ne, FilterValue::Null) => sql.push_str(ANY_TAG),
        (FilterOp::Eq | FilterOp::Contains, FilterValue::Text(tag)) => {
            sql.push_str(TAG_EQUALS);
            binds.push(Value::Text(tag.clone()));
        }
        (FilterOp::Ne, FilterValue::Text(tag)) => {
            sql.push_str(&format!("NOT {TAG_EQUALS}"));
            binds.push(Value::Text(tag.clone()));
        }
        (FilterOp::Icontains, FilterValue::Text(fragment)) => {
            sql.push_str(
                "EXISTS (
                    SELECT 1
                    FROM node_tags t
                    WHERE t.node_id = nodes.id
                      AND instr(t.tag, lower(?)) > 0
                )",
            );
            binds.push(Value::Text(fragment.clone()));
        }
        (op, value) => {
            return Err(RepoError::UnsupportedFilter(format!(
                "operator `{op}` with {value:?} on `tags`"
            )))
        }
    }
    Ok(())
}

fn push_contributors_sql(
    comparison: &FieldComparison,
    sql: &mut String,
    binds: &mut Vec<Value>,
) -> RepoResult<()> {
    const ANY_CONTRIBUTOR: &str =
        "EXISTS (SELECT 1 FROM node_contributors c WHERE c.node_id = nodes.id)";
    const IS_CONTRIBUTOR: &str =
        "EXISTS (SELECT 1 FROM node_contributors c WHERE c.node_id = nodes.id AND c.user_id = ?)";

    match (comparison.op, &comparison.value) {
        (FilterOp::Eq, FilterValue::Null) => sql.push_str(&format!("NOT {ANY_CONTRIBUTOR}")),
        (FilterOp::Ne, FilterValue::Null) => sql.push_str(ANY_CONTRIBUTOR),
        (FilterOp::Eq, FilterValue::Text(user_id)) => {
            sql.push_str(IS_CONTRIBUTOR);
            binds.push(Value::Text(user_id.clone()));
        }
        (FilterOp::Ne, FilterValue::Text(user_id)) => {
            sql.push_str(&format!("NOT {IS_CONTRIBUTOR}"));
            binds.push(Value::Text(user_id.clone()));
        }
        (op, value) => {
            return Err(RepoError::UnsupportedFilter(format!(
                "operator `{op}` with {value:?} on `contributors`"
            )))
        }
    }
    Ok(())
}

fn scalar_value(value: &FilterValue) -> Option<Value> {
    match value {
        FilterValue::Bool(flag) => Some(Value::Integer(bool_to_int(*flag))),
        FilterValue::Text(text) => Some(Value::Text(text.clone())),
        FilterValue::Timestamp(millis) => Some(Value::Integer(*millis)),
        FilterValue::Null | FilterValue::List(_) => None,
    }
}

fn parse_uuid_column(row: &Row<'_>, column: &str) -> RepoResult<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{text}` in {column}")))
}

fn parse_optional_uuid_column(row: &Row<'_>, column: &str) -> RepoResult<Option<Uuid>> {
    match row.get::<_, Option<String>>(column)? {
        Some(text) => Uuid::parse_str(&text).map(Some).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{text}` in {column}"))
        }),
        None => Ok(None),
    }
}

fn parse_flag(row: &Row<'_>, column: &str) -> RepoResult<bool> {
    match row.get::<_, i64>(column)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
