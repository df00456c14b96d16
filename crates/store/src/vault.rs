//! Vault graph storage.
//!
//! Nodes live in `vault."Nodes"` with one nullable column per field; a
//! NULL column is an absent field, so the presence mask is reconstructed
//! from the row shape. Edges live in `vault."NodeRefs"` with uniqueness
//! on `(ParentIdx, ChildIdx)`.
//!
//! Partial updates and template matching compose their column lists from
//! the presence mask at call time, binding only the set fields.

use snafu::ResultExt;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use relto_types::{NodeType, StandardNode};
use relto_vault::{fields, Node, NodeRef};

use crate::error::{DatabaseSnafu, Result};

/// Which SQL type a node field binds as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Unsigned 32-bit, stored as BIGINT.
    U32,
    /// Signed 32-bit, stored as INTEGER.
    I32,
    /// UUID column.
    Uuid,
    /// TEXT column, case-sensitive.
    Str,
    /// TEXT column, compared case-insensitively.
    IStr,
    /// BYTEA column.
    Blob,
}

/// The ordinal field table: presence bit, column name, SQL kind.
///
/// Order is the serialization order and the column order of every
/// composed statement; do not reorder.
const FIELD_COLUMNS: &[(u64, &str, FieldKind)] = &[
    (fields::NODE_IDX, "idx", FieldKind::U32),
    (fields::CREATE_TIME, "\"CreateTime\"", FieldKind::U32),
    (fields::MODIFY_TIME, "\"ModifyTime\"", FieldKind::U32),
    (fields::CREATE_AGE_NAME, "\"CreateAgeName\"", FieldKind::Str),
    (fields::CREATE_AGE_UUID, "\"CreateAgeUuid\"", FieldKind::Uuid),
    (fields::CREATOR_UUID, "\"CreatorUuid\"", FieldKind::Uuid),
    (fields::CREATOR_IDX, "\"CreatorIdx\"", FieldKind::U32),
    (fields::NODE_TYPE, "\"NodeType\"", FieldKind::I32),
    (fields::INT32_1, "\"Int32_1\"", FieldKind::I32),
    (fields::INT32_2, "\"Int32_2\"", FieldKind::I32),
    (fields::INT32_3, "\"Int32_3\"", FieldKind::I32),
    (fields::INT32_4, "\"Int32_4\"", FieldKind::I32),
    (fields::UINT32_1, "\"Uint32_1\"", FieldKind::U32),
    (fields::UINT32_2, "\"Uint32_2\"", FieldKind::U32),
    (fields::UINT32_3, "\"Uint32_3\"", FieldKind::U32),
    (fields::UINT32_4, "\"Uint32_4\"", FieldKind::U32),
    (fields::UUID_1, "\"Uuid_1\"", FieldKind::Uuid),
    (fields::UUID_2, "\"Uuid_2\"", FieldKind::Uuid),
    (fields::UUID_3, "\"Uuid_3\"", FieldKind::Uuid),
    (fields::UUID_4, "\"Uuid_4\"", FieldKind::Uuid),
    (fields::STRING64_1, "\"String64_1\"", FieldKind::Str),
    (fields::STRING64_2, "\"String64_2\"", FieldKind::Str),
    (fields::STRING64_3, "\"String64_3\"", FieldKind::Str),
    (fields::STRING64_4, "\"String64_4\"", FieldKind::Str),
    (fields::STRING64_5, "\"String64_5\"", FieldKind::Str),
    (fields::STRING64_6, "\"String64_6\"", FieldKind::Str),
    (fields::ISTRING64_1, "\"IString64_1\"", FieldKind::IStr),
    (fields::ISTRING64_2, "\"IString64_2\"", FieldKind::IStr),
    (fields::TEXT_1, "\"Text_1\"", FieldKind::Str),
    (fields::TEXT_2, "\"Text_2\"", FieldKind::Str),
    (fields::BLOB_1, "\"Blob_1\"", FieldKind::Blob),
    (fields::BLOB_2, "\"Blob_2\"", FieldKind::Blob),
];

/// Binds one node field onto a query, by presence bit.
fn bind_field<'q>(
    query: Query<'q, Postgres, PgArguments>,
    node: &'q Node,
    bit: u64,
) -> Query<'q, Postgres, PgArguments> {
    match bit {
        fields::NODE_IDX => query.bind(node.node_idx as i64),
        fields::CREATE_TIME => query.bind(node.create_time as i64),
        fields::MODIFY_TIME => query.bind(node.modify_time as i64),
        fields::CREATE_AGE_NAME => query.bind(&node.create_age_name),
        fields::CREATE_AGE_UUID => query.bind(node.create_age_uuid),
        fields::CREATOR_UUID => query.bind(node.creator_uuid),
        fields::CREATOR_IDX => query.bind(node.creator_idx as i64),
        fields::NODE_TYPE => query.bind(node.node_type),
        fields::INT32_1 => query.bind(node.int32_1),
        fields::INT32_2 => query.bind(node.int32_2),
        fields::INT32_3 => query.bind(node.int32_3),
        fields::INT32_4 => query.bind(node.int32_4),
        fields::UINT32_1 => query.bind(node.uint32_1 as i64),
        fields::UINT32_2 => query.bind(node.uint32_2 as i64),
        fields::UINT32_3 => query.bind(node.uint32_3 as i64),
        fields::UINT32_4 => query.bind(node.uint32_4 as i64),
        fields::UUID_1 => query.bind(node.uuid_1),
        fields::UUID_2 => query.bind(node.uuid_2),
        fields::UUID_3 => query.bind(node.uuid_3),
        fields::UUID_4 => query.bind(node.uuid_4),
        fields::STRING64_1 => query.bind(&node.string64_1),
        fields::STRING64_2 => query.bind(&node.string64_2),
        fields::STRING64_3 => query.bind(&node.string64_3),
        fields::STRING64_4 => query.bind(&node.string64_4),
        fields::STRING64_5 => query.bind(&node.string64_5),
        fields::STRING64_6 => query.bind(&node.string64_6),
        fields::ISTRING64_1 => query.bind(&node.istring64_1),
        fields::ISTRING64_2 => query.bind(&node.istring64_2),
        fields::TEXT_1 => query.bind(&node.text_1),
        fields::TEXT_2 => query.bind(&node.text_2),
        fields::BLOB_1 => query.bind(&node.blob_1),
        fields::BLOB_2 => query.bind(&node.blob_2),
        _ => query,
    }
}

/// Composes the INSERT statement for a node's set fields.
///
/// Returns the SQL and the bits to bind, in column order. `idx` is
/// always generated by the database.
fn insert_sql(mask: u64) -> (String, Vec<u64>) {
    let mut columns = Vec::new();
    let mut bits = Vec::new();
    for (bit, column, _) in FIELD_COLUMNS {
        if *bit != fields::NODE_IDX && mask & bit != 0 {
            columns.push(*column);
            bits.push(*bit);
        }
    }
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let sql = format!(
        "INSERT INTO vault.\"Nodes\" ({}) VALUES ({}) RETURNING idx",
        columns.join(", "),
        placeholders.join(", "),
    );
    (sql, bits)
}

/// Composes the partial UPDATE for a node's set fields.
///
/// The WHERE placeholder comes last; the caller binds the node index
/// after the field values.
fn update_sql(mask: u64) -> (String, Vec<u64>) {
    let mut assignments = Vec::new();
    let mut bits = Vec::new();
    for (bit, column, _) in FIELD_COLUMNS {
        if *bit != fields::NODE_IDX && mask & bit != 0 {
            assignments.push(format!("{}=${}", column, assignments.len() + 1));
            bits.push(*bit);
        }
    }
    let sql = format!(
        "UPDATE vault.\"Nodes\" SET {} WHERE idx=${}",
        assignments.join(", "),
        assignments.len() + 1,
    );
    (sql, bits)
}

/// Composes the WHERE conjunction matching a template's set fields.
///
/// Case-insensitive columns compare lowercased on both sides.
fn find_sql(mask: u64) -> (String, Vec<u64>) {
    let mut conditions = Vec::new();
    let mut bits = Vec::new();
    for (bit, column, kind) in FIELD_COLUMNS {
        if mask & bit != 0 {
            let position = conditions.len() + 1;
            match kind {
                FieldKind::IStr => {
                    conditions.push(format!("LOWER({column})=LOWER(${position})"));
                }
                _ => conditions.push(format!("{column}=${position}")),
            }
            bits.push(*bit);
        }
    }
    let sql = format!(
        "SELECT idx FROM vault.\"Nodes\" WHERE {} ORDER BY idx",
        conditions.join(" AND "),
    );
    (sql, bits)
}

const SELECT_ALL_COLUMNS: &str = "SELECT idx, \"CreateTime\", \"ModifyTime\", \
    \"CreateAgeName\", \"CreateAgeUuid\", \"CreatorUuid\", \"CreatorIdx\", \"NodeType\", \
    \"Int32_1\", \"Int32_2\", \"Int32_3\", \"Int32_4\", \
    \"Uint32_1\", \"Uint32_2\", \"Uint32_3\", \"Uint32_4\", \
    \"Uuid_1\", \"Uuid_2\", \"Uuid_3\", \"Uuid_4\", \
    \"String64_1\", \"String64_2\", \"String64_3\", \"String64_4\", \"String64_5\", \"String64_6\", \
    \"IString64_1\", \"IString64_2\", \"Text_1\", \"Text_2\", \"Blob_1\", \"Blob_2\" \
    FROM vault.\"Nodes\"";

/// Materializes one row into a node, deriving the mask from NULLs.
fn node_from_row(row: &sqlx::postgres::PgRow) -> Result<Node> {
    let mut node = Node::new();

    macro_rules! col {
        ($index:expr, $bit:path, $field:ident, i64) => {
            if let Some(value) = row.try_get::<Option<i64>, _>($index).context(DatabaseSnafu)? {
                node.fields |= $bit;
                node.$field = value as u32;
            }
        };
        ($index:expr, $bit:path, $field:ident, i32) => {
            if let Some(value) = row.try_get::<Option<i32>, _>($index).context(DatabaseSnafu)? {
                node.fields |= $bit;
                node.$field = value;
            }
        };
        ($index:expr, $bit:path, $field:ident, uuid) => {
            if let Some(value) = row.try_get::<Option<Uuid>, _>($index).context(DatabaseSnafu)? {
                node.fields |= $bit;
                node.$field = value;
            }
        };
        ($index:expr, $bit:path, $field:ident, text) => {
            if let Some(value) = row.try_get::<Option<String>, _>($index).context(DatabaseSnafu)? {
                node.fields |= $bit;
                node.$field = value;
            }
        };
        ($index:expr, $bit:path, $field:ident, bytes) => {
            if let Some(value) = row.try_get::<Option<Vec<u8>>, _>($index).context(DatabaseSnafu)? {
                node.fields |= $bit;
                node.$field = value;
            }
        };
    }

    col!(0, fields::NODE_IDX, node_idx, i64);
    col!(1, fields::CREATE_TIME, create_time, i64);
    col!(2, fields::MODIFY_TIME, modify_time, i64);
    col!(3, fields::CREATE_AGE_NAME, create_age_name, text);
    col!(4, fields::CREATE_AGE_UUID, create_age_uuid, uuid);
    col!(5, fields::CREATOR_UUID, creator_uuid, uuid);
    col!(6, fields::CREATOR_IDX, creator_idx, i64);
    col!(7, fields::NODE_TYPE, node_type, i32);
    col!(8, fields::INT32_1, int32_1, i32);
    col!(9, fields::INT32_2, int32_2, i32);
    col!(10, fields::INT32_3, int32_3, i32);
    col!(11, fields::INT32_4, int32_4, i32);
    col!(12, fields::UINT32_1, uint32_1, i64);
    col!(13, fields::UINT32_2, uint32_2, i64);
    col!(14, fields::UINT32_3, uint32_3, i64);
    col!(15, fields::UINT32_4, uint32_4, i64);
    col!(16, fields::UUID_1, uuid_1, uuid);
    col!(17, fields::UUID_2, uuid_2, uuid);
    col!(18, fields::UUID_3, uuid_3, uuid);
    col!(19, fields::UUID_4, uuid_4, uuid);
    col!(20, fields::STRING64_1, string64_1, text);
    col!(21, fields::STRING64_2, string64_2, text);
    col!(22, fields::STRING64_3, string64_3, text);
    col!(23, fields::STRING64_4, string64_4, text);
    col!(24, fields::STRING64_5, string64_5, text);
    col!(25, fields::STRING64_6, string64_6, text);
    col!(26, fields::ISTRING64_1, istring64_1, text);
    col!(27, fields::ISTRING64_2, istring64_2, text);
    col!(28, fields::TEXT_1, text_1, text);
    col!(29, fields::TEXT_2, text_2, text);
    col!(30, fields::BLOB_1, blob_1, bytes);
    col!(31, fields::BLOB_2, blob_2, bytes);

    Ok(node)
}

/// A public age listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicAge {
    pub instance_uuid: Uuid,
    pub filename: String,
    pub instance_name: String,
    pub user_name: String,
    pub description: String,
    pub sequence: i32,
    pub language: i32,
    /// Players owning the age (children of its AgeOwnersFolder).
    pub owners: u32,
}

/// Vault graph operations.
pub struct VaultStore;

impl VaultStore {
    /// Persists a new node and returns its index (never 0 on success).
    ///
    /// Creation and modification times are stamped when the caller left
    /// them unset.
    pub async fn create(pool: &PgPool, node: &Node) -> Result<u32> {
        let mut node = node.clone();
        let now = chrono::Utc::now().timestamp().max(0) as u32;
        if !node.has(fields::CREATE_TIME) {
            node.set_create_time(now);
        }
        if !node.has(fields::MODIFY_TIME) {
            node.set_modify_time(now);
        }

        let (sql, bits) = insert_sql(node.fields);
        let mut query = sqlx::query(&sql);
        for bit in bits {
            query = bind_field(query, &node, bit);
        }
        let row = query.fetch_one(pool).await.context(DatabaseSnafu)?;
        let idx: i64 = row.try_get(0).context(DatabaseSnafu)?;
        Ok(idx as u32)
    }

    /// Fetches a full node; returns the null node when the row is absent.
    pub async fn fetch(pool: &PgPool, idx: u32) -> Result<Node> {
        let sql = format!("{SELECT_ALL_COLUMNS} WHERE idx=$1");
        let row = sqlx::query(&sql)
            .bind(idx as i64)
            .fetch_optional(pool)
            .await
            .context(DatabaseSnafu)?;
        match row {
            Some(row) => node_from_row(&row),
            None => Ok(Node::new()),
        }
    }

    /// Applies a partial update: only the fields present in the node's
    /// mask are written, and `ModifyTime` is stamped to now.
    ///
    /// Returns false when the row does not exist. Broadcasting the
    /// change is the caller's responsibility.
    pub async fn update(pool: &PgPool, node: &Node) -> Result<bool> {
        let mut node = node.clone();
        node.set_modify_time(chrono::Utc::now().timestamp().max(0) as u32);

        let (sql, bits) = update_sql(node.fields);
        let mut query = sqlx::query(&sql);
        for bit in bits {
            query = bind_field(query, &node, bit);
        }
        let done = query
            .bind(node.node_idx as i64)
            .execute(pool)
            .await
            .context(DatabaseSnafu)?;
        Ok(done.rows_affected() > 0)
    }

    /// Inserts an edge idempotently. Returns true iff a new edge was
    /// created; the caller broadcasts `NodeAdded` in that case.
    pub async fn ref_node(pool: &PgPool, parent: u32, child: u32, owner: u32) -> Result<bool> {
        let done = sqlx::query(
            "INSERT INTO vault.\"NodeRefs\" (\"ParentIdx\", \"ChildIdx\", \"OwnerIdx\") \
             VALUES ($1, $2, $3) ON CONFLICT (\"ParentIdx\", \"ChildIdx\") DO NOTHING",
        )
        .bind(parent as i64)
        .bind(child as i64)
        .bind(owner as i64)
        .execute(pool)
        .await
        .context(DatabaseSnafu)?;
        Ok(done.rows_affected() > 0)
    }

    /// Removes an edge. Returns true iff an edge was removed; the caller
    /// broadcasts `NodeRemoved` in that case.
    pub async fn unref_node(pool: &PgPool, parent: u32, child: u32) -> Result<bool> {
        let done = sqlx::query(
            "DELETE FROM vault.\"NodeRefs\" WHERE \"ParentIdx\"=$1 AND \"ChildIdx\"=$2",
        )
        .bind(parent as i64)
        .bind(child as i64)
        .execute(pool)
        .await
        .context(DatabaseSnafu)?;
        Ok(done.rows_affected() > 0)
    }

    /// True iff a direct parent → child edge exists.
    pub async fn has_node(pool: &PgPool, parent: u32, child: u32) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM vault.\"NodeRefs\" WHERE \"ParentIdx\"=$1 AND \"ChildIdx\"=$2",
        )
        .bind(parent as i64)
        .bind(child as i64)
        .fetch_optional(pool)
        .await
        .context(DatabaseSnafu)?;
        Ok(row.is_some())
    }

    /// Links a node under the recipient's Inbox, attributed to the
    /// sender. Returns the new edge, or the zero edge when the recipient
    /// has no inbox or the link already existed.
    pub async fn send_node(
        pool: &PgPool,
        node_idx: u32,
        to_player: u32,
        from_player: u32,
    ) -> Result<NodeRef> {
        let inbox = match Self::find_folder(pool, to_player, StandardNode::InboxFolder).await? {
            Some(inbox) => inbox,
            None => {
                tracing::warn!(to_player, "Send target has no inbox folder");
                return Ok(NodeRef::default());
            }
        };
        if Self::ref_node(pool, inbox, node_idx, from_player).await? {
            Ok(NodeRef::new(inbox, node_idx, from_player))
        } else {
            Ok(NodeRef::default())
        }
    }

    /// Breadth-first edge listing of everything reachable from `root`,
    /// in discovery order. A visited set on child ids keeps accidental
    /// cycles from looping.
    pub async fn fetch_tree(pool: &PgPool, root: u32) -> Result<Vec<NodeRef>> {
        let mut edges = Vec::new();
        let mut visited = std::collections::HashSet::new();
        visited.insert(root);
        let mut frontier: Vec<i64> = vec![root as i64];

        while !frontier.is_empty() {
            let rows = sqlx::query(
                "SELECT \"ParentIdx\", \"ChildIdx\", \"OwnerIdx\" FROM vault.\"NodeRefs\" \
                 WHERE \"ParentIdx\" = ANY($1) ORDER BY \"ParentIdx\", \"ChildIdx\"",
            )
            .bind(&frontier)
            .fetch_all(pool)
            .await
            .context(DatabaseSnafu)?;

            frontier.clear();
            for row in rows {
                let parent: i64 = row.try_get(0).context(DatabaseSnafu)?;
                let child: i64 = row.try_get(1).context(DatabaseSnafu)?;
                let owner: i64 = row.try_get(2).context(DatabaseSnafu)?;
                edges.push(NodeRef::new(parent as u32, child as u32, owner as u32));
                if visited.insert(child as u32) {
                    frontier.push(child);
                }
            }
        }
        Ok(edges)
    }

    /// Finds every node whose fields are a superset of the template's
    /// set fields, comparing `IString64_*` case-insensitively.
    pub async fn find_nodes(pool: &PgPool, template: &Node) -> Result<Vec<u32>> {
        if template.is_null() {
            return Ok(Vec::new());
        }
        let (sql, bits) = find_sql(template.fields);
        let mut query = sqlx::query(&sql);
        for bit in bits {
            query = bind_field(query, template, bit);
        }
        let rows = query.fetch_all(pool).await.context(DatabaseSnafu)?;
        let mut found = Vec::with_capacity(rows.len());
        for row in rows {
            let idx: i64 = row.try_get(0).context(DatabaseSnafu)?;
            found.push(idx as u32);
        }
        Ok(found)
    }

    /// Resolves a canonical child folder via `vault.find_folder`.
    pub async fn find_folder(
        pool: &PgPool,
        parent: u32,
        folder: StandardNode,
    ) -> Result<Option<u32>> {
        let row = sqlx::query("SELECT idx FROM vault.find_folder($1, $2)")
            .bind(parent as i64)
            .bind(folder.raw())
            .fetch_optional(pool)
            .await
            .context(DatabaseSnafu)?;
        match row {
            Some(row) => {
                let idx: i64 = row.try_get(0).context(DatabaseSnafu)?;
                Ok(Some(idx as u32))
            }
            None => Ok(None),
        }
    }

    /// Lists public instances of one age filename, newest first.
    pub async fn find_public_ages(pool: &PgPool, filename: &str) -> Result<Vec<PublicAge>> {
        let sql = format!(
            "{SELECT_ALL_COLUMNS} WHERE \"NodeType\"=$1 AND \"String64_2\"=$2 \
             AND \"Int32_2\"=1 ORDER BY \"ModifyTime\" DESC LIMIT 50"
        );
        let rows = sqlx::query(&sql)
            .bind(NodeType::AgeInfo.raw())
            .bind(filename)
            .fetch_all(pool)
            .await
            .context(DatabaseSnafu)?;

        let mut ages = Vec::with_capacity(rows.len());
        for row in rows {
            let info = node_from_row(&row)?;
            let owners = match Self::find_folder(pool, info.node_idx, StandardNode::AgeOwnersFolder)
                .await?
            {
                Some(folder) => Self::count_children(pool, folder).await?,
                None => 0,
            };
            ages.push(PublicAge {
                instance_uuid: info.uuid_1,
                filename: info.string64_2.clone(),
                instance_name: info.string64_3.clone(),
                user_name: info.string64_4.clone(),
                description: info.text_1.clone(),
                sequence: info.int32_1,
                language: info.int32_3,
                owners,
            });
        }
        Ok(ages)
    }

    /// Flips an AgeInfo node's public flag. Returns true when a row
    /// changed; the caller broadcasts the node.
    pub async fn set_public(pool: &PgPool, node_idx: u32, public: bool) -> Result<bool> {
        let now = chrono::Utc::now().timestamp().max(0);
        let done = sqlx::query(
            "UPDATE vault.\"Nodes\" SET \"ModifyTime\"=$1, \"Int32_2\"=$2 \
             WHERE idx=$3 AND \"NodeType\"=$4",
        )
        .bind(now)
        .bind(i32::from(public))
        .bind(node_idx as i64)
        .bind(NodeType::AgeInfo.raw())
        .execute(pool)
        .await
        .context(DatabaseSnafu)?;
        Ok(done.rows_affected() > 0)
    }

    /// Number of direct children of a node.
    pub async fn count_children(pool: &PgPool, parent: u32) -> Result<u32> {
        let row = sqlx::query("SELECT COUNT(*) FROM vault.\"NodeRefs\" WHERE \"ParentIdx\"=$1")
            .bind(parent as i64)
            .fetch_one(pool)
            .await
            .context(DatabaseSnafu)?;
        let count: i64 = row.try_get(0).context(DatabaseSnafu)?;
        Ok(count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sql_follows_mask() {
        let mut node = Node::new();
        node.set_node_type(NodeType::Folder.raw());
        node.set_int32_1(StandardNode::InboxFolder.raw());
        node.set_string64_1("Inbox");

        let (sql, bits) = insert_sql(node.fields);
        assert_eq!(
            sql,
            "INSERT INTO vault.\"Nodes\" (\"NodeType\", \"Int32_1\", \"String64_1\") \
             VALUES ($1, $2, $3) RETURNING idx"
        );
        assert_eq!(bits, vec![fields::NODE_TYPE, fields::INT32_1, fields::STRING64_1]);
    }

    #[test]
    fn test_insert_sql_never_writes_idx() {
        let mut node = Node::new();
        node.set_node_idx(99);
        node.set_int32_1(1);
        let (sql, bits) = insert_sql(node.fields);
        assert!(!sql.contains("idx,"));
        assert!(!bits.contains(&fields::NODE_IDX));
    }

    #[test]
    fn test_update_sql_binds_where_last() {
        let mut node = Node::new();
        node.set_node_idx(42);
        node.set_modify_time(5);
        node.set_uint32_1(7);

        let (sql, bits) = update_sql(node.fields);
        assert_eq!(
            sql,
            "UPDATE vault.\"Nodes\" SET \"ModifyTime\"=$1, \"Uint32_1\"=$2 WHERE idx=$3"
        );
        assert_eq!(bits, vec![fields::MODIFY_TIME, fields::UINT32_1]);
    }

    #[test]
    fn test_find_sql_lowercases_istrings() {
        let mut template = Node::new();
        template.set_node_type(NodeType::Player.raw());
        template.set_istring64_1("Zandi");

        let (sql, bits) = find_sql(template.fields);
        assert_eq!(
            sql,
            "SELECT idx FROM vault.\"Nodes\" WHERE \"NodeType\"=$1 \
             AND LOWER(\"IString64_1\")=LOWER($2) ORDER BY idx"
        );
        assert_eq!(bits, vec![fields::NODE_TYPE, fields::ISTRING64_1]);
    }

    #[test]
    fn test_field_table_covers_every_bit() {
        let mut mask = 0u64;
        for (bit, _, _) in FIELD_COLUMNS {
            assert_eq!(mask & bit, 0, "duplicate bit {bit:#x}");
            mask |= bit;
        }
        assert_eq!(mask, fields::ALL);
    }
}
