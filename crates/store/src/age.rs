//! Age instance registry: `game."Servers"` routing rows.

use snafu::ResultExt;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{DatabaseSnafu, Result};

/// One `game."Servers"` row binding an age instance to its game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRow {
    /// Row index, which doubles as the MCP id.
    pub mcp_id: u32,
    pub age_uuid: Uuid,
    pub age_filename: String,
    pub display_name: String,
    /// Vault index of the Age node, 0 until the age tree exists.
    pub age_idx: u32,
    /// Vault index of the instance SDL node, 0 when none.
    pub sdl_idx: u32,
    pub temporary: bool,
}

fn row_to_server(row: &sqlx::postgres::PgRow) -> Result<ServerRow> {
    let mcp_id: i64 = row.try_get(0).context(DatabaseSnafu)?;
    let age_idx: i64 = row.try_get(4).context(DatabaseSnafu)?;
    let sdl_idx: i64 = row.try_get(5).context(DatabaseSnafu)?;
    Ok(ServerRow {
        mcp_id: mcp_id as u32,
        age_uuid: row.try_get(1).context(DatabaseSnafu)?,
        age_filename: row.try_get(2).context(DatabaseSnafu)?,
        display_name: row.try_get(3).context(DatabaseSnafu)?,
        age_idx: age_idx as u32,
        sdl_idx: sdl_idx as u32,
        temporary: row.try_get(6).context(DatabaseSnafu)?,
    })
}

const SELECT_SERVER: &str = "SELECT idx, \"AgeUuid\", \"AgeFilename\", \"DisplayName\", \
    \"AgeIdx\", \"SdlIdx\", \"Temporary\" FROM game.\"Servers\"";

/// Routing-row operations.
pub struct AgeStore;

impl AgeStore {
    /// Finds the routing row for an instance, tolerating duplicates:
    /// more than one match is logged and the first row wins.
    pub async fn find_by_uuid(pool: &PgPool, age_uuid: Uuid) -> Result<Option<ServerRow>> {
        let sql = format!("{SELECT_SERVER} WHERE \"AgeUuid\"=$1 ORDER BY idx");
        let rows = sqlx::query(&sql)
            .bind(age_uuid)
            .fetch_all(pool)
            .await
            .context(DatabaseSnafu)?;
        if rows.len() > 1 {
            tracing::warn!(%age_uuid, count = rows.len(), "Age matched multiple server rows");
        }
        match rows.first() {
            Some(row) => Ok(Some(row_to_server(row)?)),
            None => Ok(None),
        }
    }

    /// Inserts a temporary routing row for an instance with no registered
    /// server yet. The display name starts as the filename.
    pub async fn insert_temporary(pool: &PgPool, age_uuid: Uuid, filename: &str) -> Result<ServerRow> {
        let row = sqlx::query(
            "INSERT INTO game.\"Servers\" \
             (\"AgeUuid\", \"AgeFilename\", \"DisplayName\", \"AgeIdx\", \"SdlIdx\", \"Temporary\") \
             VALUES ($1, $2, $2, 0, 0, TRUE) \
             RETURNING idx, \"AgeUuid\", \"AgeFilename\", \"DisplayName\", \"AgeIdx\", \"SdlIdx\", \
             \"Temporary\"",
        )
        .bind(age_uuid)
        .bind(filename)
        .fetch_one(pool)
        .await
        .context(DatabaseSnafu)?;
        row_to_server(&row)
    }

    /// Finds the MCP id of the server owning an SDL node, if any. Used
    /// by the update arbitration path.
    pub async fn find_mcp_by_sdl(pool: &PgPool, sdl_idx: u32) -> Result<Option<u32>> {
        let row = sqlx::query("SELECT idx FROM game.\"Servers\" WHERE \"SdlIdx\"=$1")
            .bind(sdl_idx as i64)
            .fetch_optional(pool)
            .await
            .context(DatabaseSnafu)?;
        match row {
            Some(row) => {
                let mcp_id: i64 = row.try_get(0).context(DatabaseSnafu)?;
                Ok(Some(mcp_id as u32))
            }
            None => Ok(None),
        }
    }
}
