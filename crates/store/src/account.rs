//! Account and player roster storage.

use snafu::ResultExt;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use relto_types::challenge::{buggy_hash_password, hash_password, use_email_auth};
use relto_types::{NodeType, PlayerSummary, ShaHash};

use crate::error::{DatabaseSnafu, Result, StoreError};

/// One row of `auth."Accounts"`, as the login path needs it.
#[derive(Debug, Clone)]
pub struct AccountRow {
    pub acct_uuid: Uuid,
    pub pass_hash: ShaHash,
    pub acct_flags: u32,
    pub billing_type: u32,
}

/// Account and player operations.
pub struct AccountStore;

impl AccountStore {
    /// Creates an account. Returns false when the login already exists
    /// (case-insensitive).
    ///
    /// Logins matching the email heuristic store the legacy concatenated
    /// hash; everything else stores a plain SHA-1 of the password.
    pub async fn add_account(pool: &PgPool, login: &str, password: &str) -> Result<bool> {
        let existing = sqlx::query(
            "SELECT idx, \"AcctUuid\" FROM auth.\"Accounts\" WHERE LOWER(\"Login\")=LOWER($1)",
        )
        .bind(login)
        .fetch_optional(pool)
        .await
        .context(DatabaseSnafu)?;
        if let Some(row) = existing {
            let idx: i64 = row.try_get(0).context(DatabaseSnafu)?;
            let uuid: Uuid = row.try_get(1).context(DatabaseSnafu)?;
            tracing::warn!(login, idx, %uuid, "Account already exists");
            return Ok(false);
        }

        let pass_hash = if use_email_auth(login) {
            buggy_hash_password(login, password)
        } else {
            hash_password(password)
        };

        sqlx::query(
            "INSERT INTO auth.\"Accounts\" \
             (\"AcctUuid\", \"PassHash\", \"Login\", \"AcctFlags\", \"BillingType\") \
             VALUES ($1, $2, $3, 0, 1)",
        )
        .bind(Uuid::new_v4())
        .bind(pass_hash.to_string())
        .bind(login)
        .execute(pool)
        .await
        .context(DatabaseSnafu)?;
        Ok(true)
    }

    /// Looks up an account by login for authentication.
    ///
    /// Returns `None` for zero matches *and* for multiple matches: a
    /// login matching several rows means corrupt data, and neither case
    /// may be distinguishable to the client.
    pub async fn lookup_login(pool: &PgPool, login: &str) -> Result<Option<AccountRow>> {
        let rows = sqlx::query(
            "SELECT \"PassHash\", \"AcctUuid\", \"AcctFlags\", \"BillingType\" \
             FROM auth.\"Accounts\" WHERE LOWER(\"Login\")=LOWER($1)",
        )
        .bind(login)
        .fetch_all(pool)
        .await
        .context(DatabaseSnafu)?;

        match rows.len() {
            0 => Ok(None),
            1 => {
                let row = &rows[0];
                let hash_text: String = row.try_get(0).context(DatabaseSnafu)?;
                let pass_hash = ShaHash::from_hex(&hash_text).ok_or_else(|| {
                    StoreError::Corrupt {
                        table: "auth.Accounts",
                        message: format!("bad password hash for login {login}"),
                    }
                })?;
                let acct_flags: i64 = row.try_get(2).context(DatabaseSnafu)?;
                let billing_type: i64 = row.try_get(3).context(DatabaseSnafu)?;
                Ok(Some(AccountRow {
                    acct_uuid: row.try_get(1).context(DatabaseSnafu)?,
                    pass_hash,
                    acct_flags: acct_flags as u32,
                    billing_type: billing_type as u32,
                }))
            }
            count => {
                tracing::error!(login, count, "Login matches multiple accounts");
                Ok(None)
            }
        }
    }

    /// The account's player roster.
    pub async fn player_roster(pool: &PgPool, acct_uuid: Uuid) -> Result<Vec<PlayerSummary>> {
        let rows = sqlx::query(
            "SELECT \"PlayerIdx\", \"PlayerName\", \"AvatarShape\", \"Explorer\" \
             FROM auth.\"Players\" WHERE \"AcctUuid\"=$1",
        )
        .bind(acct_uuid)
        .fetch_all(pool)
        .await
        .context(DatabaseSnafu)?;

        let mut roster = Vec::with_capacity(rows.len());
        for row in rows {
            let player_id: i64 = row.try_get(0).context(DatabaseSnafu)?;
            let explorer: i64 = row.try_get(3).context(DatabaseSnafu)?;
            roster.push(PlayerSummary {
                player_id: player_id as u32,
                player_name: row.try_get(1).context(DatabaseSnafu)?,
                avatar_shape: row.try_get(2).context(DatabaseSnafu)?,
                explorer: explorer as u32,
            });
        }
        Ok(roster)
    }

    /// Fetches one player of an account, for SetPlayer validation.
    ///
    /// Multiple matches mean corrupt data and are reported as an error.
    pub async fn get_player(
        pool: &PgPool,
        acct_uuid: Uuid,
        player_id: u32,
    ) -> Result<Option<PlayerSummary>> {
        let rows = sqlx::query(
            "SELECT \"PlayerName\", \"AvatarShape\", \"Explorer\" \
             FROM auth.\"Players\" WHERE \"AcctUuid\"=$1 AND \"PlayerIdx\"=$2",
        )
        .bind(acct_uuid)
        .bind(player_id as i64)
        .fetch_all(pool)
        .await
        .context(DatabaseSnafu)?;

        match rows.len() {
            0 => Ok(None),
            1 => {
                let row = &rows[0];
                let explorer: i64 = row.try_get(2).context(DatabaseSnafu)?;
                Ok(Some(PlayerSummary {
                    player_id,
                    player_name: row.try_get(0).context(DatabaseSnafu)?,
                    avatar_shape: row.try_get(1).context(DatabaseSnafu)?,
                    explorer: explorer as u32,
                }))
            }
            count => Err(StoreError::Corrupt {
                table: "auth.Players",
                message: format!("player {player_id} matches {count} rows"),
            }),
        }
    }

    /// True when any account owns a player with this exact name.
    pub async fn player_name_exists(pool: &PgPool, player_name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT idx FROM auth.\"Players\" WHERE \"PlayerName\"=$1")
            .bind(player_name)
            .fetch_optional(pool)
            .await
            .context(DatabaseSnafu)?;
        Ok(row.is_some())
    }

    /// True when the account owns the given player id.
    pub async fn player_exists(pool: &PgPool, acct_uuid: Uuid, player_id: u32) -> Result<bool> {
        let row = sqlx::query(
            "SELECT idx FROM auth.\"Players\" WHERE \"AcctUuid\"=$1 AND \"PlayerIdx\"=$2",
        )
        .bind(acct_uuid)
        .bind(player_id as i64)
        .fetch_optional(pool)
        .await
        .context(DatabaseSnafu)?;
        Ok(row.is_some())
    }

    /// Inserts the roster row for a newly built player.
    pub async fn insert_player(
        pool: &PgPool,
        acct_uuid: Uuid,
        player: &PlayerSummary,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth.\"Players\" \
             (\"AcctUuid\", \"PlayerIdx\", \"PlayerName\", \"AvatarShape\", \"Explorer\") \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(acct_uuid)
        .bind(player.player_id as i64)
        .bind(&player.player_name)
        .bind(&player.avatar_shape)
        .bind(player.explorer as i64)
        .execute(pool)
        .await
        .context(DatabaseSnafu)?;
        Ok(())
    }

    /// Deletes a player's roster row.
    pub async fn delete_player(pool: &PgPool, player_id: u32) -> Result<()> {
        sqlx::query("DELETE FROM auth.\"Players\" WHERE \"PlayerIdx\"=$1")
            .bind(player_id as i64)
            .execute(pool)
            .await
            .context(DatabaseSnafu)?;
        Ok(())
    }

    /// Finds the PlayerInfo node index for a player id.
    pub async fn find_player_info(pool: &PgPool, player_id: u32) -> Result<Option<u32>> {
        let row = sqlx::query(
            "SELECT idx FROM vault.\"Nodes\" WHERE \"Uint32_1\"=$1 AND \"NodeType\"=$2",
        )
        .bind(player_id as i64)
        .bind(NodeType::PlayerInfo.raw())
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

    /// Removes every incoming reference to a node. Used when deleting a
    /// player to unlink its PlayerInfo from all lists; the node itself
    /// and the rest of the subtree stay behind, orphaned.
    pub async fn remove_incoming_refs(pool: &PgPool, child: u32) -> Result<u64> {
        let done = sqlx::query("DELETE FROM vault.\"NodeRefs\" WHERE \"ChildIdx\"=$1")
            .bind(child as i64)
            .execute(pool)
            .await
            .context(DatabaseSnafu)?;
        Ok(done.rows_affected())
    }

    /// Reads an account's flag word by login.
    pub async fn account_flags(pool: &PgPool, login: &str) -> Result<Option<u32>> {
        let rows = sqlx::query(
            "SELECT \"AcctFlags\" FROM auth.\"Accounts\" WHERE LOWER(\"Login\")=LOWER($1)",
        )
        .bind(login)
        .fetch_all(pool)
        .await
        .context(DatabaseSnafu)?;
        match rows.len() {
            1 => {
                let flags: i64 = rows[0].try_get(0).context(DatabaseSnafu)?;
                Ok(Some(flags as u32))
            }
            count => {
                if count > 1 {
                    tracing::error!(login, count, "Login matches multiple accounts");
                }
                Ok(None)
            }
        }
    }

    /// Writes an account's flag word by login.
    pub async fn set_account_flags(pool: &PgPool, login: &str, flags: u32) -> Result<()> {
        sqlx::query(
            "UPDATE auth.\"Accounts\" SET \"AcctFlags\"=$2 WHERE LOWER(\"Login\")=LOWER($1)",
        )
        .bind(login)
        .bind(flags as i64)
        .execute(pool)
        .await
        .context(DatabaseSnafu)?;
        Ok(())
    }

    /// Updates a player's PlayerInfo location (display name and instance
    /// uuid) without touching the online flag, returning the indexes of
    /// every node touched so the caller can broadcast them.
    pub async fn set_player_location(
        pool: &PgPool,
        player_id: u32,
        age_name: &str,
        age_uuid: Uuid,
    ) -> Result<Vec<u32>> {
        let rows = sqlx::query(
            "UPDATE vault.\"Nodes\" SET \"String64_1\"=$1, \"Uuid_1\"=$2 \
             WHERE \"NodeType\"=$3 AND \"Uint32_1\"=$4 RETURNING idx",
        )
        .bind(age_name)
        .bind(age_uuid)
        .bind(NodeType::PlayerInfo.raw())
        .bind(player_id as i64)
        .fetch_all(pool)
        .await
        .context(DatabaseSnafu)?;

        let mut touched = Vec::with_capacity(rows.len());
        for row in rows {
            let idx: i64 = row.try_get(0).context(DatabaseSnafu)?;
            touched.push(idx as u32);
        }
        Ok(touched)
    }

    /// Updates a player's PlayerInfo presence fields, returning the
    /// indexes of every node touched so the caller can broadcast them.
    ///
    /// `age_name`/`age_uuid` describe where the player now is; an
    /// offline player gets `online = false` with empty location.
    pub async fn set_player_presence(
        pool: &PgPool,
        player_id: u32,
        online: bool,
        age_name: &str,
        age_uuid: Uuid,
    ) -> Result<Vec<u32>> {
        let rows = sqlx::query(
            "UPDATE vault.\"Nodes\" SET \"Int32_1\"=$1, \"String64_1\"=$2, \"Uuid_1\"=$3 \
             WHERE \"NodeType\"=$4 AND \"Uint32_1\"=$5 RETURNING idx",
        )
        .bind(i32::from(online))
        .bind(age_name)
        .bind(age_uuid)
        .bind(NodeType::PlayerInfo.raw())
        .bind(player_id as i64)
        .fetch_all(pool)
        .await
        .context(DatabaseSnafu)?;

        let mut touched = Vec::with_capacity(rows.len());
        for row in rows {
            let idx: i64 = row.try_get(0).context(DatabaseSnafu)?;
            touched.push(idx as u32);
        }
        Ok(touched)
    }
}
