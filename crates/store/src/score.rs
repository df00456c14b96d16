//! Score ledger storage.
//!
//! The balance-changing operations delegate to SQL functions
//! (`auth.create_score`, `auth.add_score_points`,
//! `auth.transfer_score_points`) so the clamp-to-zero rules live next to
//! the data; this module only gates score types and shapes the results.

use snafu::ResultExt;
use sqlx::{PgPool, Row};

use relto_types::StandardNode;

use crate::error::{DatabaseSnafu, Result};
use crate::vault::VaultStore;

/// Score type discriminator, stable wire/database values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ScoreType {
    /// Settable only; add and transfer are rejected.
    Fixed = 0,
    /// Add-only; never goes negative.
    Accumulative = 1,
    /// Add-only; may go negative.
    Golf = 2,
}

impl ScoreType {
    /// Decodes a database value.
    pub const fn from_raw(value: i32) -> Option<Self> {
        Some(match value {
            0 => ScoreType::Fixed,
            1 => ScoreType::Accumulative,
            2 => ScoreType::Golf,
            _ => return None,
        })
    }

    /// True when a delta on this type may take the balance negative.
    pub const fn allows_negative(self) -> bool {
        matches!(self, ScoreType::Golf)
    }
}

/// One `auth."Scores"` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRow {
    pub score_id: u32,
    pub owner: u32,
    pub create_time: u32,
    pub score_type: i32,
    pub points: i32,
}

/// Score ledger operations.
pub struct ScoreStore;

impl ScoreStore {
    /// Creates a score via `auth.create_score`. Returns `None` when the
    /// `(owner, name)` pair already exists (the function signals with -1).
    pub async fn create(
        pool: &PgPool,
        owner: u32,
        score_type: ScoreType,
        name: &str,
        points: i32,
    ) -> Result<Option<u32>> {
        let row = sqlx::query("SELECT auth.create_score($1, $2, $3, $4)")
            .bind(owner as i64)
            .bind(score_type as i32)
            .bind(name)
            .bind(points)
            .fetch_one(pool)
            .await
            .context(DatabaseSnafu)?;
        let score_id: i64 = row.try_get(0).context(DatabaseSnafu)?;
        if score_id < 0 {
            Ok(None)
        } else {
            Ok(Some(score_id as u32))
        }
    }

    /// Lists an owner's scores under one name.
    pub async fn get_scores(pool: &PgPool, owner: u32, name: &str) -> Result<Vec<ScoreRow>> {
        let rows = sqlx::query(
            "SELECT idx, \"CreateTime\", \"Type\", \"Points\" FROM auth.\"Scores\" \
             WHERE \"OwnerIdx\"=$1 AND \"Name\"=$2",
        )
        .bind(owner as i64)
        .bind(name)
        .fetch_all(pool)
        .await
        .context(DatabaseSnafu)?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            let score_id: i64 = row.try_get(0).context(DatabaseSnafu)?;
            let create_time: i64 = row.try_get(1).context(DatabaseSnafu)?;
            scores.push(ScoreRow {
                score_id: score_id as u32,
                owner,
                create_time: create_time as u32,
                score_type: row.try_get(2).context(DatabaseSnafu)?,
                points: row.try_get(3).context(DatabaseSnafu)?,
            });
        }
        Ok(scores)
    }

    /// Reads one score's type, `None` when the row is missing.
    pub async fn score_type(pool: &PgPool, score_id: u32) -> Result<Option<i32>> {
        let row = sqlx::query("SELECT \"Type\" FROM auth.\"Scores\" WHERE idx=$1")
            .bind(score_id as i64)
            .fetch_optional(pool)
            .await
            .context(DatabaseSnafu)?;
        match row {
            Some(row) => Ok(Some(row.try_get(0).context(DatabaseSnafu)?)),
            None => Ok(None),
        }
    }

    /// Reads two scores' types at once for transfer validation.
    pub async fn score_type_pair(
        pool: &PgPool,
        src: u32,
        dst: u32,
    ) -> Result<Option<(i32, i32)>> {
        let src_type = Self::score_type(pool, src).await?;
        let dst_type = Self::score_type(pool, dst).await?;
        match (src_type, dst_type) {
            (Some(src_type), Some(dst_type)) => Ok(Some((src_type, dst_type))),
            _ => Ok(None),
        }
    }

    /// Applies a delta via `auth.add_score_points`. Clamping on
    /// non-negative types is the function's responsibility.
    pub async fn add_points(
        pool: &PgPool,
        score_id: u32,
        points: i32,
        allow_negative: bool,
    ) -> Result<()> {
        sqlx::query("SELECT auth.add_score_points($1, $2, $3)")
            .bind(score_id as i64)
            .bind(points)
            .bind(allow_negative)
            .execute(pool)
            .await
            .context(DatabaseSnafu)?;
        Ok(())
    }

    /// Moves points via `auth.transfer_score_points`. Returns false when
    /// the function reports an insufficient source balance.
    pub async fn transfer_points(
        pool: &PgPool,
        src: u32,
        dst: u32,
        points: i32,
        allow_negative: bool,
    ) -> Result<bool> {
        let row = sqlx::query("SELECT auth.transfer_score_points($1, $2, $3, $4)")
            .bind(src as i64)
            .bind(dst as i64)
            .bind(points)
            .bind(allow_negative)
            .fetch_one(pool)
            .await
            .context(DatabaseSnafu)?;
        let status: i32 = row.try_get(0).context(DatabaseSnafu)?;
        Ok(status != 0)
    }

    /// Overwrites a Fixed score's balance.
    pub async fn set_points(pool: &PgPool, score_id: u32, points: i32) -> Result<()> {
        sqlx::query("UPDATE auth.\"Scores\" SET \"Points\"=$2 WHERE idx=$1")
            .bind(score_id as i64)
            .bind(points)
            .execute(pool)
            .await
            .context(DatabaseSnafu)?;
        Ok(())
    }

    /// Global top scores under one name.
    pub async fn high_scores(pool: &PgPool, name: &str, max: u32) -> Result<Vec<ScoreRow>> {
        let rows = sqlx::query(
            "SELECT idx, \"OwnerIdx\", \"CreateTime\", \"Type\", \"Points\" \
             FROM auth.\"Scores\" WHERE \"Name\"=$1 \
             ORDER BY \"Points\" DESC LIMIT $2",
        )
        .bind(name)
        .bind(max as i64)
        .fetch_all(pool)
        .await
        .context(DatabaseSnafu)?;
        rows.iter().map(row_with_owner).collect()
    }

    /// Top scores restricted to the owners of an age: owner ids that are
    /// children of the age's AgeOwnersFolder.
    ///
    /// Returns `None` when the owner node has no AgeOwnersFolder, which
    /// the daemon reports as an invalid parameter.
    pub async fn high_scores_for_age(
        pool: &PgPool,
        owner: u32,
        name: &str,
        max: u32,
    ) -> Result<Option<Vec<ScoreRow>>> {
        let folder =
            match VaultStore::find_folder(pool, owner, StandardNode::AgeOwnersFolder).await? {
                Some(folder) => folder,
                None => return Ok(None),
            };

        let rows = sqlx::query(
            "SELECT idx, \"OwnerIdx\", \"CreateTime\", \"Type\", \"Points\" \
             FROM auth.\"Scores\" WHERE \"Name\"=$1 \
             AND \"OwnerIdx\" IN \
             (SELECT \"ChildIdx\" FROM vault.\"NodeRefs\" WHERE \"ParentIdx\"=$2) \
             ORDER BY \"Points\" DESC LIMIT $3",
        )
        .bind(name)
        .bind(folder as i64)
        .bind(max as i64)
        .fetch_all(pool)
        .await
        .context(DatabaseSnafu)?;
        rows.iter().map(row_with_owner).collect::<Result<Vec<_>>>().map(Some)
    }
}

fn row_with_owner(row: &sqlx::postgres::PgRow) -> Result<ScoreRow> {
    let score_id: i64 = row.try_get(0).context(DatabaseSnafu)?;
    let owner: i64 = row.try_get(1).context(DatabaseSnafu)?;
    let create_time: i64 = row.try_get(2).context(DatabaseSnafu)?;
    Ok(ScoreRow {
        score_id: score_id as u32,
        owner: owner as u32,
        create_time: create_time as u32,
        score_type: row.try_get(3).context(DatabaseSnafu)?,
        points: row.try_get(4).context(DatabaseSnafu)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_type_raw_values() {
        assert_eq!(ScoreType::from_raw(0), Some(ScoreType::Fixed));
        assert_eq!(ScoreType::from_raw(1), Some(ScoreType::Accumulative));
        assert_eq!(ScoreType::from_raw(2), Some(ScoreType::Golf));
        assert_eq!(ScoreType::from_raw(3), None);
    }

    #[test]
    fn test_only_golf_allows_negative() {
        assert!(!ScoreType::Fixed.allows_negative());
        assert!(!ScoreType::Accumulative.allows_negative());
        assert!(ScoreType::Golf.allows_negative());
    }
}
