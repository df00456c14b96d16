//! Connection pool setup.

use snafu::ResultExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{DatabaseSnafu, Result};

/// Opens the daemon's connection pool.
///
/// The pool is capped at one connection: the daemon worker is the single
/// writer, and serializing every statement through one session is what
/// makes partial updates and broadcast ordering sound. A dropped
/// connection is re-established lazily before the next statement.
pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(1)
        .connect(url)
        .await
        .context(DatabaseSnafu)
}
