//! Store error types.

use snafu::{Location, Snafu};

/// Unified error type for store operations.
///
/// The daemon maps any of these to an `InternalError` reply after one
/// diagnostic log; the variants exist for the log line, not for client
/// visibility.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// A database round-trip failed.
    #[snafu(display("Database error at {location}: {source}"))]
    Database {
        /// The underlying sqlx error.
        source: sqlx::Error,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// A persisted SDL blob failed to decode or re-encode.
    #[snafu(display("SDL codec error at {location}: {source}"))]
    Sdl {
        /// The underlying SDL error.
        source: relto_sdl::SdlError,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// A persisted value violated its own encoding (bad hex, bad base64).
    #[snafu(display("Corrupt row in {table}: {message}"))]
    Corrupt {
        /// Table the bad row came from.
        table: &'static str,
        /// What was wrong with it.
        message: String,
    },
}

/// Result type for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
