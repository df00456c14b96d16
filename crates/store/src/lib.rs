//! PostgreSQL-backed stores for the Relto auth daemon.
//!
//! All persistent state lives in the `auth`, `vault`, and `game` schemas.
//! The stores are stateless structs whose operations take the connection
//! pool explicitly; the daemon owns the pool and is the only writer, so
//! the pool is capped at a single connection and re-establishes it lazily
//! after a drop.
//!
//! Schema creation and migration are the deployment scripts' concern;
//! this crate assumes the tables and SQL functions already exist.

pub mod account;
pub mod age;
pub mod db;
pub mod error;
pub mod global_sdl;
pub mod score;
pub mod templates;
pub mod vault;

pub use account::{AccountRow, AccountStore};
pub use age::{AgeStore, ServerRow};
pub use db::connect;
pub use error::{Result, StoreError};
pub use global_sdl::{GlobalStates, GlobalUpdate};
pub use score::{ScoreRow, ScoreStore, ScoreType};
pub use templates::{AgeSpec, TemplateStore};
pub use vault::{PublicAge, VaultStore};
