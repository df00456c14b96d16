//! Core types for the Relto auth daemon.
//!
//! This crate provides the foundational types used throughout the daemon:
//! - The `NetResult` status code carried in every reply
//! - Vault node and folder type discriminators
//! - Account flags and player identity records
//! - SHA-1 challenge hashing, including the legacy wire-compatible variants

pub mod account;
pub mod challenge;
pub mod node_kind;
pub mod result;

pub use account::{AccountFlags, PlayerSummary, sanitize_avatar_shape};
pub use challenge::{ShaHash, buggy_hash_login, buggy_hash_password, hash_password, use_email_auth};
pub use node_kind::{NodeType, StandardNode};
pub use result::NetResult;
