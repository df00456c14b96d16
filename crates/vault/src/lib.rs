//! Vault node records for the Relto auth daemon.
//!
//! The vault is a persistent graph of sparse typed records linked by
//! parent/child references. This crate provides the record itself:
//! - [`fields`]: the presence bitmask, one bit per field in ordinal order
//! - [`Node`]: the sparse record with mask-maintaining setters
//! - [`NodeRef`]: a directed edge attributed to an owning player
//! - [`wire`]: the deterministic ordinal serializer
//!
//! Storage and graph operations live in `relto-store`; this crate is
//! purely the in-memory and wire representation.

pub mod fields;
pub mod node;
pub mod reference;
pub mod wire;

pub use node::Node;
pub use reference::NodeRef;
pub use wire::{WireError, read_node, write_node};
