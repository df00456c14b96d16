//! Synchronized Description Language state for the Relto auth daemon.
//!
//! SDL state is schema-driven: a read-only [`DescriptorDb`] catalog maps
//! age filenames to [`StateDescriptor`]s, and a [`State`] is one instance
//! of a descriptor: ordered simple and state-descriptor variables with
//! flags, timestamps, and typed value arrays. States persist as
//! length-prefixed binary blobs parsed against the catalog.
//!
//! Populating the catalog from on-disk `.sdl` files is the loader's
//! problem; this crate only consumes registered descriptors.

pub mod descriptor;
pub mod state;

pub use descriptor::{DescriptorDb, StateDescriptor, VarDescriptor, VarKind};
pub use state::{SdlError, State, UnifiedTime, Values, Variable};
