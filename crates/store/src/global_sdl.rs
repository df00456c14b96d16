//! Global SDL state cache with write-through persistence.
//!
//! Every age with global state has one `vault."GlobalStates"` row:
//! descriptor name plus a base64-encoded state blob. The cache is loaded
//! once at daemon start and only the daemon worker touches it, so no
//! lock is needed; every mutation re-serializes and writes back before
//! returning.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use snafu::ResultExt;
use sqlx::{PgPool, Row};

use relto_sdl::{DescriptorDb, SdlError, State};

use crate::error::{DatabaseSnafu, Result, SdlSnafu, StoreError};

/// Outcome of a global variable update, before it becomes a reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalUpdate {
    /// The value was applied and persisted.
    Applied,
    /// No state is registered for the age.
    StateNotFound,
    /// The state has no variable with that name.
    VarNotFound,
    /// The variable's type cannot be carried by a remote update.
    NotSupported,
}

/// In-memory registry of per-age global SDL states.
pub struct GlobalStates {
    /// Keyed by lowercased age filename.
    states: HashMap<String, State>,
}

impl GlobalStates {
    /// Loads every persisted global state, parsing each blob against the
    /// catalog. Rows whose descriptor is missing from the catalog are
    /// logged and skipped rather than failing startup.
    pub async fn load(pool: &PgPool, catalog: &DescriptorDb) -> Result<Self> {
        let rows = sqlx::query("SELECT \"Descriptor\", \"SdlBlob\" FROM vault.\"GlobalStates\"")
            .fetch_all(pool)
            .await
            .context(DatabaseSnafu)?;

        let mut states = HashMap::with_capacity(rows.len());
        for row in rows {
            let descriptor: String = row.try_get(0).context(DatabaseSnafu)?;
            let encoded: String = row.try_get(1).context(DatabaseSnafu)?;
            let blob = BASE64.decode(encoded.as_bytes()).map_err(|err| StoreError::Corrupt {
                table: "vault.GlobalStates",
                message: format!("bad base64 for {descriptor}: {err}"),
            })?;
            match State::from_blob(catalog, &blob) {
                Ok(state) => {
                    states.insert(descriptor.to_lowercase(), state);
                }
                Err(SdlError::DescriptorNotFound { name }) => {
                    tracing::warn!(descriptor = %name, "No catalog descriptor for global state; skipping");
                }
                Err(err) => return Err(err).context(SdlSnafu),
            }
        }
        tracing::info!(count = states.len(), "Loaded global SDL states");
        Ok(GlobalStates { states })
    }

    /// Creates an empty registry, for ages with no persisted state.
    pub fn empty() -> Self {
        GlobalStates { states: HashMap::new() }
    }

    /// The global state for an age, if one is registered.
    pub fn get(&self, age_filename: &str) -> Option<&State> {
        self.states.get(&age_filename.to_lowercase())
    }

    /// Number of registered states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// True when no state is registered.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Drops every cached state. Used at shutdown.
    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Applies one variable update to an age's global state and writes
    /// the re-serialized blob through to the database.
    ///
    /// Notifying the game server is the caller's concern; persistence
    /// failure is returned as an error and leaves the cache updated,
    /// matching the write-through-after-mutate ordering.
    pub async fn update_var(
        &mut self,
        pool: &PgPool,
        catalog: &DescriptorDb,
        age_filename: &str,
        var_name: &str,
        value: &str,
    ) -> Result<GlobalUpdate> {
        let key = age_filename.to_lowercase();
        let state = match self.states.get_mut(&key) {
            Some(state) => state,
            None => return Ok(GlobalUpdate::StateNotFound),
        };

        match state.set_by_name(catalog, var_name, value) {
            Ok(()) => {}
            Err(SdlError::VarNotFound { .. }) => return Ok(GlobalUpdate::VarNotFound),
            Err(SdlError::NotSupported { .. }) => return Ok(GlobalUpdate::NotSupported),
            Err(err) => return Err(err).context(SdlSnafu),
        }

        let blob = state.to_blob();
        let done = sqlx::query(
            "UPDATE vault.\"GlobalStates\" SET \"SdlBlob\"=$2 WHERE \"Descriptor\"=$1",
        )
        .bind(age_filename)
        .bind(BASE64.encode(&blob))
        .execute(pool)
        .await
        .context(DatabaseSnafu)?;
        if done.rows_affected() == 0 {
            tracing::warn!(age_filename, "Global state updated in memory but no row persisted");
        }
        Ok(GlobalUpdate::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relto_sdl::{StateDescriptor, VarDescriptor, VarKind};

    #[test]
    fn test_empty_registry() {
        let states = GlobalStates::empty();
        assert!(states.is_empty());
        assert!(states.get("Teledahn").is_none());
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let mut catalog = DescriptorDb::new();
        catalog.register(StateDescriptor {
            name: "Teledahn".to_string(),
            version: 1,
            simple_vars: vec![VarDescriptor::single("spoolOn", VarKind::Bool)],
            sd_vars: Vec::new(),
        });
        let state = State::default_instance(&catalog, "Teledahn").expect("state");
        let mut states = GlobalStates::empty();
        states.states.insert("teledahn".to_string(), state);

        assert!(states.get("TELEDAHN").is_some());
        assert!(states.get("Teledahn").is_some());
        assert_eq!(states.len(), 1);
    }
}
