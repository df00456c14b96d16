//! The connected-client session table.
//!
//! A session lives from socket accept to socket close. The connection
//! layer owns the socket; the daemon owns only this in-memory slot and
//! the broadcast channel. One mutex guards the whole table and is held
//! only for lookups and snapshots; per-session mutable state sits behind
//! its own small lock so broadcast fan-out never blocks on it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use uuid::Uuid;

use relto_types::AccountFlags;

use crate::broadcast::BroadcastFrame;

/// The player a session is currently signed in as. A zero id means no
/// player is bound.
#[derive(Debug, Clone, Default)]
pub struct PlayerBinding {
    pub player_id: u32,
    pub player_name: String,
    pub avatar_shape: String,
    pub explorer: u32,
}

#[derive(Debug, Default)]
struct SessionState {
    acct_uuid: Uuid,
    acct_flags: AccountFlags,
    player: PlayerBinding,
    age_node_id: u32,
}

/// One connected auth client.
pub struct Session {
    /// Table key, assigned by the connection layer.
    pub id: u64,
    /// Nonce sent during the connect handshake, mixed into the
    /// email-path challenge hash.
    pub server_challenge: u32,
    /// Outbound broadcast frames; the per-client sender task drains this.
    pub broadcast: mpsc::UnboundedSender<Arc<BroadcastFrame>>,
    /// Fired at daemon shutdown; the connection layer closes the socket.
    pub close: Arc<Notify>,
    state: Mutex<SessionState>,
}

impl Session {
    /// Creates a session slot with no account bound.
    pub fn new(
        id: u64,
        server_challenge: u32,
        broadcast: mpsc::UnboundedSender<Arc<BroadcastFrame>>,
    ) -> Arc<Self> {
        Arc::new(Session {
            id,
            server_challenge,
            broadcast,
            close: Arc::new(Notify::new()),
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Binds the authenticated account. Called only by the daemon.
    pub fn set_account(&self, acct_uuid: Uuid, acct_flags: AccountFlags) {
        let mut state = self.state.lock();
        state.acct_uuid = acct_uuid;
        state.acct_flags = acct_flags;
    }

    /// Clears the account, for a failed re-login.
    pub fn clear_account(&self) {
        let mut state = self.state.lock();
        state.acct_uuid = Uuid::nil();
        state.acct_flags = AccountFlags::default();
    }

    pub fn acct_uuid(&self) -> Uuid {
        self.state.lock().acct_uuid
    }

    pub fn acct_flags(&self) -> AccountFlags {
        self.state.lock().acct_flags
    }

    /// Binds the active player.
    pub fn bind_player(&self, player: PlayerBinding) {
        self.state.lock().player = player;
    }

    /// Drops the active player binding.
    pub fn clear_player(&self) {
        self.state.lock().player = PlayerBinding::default();
    }

    /// The bound player id, 0 when none.
    pub fn player_id(&self) -> u32 {
        self.state.lock().player.player_id
    }

    /// A copy of the player binding.
    pub fn player(&self) -> PlayerBinding {
        self.state.lock().player.clone()
    }

    /// Sets the vault node of the age the player is currently in.
    pub fn set_age_node(&self, age_node_id: u32) {
        self.state.lock().age_node_id = age_node_id;
    }

    /// The broadcast interest keys: `(age_node_id, player_id)`.
    pub fn interest_keys(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.age_node_id, state.player.player_id)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish_non_exhaustive()
    }
}

/// The set of currently connected sessions, behind one lock.
#[derive(Debug, Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<u64, Arc<Session>>>,
}

impl SessionTable {
    /// Creates an empty table.
    pub fn new() -> Arc<Self> {
        Arc::new(SessionTable::default())
    }

    /// Adds a session at accept time.
    pub fn add(&self, session: Arc<Session>) {
        self.inner.lock().insert(session.id, session);
    }

    /// Removes a session at socket close. Returns it if it was present.
    pub fn remove(&self, id: u64) -> Option<Arc<Session>> {
        self.inner.lock().remove(&id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when no session is connected.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// A snapshot of every session, for iteration outside the lock.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.inner.lock().values().cloned().collect()
    }

    /// Finds the session a player is bound to, if any.
    pub fn find_by_player(&self, player_id: u32) -> Option<Arc<Session>> {
        self.inner
            .lock()
            .values()
            .find(|session| session.player_id() == player_id)
            .cloned()
    }

    /// True when some *other* session has the player bound.
    pub fn player_active_elsewhere(&self, player_id: u32, this_session: u64) -> bool {
        self.inner
            .lock()
            .values()
            .any(|session| session.id != this_session && session.player_id() == player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: u64) -> Arc<Session> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Session::new(id, 0xC0FFEE, tx)
    }

    #[test]
    fn test_add_remove() {
        let table = SessionTable::new();
        let s1 = session(1);
        table.add(s1.clone());
        table.add(session(2));
        assert_eq!(table.len(), 2);

        let removed = table.remove(1).expect("session present");
        assert_eq!(removed.id, s1.id);
        assert_eq!(table.len(), 1);
        assert!(table.remove(1).is_none());
    }

    #[test]
    fn test_player_active_elsewhere() {
        let table = SessionTable::new();
        let s1 = session(1);
        let s2 = session(2);
        s1.bind_player(PlayerBinding {
            player_id: 500,
            player_name: "Yeesha".to_string(),
            avatar_shape: "female".to_string(),
            explorer: 1,
        });
        table.add(s1);
        table.add(s2);

        assert!(table.player_active_elsewhere(500, 2));
        // The session holding the player is not "elsewhere".
        assert!(!table.player_active_elsewhere(500, 1));
        assert!(!table.player_active_elsewhere(501, 2));
    }

    #[test]
    fn test_interest_keys_follow_bindings() {
        let s = session(7);
        assert_eq!(s.interest_keys(), (0, 0));
        s.bind_player(PlayerBinding { player_id: 42, ..PlayerBinding::default() });
        s.set_age_node(99);
        assert_eq!(s.interest_keys(), (99, 42));
        s.clear_player();
        assert_eq!(s.interest_keys(), (99, 0));
    }

    #[test]
    fn test_find_by_player() {
        let table = SessionTable::new();
        let s = session(3);
        s.bind_player(PlayerBinding { player_id: 8, ..PlayerBinding::default() });
        table.add(s);

        assert_eq!(table.find_by_player(8).expect("found").id, 3);
        assert!(table.find_by_player(9).is_none());
    }
}
