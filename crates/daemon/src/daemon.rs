//! The serialized dispatch loop.
//!
//! One `AuthDaemon` task consumes the inbound channel a message at a
//! time. Handlers return `Result`; the loop converts any store error
//! into an `InternalError` reply after one diagnostic log, so a client
//! is never left waiting on a reply. Broadcasts for a mutation are
//! always enqueued before the originator's reply.

use std::sync::Arc;
use std::time::Duration;

use snafu::ResultExt;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use relto_sdl::{DescriptorDb, SdlError, State};
use relto_store::error::SdlSnafu;
use relto_store::{
    AccountStore, AgeSpec, AgeStore, GlobalStates, GlobalUpdate, ScoreStore, ScoreType,
    StoreError, TemplateStore, VaultStore,
};
use relto_types::challenge::{buggy_hash_login, use_email_auth};
use relto_types::{sanitize_avatar_shape, AccountFlags, NetResult, NodeType, PlayerSummary, ShaHash};
use relto_vault::{fields, Node, NodeRef};

use crate::broadcast::BroadcastFrame;
use crate::game::GameLink;
use crate::message::{
    AcctFlagsReply, AuthMessage, CreateAgeReply, CreateNodeReply, CreatePlayerReply,
    CreateScoreReply, FetchNodeReply, FetchSdlReply, FetchTreeReply, FindAgeReply,
    FindNodesReply, LoginReply, PublicAgesReply, RestrictLoginsReply, ScoresReply,
    SetPlayerReply, UpdateAgeSrvReply,
};
use crate::session::{PlayerBinding, Session, SessionTable};

/// Registries the daemon needs before it can serve requests.
pub struct BootstrapState {
    /// Vault index of the AllPlayers folder.
    pub all_players: u32,
    /// The loaded global SDL registry.
    pub global_states: GlobalStates,
}

/// Prepares the vault and the global SDL registry at startup.
///
/// Marking stale PlayerInfo nodes offline is side-effect-only: a failure
/// there is logged and does not block startup.
pub async fn bootstrap(pool: &PgPool, catalog: &DescriptorDb) -> Result<BootstrapState, StoreError> {
    TemplateStore::ensure_system_node(pool).await?;
    let all_players = TemplateStore::ensure_all_players(pool).await?;
    let global_states = GlobalStates::load(pool, catalog).await?;

    match TemplateStore::mark_all_offline(pool).await {
        Ok(count) => tracing::debug!(count, "Reset player online flags"),
        Err(err) => tracing::error!(error = %err, "Failed to reset online flags; continuing"),
    }

    Ok(BootstrapState { all_players, global_states })
}

/// The auth daemon context: every piece of state the worker owns.
pub struct AuthDaemon {
    pool: PgPool,
    catalog: Arc<DescriptorDb>,
    game: Arc<dyn GameLink>,
    sessions: Arc<SessionTable>,
    global_states: GlobalStates,
    all_players: u32,
    restrict_logins: bool,
    inbox: mpsc::UnboundedReceiver<AuthMessage>,
}

impl AuthDaemon {
    /// Builds the daemon and its inbound channel.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        catalog: Arc<DescriptorDb>,
        game: Arc<dyn GameLink>,
        sessions: Arc<SessionTable>,
        state: BootstrapState,
        restrict_logins: bool,
    ) -> (Self, mpsc::UnboundedSender<AuthMessage>) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let daemon = AuthDaemon {
            pool,
            catalog,
            game,
            sessions,
            global_states: state.global_states,
            all_players: state.all_players,
            restrict_logins,
            inbox,
        };
        (daemon, tx)
    }

    /// Consumes messages until `Shutdown` arrives or every sender drops.
    pub async fn run(mut self) {
        tracing::info!("Auth daemon ready");
        while let Some(message) = self.inbox.recv().await {
            if matches!(message, AuthMessage::Shutdown) {
                self.shutdown().await;
                return;
            }
            self.dispatch(message).await;
        }
        tracing::info!("Auth daemon channel closed");
    }

    async fn dispatch(&mut self, message: AuthMessage) {
        // Sends the handler outcome, downgrading errors to a failure
        // reply so the client never hangs.
        macro_rules! respond {
            ($reply:expr, $outcome:expr, $fallback:expr) => {{
                let value = match $outcome {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::error!(error = %err, "Handler failed");
                        $fallback
                    }
                };
                if $reply.send(value).is_err() {
                    tracing::warn!("Reply channel dropped before the reply");
                }
            }};
        }

        match message {
            AuthMessage::Login { session, login, client_challenge, pass_hash, reply } => {
                let outcome =
                    self.handle_login(&session, &login, client_challenge, pass_hash).await;
                respond!(reply, outcome, LoginReply::failed(NetResult::InternalError));
            }
            AuthMessage::SetPlayer { session, player_id, reply } => {
                let outcome = self.handle_set_player(&session, player_id).await;
                respond!(
                    reply,
                    outcome,
                    SetPlayerReply { result: NetResult::InternalError, player: None }
                );
            }
            AuthMessage::CreatePlayer { session, player_name, avatar_shape, explorer, reply } => {
                let outcome = self
                    .handle_create_player(&session, &player_name, &avatar_shape, explorer)
                    .await;
                respond!(reply, outcome, CreatePlayerReply::failed(NetResult::InternalError));
            }
            AuthMessage::DeletePlayer { session, player_id, reply } => {
                let outcome = self.handle_delete_player(&session, player_id).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::AddAccount { login, password, reply } => {
                let outcome = self.handle_add_account(&login, &password).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::Disconnect { session, reply } => {
                let outcome = self.handle_disconnect(&session).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::CreateAge { spec, reply } => {
                let outcome = self.handle_create_age(&spec).await;
                respond!(
                    reply,
                    outcome,
                    CreateAgeReply { result: NetResult::InternalError, age_idx: 0, info_idx: 0 }
                );
            }
            AuthMessage::FindGameServer { session, instance_uuid, filename, reply } => {
                let outcome =
                    self.handle_find_game_server(&session, instance_uuid, &filename).await;
                respond!(reply, outcome, FindAgeReply::failed(NetResult::InternalError));
            }
            AuthMessage::GetPublicAges { filename, reply } => {
                let outcome = self.handle_get_public_ages(&filename).await;
                respond!(
                    reply,
                    outcome,
                    PublicAgesReply { result: NetResult::InternalError, ages: Vec::new() }
                );
            }
            AuthMessage::SetPublic { node_idx, public, reply } => {
                let outcome = self.handle_set_public(node_idx, public).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::CreateScore { owner, score_type, name, points, reply } => {
                let outcome = self.handle_create_score(owner, score_type, &name, points).await;
                respond!(
                    reply,
                    outcome,
                    CreateScoreReply { result: NetResult::InternalError, score_id: 0 }
                );
            }
            AuthMessage::GetScores { owner, name, reply } => {
                let outcome = self.handle_get_scores(owner, &name).await;
                respond!(
                    reply,
                    outcome,
                    ScoresReply { result: NetResult::InternalError, scores: Vec::new() }
                );
            }
            AuthMessage::AddScorePoints { score_id, points, reply } => {
                let outcome = self.handle_add_score_points(score_id, points).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::TransferScorePoints { src_score_id, dst_score_id, points, reply } => {
                let outcome =
                    self.handle_transfer_score_points(src_score_id, dst_score_id, points).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::SetScorePoints { score_id, points, reply } => {
                let outcome = self.handle_set_score_points(score_id, points).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::GetHighScores { owner, name, max_scores, reply } => {
                let outcome = self.handle_get_high_scores(owner, &name, max_scores).await;
                respond!(
                    reply,
                    outcome,
                    ScoresReply { result: NetResult::InternalError, scores: Vec::new() }
                );
            }
            AuthMessage::UpdateAgeSrv { player_id, age_node_id, reply } => {
                let outcome = self.handle_update_age_srv(player_id, age_node_id);
                respond!(
                    reply,
                    outcome,
                    UpdateAgeSrvReply { result: NetResult::InternalError, is_admin: false }
                );
            }
            AuthMessage::AcctFlags { login, toggle_mask, reply } => {
                let outcome = self.handle_acct_flags(&login, toggle_mask).await;
                respond!(
                    reply,
                    outcome,
                    AcctFlagsReply { result: NetResult::InternalError, flags: 0 }
                );
            }
            AuthMessage::RestrictLogins { reply } => {
                self.restrict_logins = !self.restrict_logins;
                tracing::info!(restricted = self.restrict_logins, "Login restriction toggled");
                let value = RestrictLoginsReply {
                    result: NetResult::Success,
                    restricted: self.restrict_logins,
                };
                if reply.send(value).is_err() {
                    tracing::warn!("Reply channel dropped before the reply");
                }
            }
            AuthMessage::AddAllPlayers { player_id, reply } => {
                let outcome = self.handle_add_all_players(player_id).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::FetchSdl { age_filename, sdl_node_id, reply } => {
                let outcome = self.handle_fetch_sdl(&age_filename, sdl_node_id).await;
                respond!(reply, outcome, FetchSdlReply::failed(NetResult::InternalError));
            }
            AuthMessage::UpdateGlobalSdl { age_filename, variable, value, reply } => {
                let outcome = self.handle_update_global_sdl(&age_filename, &variable, &value).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::VaultCreateNode { node, reply } => {
                let outcome = self.handle_vault_create(&node).await;
                respond!(
                    reply,
                    outcome,
                    CreateNodeReply { result: NetResult::InternalError, node_idx: 0 }
                );
            }
            AuthMessage::VaultFetchNode { node_idx, reply } => {
                let outcome = self.handle_vault_fetch(node_idx).await;
                respond!(
                    reply,
                    outcome,
                    FetchNodeReply { result: NetResult::InternalError, node: Node::new() }
                );
            }
            AuthMessage::VaultUpdateNode { node, revision, internal, reply } => {
                let outcome = self.handle_vault_update(&node, revision, internal).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::VaultRefNode { parent, child, owner, reply } => {
                let outcome = self.handle_vault_ref(parent, child, owner).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::VaultUnrefNode { parent, child, reply } => {
                let outcome = self.handle_vault_unref(parent, child).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::VaultSendNode { node_idx, to_player, from_player, reply } => {
                let outcome = self.handle_vault_send(node_idx, to_player, from_player).await;
                respond!(reply, outcome, NetResult::InternalError);
            }
            AuthMessage::VaultFetchTree { node_idx, reply } => {
                let outcome = self.handle_vault_fetch_tree(node_idx).await;
                respond!(
                    reply,
                    outcome,
                    FetchTreeReply { result: NetResult::InternalError, refs: Vec::new() }
                );
            }
            AuthMessage::VaultFindNode { template, reply } => {
                let outcome = self.handle_vault_find(&template).await;
                respond!(
                    reply,
                    outcome,
                    FindNodesReply { result: NetResult::InternalError, nodes: Vec::new() }
                );
            }
            // Handled by the run loop before dispatch.
            AuthMessage::Shutdown => unreachable!("Shutdown is consumed by run()"),
        }
    }

    // ========================================================================
    // Broadcast fan-out
    // ========================================================================

    /// Delivers a frame to every session interested in `interest_node`:
    /// those whose current age node or bound player has a direct edge to
    /// it. The check consults the vault live; a failed check or a closed
    /// channel skips that session and nothing else.
    async fn fan_out(&self, interest_node: u32, frame: Arc<BroadcastFrame>) {
        for session in self.sessions.snapshot() {
            let (age_node, player_id) = session.interest_keys();
            let mut interested = false;
            for parent in [age_node, player_id] {
                if interested || parent == 0 {
                    continue;
                }
                match VaultStore::has_node(&self.pool, parent, interest_node).await {
                    Ok(has_edge) => interested = has_edge,
                    Err(err) => {
                        tracing::warn!(error = %err, parent, interest_node,
                            "Broadcast interest check failed");
                    }
                }
            }
            if interested && session.broadcast.send(frame.clone()).is_err() {
                tracing::warn!(session = session.id, "Broadcast channel closed; dropping frame");
            }
        }
    }

    async fn bcast_node(&self, node_idx: u32, revision: Uuid) {
        self.fan_out(node_idx, BroadcastFrame::node_changed(node_idx, revision)).await;
    }

    async fn bcast_ref(&self, edge: NodeRef) {
        self.fan_out(edge.parent, BroadcastFrame::node_added(edge)).await;
    }

    async fn bcast_unref(&self, parent: u32, child: u32) {
        self.fan_out(parent, BroadcastFrame::node_removed(parent, child)).await;
    }

    // ========================================================================
    // Account handlers
    // ========================================================================

    async fn handle_login(
        &self,
        session: &Arc<Session>,
        login: &str,
        client_challenge: u32,
        client_hash: ShaHash,
    ) -> Result<LoginReply, StoreError> {
        // Reset the binding up front in case authentication fails.
        session.clear_account();

        let account = match AccountStore::lookup_login(&self.pool, login).await? {
            Some(account) => account,
            None => {
                // Not distinguishable from a bad password on the wire;
                // account enumeration would be a gift to attackers.
                tracing::info!(login, "Login to unknown account");
                return Ok(LoginReply::failed(NetResult::AuthenticationFailed));
            }
        };

        let authenticated = if use_email_auth(login) {
            let expected =
                buggy_hash_login(account.pass_hash, session.server_challenge, client_challenge);
            expected == client_hash
        } else {
            // The client transmits its SHA-1 as big-endian words.
            let mut swapped = client_hash;
            swapped.swap_word_bytes();
            swapped == account.pass_hash
        };
        if !authenticated {
            tracing::info!(login, "Failed login");
            return Ok(LoginReply::failed(NetResult::AuthenticationFailed));
        }

        let flags = AccountFlags(account.acct_flags);
        session.set_account(account.acct_uuid, flags);
        tracing::info!(login, acct = %account.acct_uuid, "Logged in");

        // No roster for banned or locked-out accounts.
        if flags.is_banned() {
            return Ok(LoginReply::failed(NetResult::AccountBanned));
        }
        if self.restrict_logins && !flags.bypasses_restriction() {
            return Ok(LoginReply::failed(NetResult::LoginDenied));
        }

        let players = AccountStore::player_roster(&self.pool, account.acct_uuid).await?;
        Ok(LoginReply {
            result: NetResult::Success,
            billing_type: account.billing_type,
            players,
        })
    }

    async fn handle_add_account(&self, login: &str, password: &str) -> Result<NetResult, StoreError> {
        if AccountStore::add_account(&self.pool, login, password).await? {
            Ok(NetResult::Success)
        } else {
            Ok(NetResult::AccountAlreadyExists)
        }
    }

    async fn handle_set_player(
        &self,
        session: &Arc<Session>,
        player_id: u32,
    ) -> Result<SetPlayerReply, StoreError> {
        let player = match AccountStore::get_player(&self.pool, session.acct_uuid(), player_id)
            .await
        {
            Ok(Some(player)) => player,
            Ok(None) => {
                tracing::warn!(acct = %session.acct_uuid(), player_id, "Invalid player requested");
                session.clear_player();
                return Ok(SetPlayerReply { result: NetResult::PlayerNotFound, player: None });
            }
            Err(err) => {
                session.clear_player();
                return Err(err);
            }
        };

        if self.sessions.player_active_elsewhere(player_id, session.id) {
            tracing::info!(acct = %session.acct_uuid(), player_id, "Player already active");
            session.clear_player();
            return Ok(SetPlayerReply { result: NetResult::LoggedInElsewhere, player: None });
        }

        session.bind_player(PlayerBinding {
            player_id,
            player_name: player.player_name.clone(),
            avatar_shape: player.avatar_shape.clone(),
            explorer: player.explorer,
        });

        // Mark the player online. Side-effect-only: a failure is logged
        // and the sign-in still succeeds.
        match AccountStore::set_player_presence(&self.pool, player_id, true, "Lobby", Uuid::nil())
            .await
        {
            Ok(touched) => {
                if touched.is_empty() {
                    tracing::error!(player_id, "No PlayerInfo node to mark online");
                }
                for node_idx in touched {
                    self.bcast_node(node_idx, Uuid::new_v4()).await;
                }
            }
            Err(err) => tracing::error!(error = %err, player_id, "Failed to mark player online"),
        }

        tracing::info!(acct = %session.acct_uuid(), player = %player.player_name, player_id,
            "Signed in");
        Ok(SetPlayerReply { result: NetResult::Success, player: Some(player) })
    }

    async fn handle_create_player(
        &self,
        session: &Arc<Session>,
        player_name: &str,
        avatar_shape: &str,
        explorer: u32,
    ) -> Result<CreatePlayerReply, StoreError> {
        let avatar_shape = sanitize_avatar_shape(avatar_shape);

        if AccountStore::player_name_exists(&self.pool, player_name).await? {
            tracing::warn!(player_name, "Player already exists");
            return Ok(CreatePlayerReply::failed(NetResult::PlayerAlreadyExists));
        }

        let acct_uuid = session.acct_uuid();
        let (player_idx, info_idx, hood_owners) =
            TemplateStore::create_player(&self.pool, acct_uuid, player_name, avatar_shape, explorer)
                .await?;

        // Tell the neighborhood about its new member.
        if hood_owners != 0
            && VaultStore::ref_node(&self.pool, hood_owners, info_idx, player_idx).await?
        {
            self.bcast_ref(NodeRef::new(hood_owners, info_idx, player_idx)).await;
        }

        // And the AllPlayers list.
        if VaultStore::ref_node(&self.pool, self.all_players, info_idx, 0).await? {
            self.bcast_ref(NodeRef::new(self.all_players, info_idx, 0)).await;
        }

        let player = PlayerSummary {
            player_id: player_idx,
            player_name: player_name.to_string(),
            avatar_shape: avatar_shape.to_string(),
            explorer,
        };
        AccountStore::insert_player(&self.pool, acct_uuid, &player).await?;

        Ok(CreatePlayerReply {
            result: NetResult::Success,
            player: Some(player),
            player_info_idx: info_idx,
        })
    }

    async fn handle_delete_player(
        &self,
        session: &Arc<Session>,
        player_id: u32,
    ) -> Result<NetResult, StoreError> {
        let acct_uuid = session.acct_uuid();
        tracing::debug!(acct = %acct_uuid, player_id, "Player deletion requested");

        if !AccountStore::player_exists(&self.pool, acct_uuid, player_id).await? {
            tracing::warn!(acct = %acct_uuid, player_id, "Deleting nonexistent player");
            return Ok(NetResult::PlayerNotFound);
        }
        AccountStore::delete_player(&self.pool, player_id).await?;

        // Unlink the PlayerInfo from every list; the rest of the subtree
        // stays behind, orphaned.
        let info_idx = match AccountStore::find_player_info(&self.pool, player_id).await? {
            Some(info_idx) => info_idx,
            None => {
                tracing::error!(player_id, "No PlayerInfo node for deleted player");
                return Ok(NetResult::InternalError);
            }
        };
        AccountStore::remove_incoming_refs(&self.pool, info_idx).await?;
        Ok(NetResult::Success)
    }

    async fn handle_disconnect(&self, session: &Arc<Session>) -> Result<NetResult, StoreError> {
        let player_id = session.player_id();
        if player_id != 0 {
            // Mark the player offline. Side-effect-only: the disconnect
            // succeeds regardless.
            match AccountStore::set_player_presence(&self.pool, player_id, false, "", Uuid::nil())
                .await
            {
                Ok(touched) => {
                    for node_idx in touched {
                        self.bcast_node(node_idx, Uuid::new_v4()).await;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, player_id, "Failed to mark player offline")
                }
            }
        }
        Ok(NetResult::Success)
    }

    async fn handle_acct_flags(
        &self,
        login: &str,
        toggle_mask: u32,
    ) -> Result<AcctFlagsReply, StoreError> {
        let flags = match AccountStore::account_flags(&self.pool, login).await? {
            Some(flags) => AccountFlags(flags),
            None => {
                tracing::error!(login, "Flag toggle for unknown account");
                return Ok(AcctFlagsReply { result: NetResult::InternalError, flags: 0 });
            }
        };

        let toggled = flags.toggled(toggle_mask);
        if toggle_mask != 0 {
            AccountStore::set_account_flags(&self.pool, login, toggled.0).await?;
        }
        Ok(AcctFlagsReply { result: NetResult::Success, flags: toggled.0 })
    }

    // ========================================================================
    // Age handlers
    // ========================================================================

    async fn handle_create_age(&self, spec: &AgeSpec) -> Result<CreateAgeReply, StoreError> {
        let mut template = Node::new();
        template.set_node_type(NodeType::Age.raw());
        template.set_uuid_1(spec.instance_uuid);
        let existing = VaultStore::find_nodes(&self.pool, &template).await?;

        let (age_idx, info_idx) = match existing.first() {
            Some(age_idx) => {
                let mut template = Node::new();
                template.set_node_type(NodeType::AgeInfo.raw());
                template.set_uuid_1(spec.instance_uuid);
                let infos = VaultStore::find_nodes(&self.pool, &template).await?;
                match infos.first() {
                    Some(info_idx) => (*age_idx, *info_idx),
                    None => {
                        tracing::error!(age_idx, uuid = %spec.instance_uuid,
                            "Age exists without an AgeInfo node");
                        return Ok(CreateAgeReply {
                            result: NetResult::InternalError,
                            age_idx: 0,
                            info_idx: 0,
                        });
                    }
                }
            }
            None => TemplateStore::create_age(&self.pool, spec).await?,
        };

        if age_idx == 0 || info_idx == 0 {
            return Ok(CreateAgeReply { result: NetResult::InternalError, age_idx: 0, info_idx: 0 });
        }
        Ok(CreateAgeReply { result: NetResult::Success, age_idx, info_idx })
    }

    async fn handle_find_game_server(
        &self,
        session: &Arc<Session>,
        instance_uuid: Uuid,
        filename: &str,
    ) -> Result<FindAgeReply, StoreError> {
        tracing::debug!(%instance_uuid, filename, "Game server requested");

        let server = match AgeStore::find_by_uuid(&self.pool, instance_uuid).await? {
            Some(server) => server,
            None => AgeStore::insert_temporary(&self.pool, instance_uuid, filename).await?,
        };

        // Show the player in the new age. Side-effect-only.
        let player_id = session.player_id();
        if player_id != 0 {
            match AccountStore::set_player_location(
                &self.pool,
                player_id,
                &server.display_name,
                instance_uuid,
            )
            .await
            {
                Ok(touched) => {
                    for node_idx in touched {
                        self.bcast_node(node_idx, Uuid::new_v4()).await;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, player_id, "Failed to update player location")
                }
            }
        }

        Ok(FindAgeReply {
            result: NetResult::Success,
            mcp_id: server.mcp_id,
            age_node_idx: server.age_idx,
            display_name: server.display_name,
        })
    }

    async fn handle_get_public_ages(&self, filename: &str) -> Result<PublicAgesReply, StoreError> {
        let ages = VaultStore::find_public_ages(&self.pool, filename).await?;
        Ok(PublicAgesReply { result: NetResult::Success, ages })
    }

    async fn handle_set_public(&self, node_idx: u32, public: bool) -> Result<NetResult, StoreError> {
        VaultStore::set_public(&self.pool, node_idx, public).await?;
        self.bcast_node(node_idx, Uuid::new_v4()).await;
        Ok(NetResult::Success)
    }

    fn handle_update_age_srv(
        &self,
        player_id: u32,
        age_node_id: u32,
    ) -> Result<UpdateAgeSrvReply, StoreError> {
        match self.sessions.find_by_player(player_id) {
            Some(session) => {
                session.set_age_node(age_node_id);
                Ok(UpdateAgeSrvReply {
                    result: NetResult::Success,
                    is_admin: session.acct_flags().is_admin(),
                })
            }
            None => Ok(UpdateAgeSrvReply { result: NetResult::PlayerNotFound, is_admin: false }),
        }
    }

    async fn handle_add_all_players(&self, player_id: u32) -> Result<NetResult, StoreError> {
        // Toggle: the AllPlayers list is linked under the player so the
        // client can browse it; a second request unlinks it.
        if VaultStore::has_node(&self.pool, player_id, self.all_players).await? {
            if !VaultStore::unref_node(&self.pool, player_id, self.all_players).await? {
                return Ok(NetResult::InternalError);
            }
            self.bcast_unref(player_id, self.all_players).await;
        } else {
            if !VaultStore::ref_node(&self.pool, player_id, self.all_players, 0).await? {
                return Ok(NetResult::InternalError);
            }
            self.bcast_ref(NodeRef::new(player_id, self.all_players, 0)).await;
        }
        Ok(NetResult::Success)
    }

    // ========================================================================
    // SDL handlers
    // ========================================================================

    async fn handle_fetch_sdl(
        &self,
        age_filename: &str,
        sdl_node_id: u32,
    ) -> Result<FetchSdlReply, StoreError> {
        let global_blob = self
            .global_states
            .get(age_filename)
            .map(State::to_blob)
            .unwrap_or_default();

        let local_blob = if sdl_node_id == 0 {
            match State::default_instance(self.catalog.as_ref(), age_filename) {
                Ok(state) => state.to_blob(),
                Err(SdlError::DescriptorNotFound { name }) => {
                    tracing::warn!(descriptor = %name, "No descriptor for default SDL");
                    Vec::new()
                }
                Err(err) => return Err(err).context(SdlSnafu),
            }
        } else {
            VaultStore::fetch(&self.pool, sdl_node_id).await?.blob_1
        };

        Ok(FetchSdlReply { result: NetResult::Success, global_blob, local_blob })
    }

    async fn handle_update_global_sdl(
        &mut self,
        age_filename: &str,
        variable: &str,
        value: &str,
    ) -> Result<NetResult, StoreError> {
        let outcome = self
            .global_states
            .update_var(&self.pool, self.catalog.as_ref(), age_filename, variable, value)
            .await?;
        Ok(match outcome {
            GlobalUpdate::Applied => {
                // Best-effort: active instances pick the change up.
                self.game.update_global_sdl(age_filename).await;
                NetResult::Success
            }
            GlobalUpdate::StateNotFound => NetResult::StateObjectNotFound,
            GlobalUpdate::VarNotFound => NetResult::InvalidParameter,
            GlobalUpdate::NotSupported => NetResult::NotSupported,
        })
    }

    // ========================================================================
    // Score handlers
    // ========================================================================

    async fn handle_create_score(
        &self,
        owner: u32,
        score_type: i32,
        name: &str,
        points: i32,
    ) -> Result<CreateScoreReply, StoreError> {
        let score_type = match ScoreType::from_raw(score_type) {
            Some(score_type) => score_type,
            None => {
                return Ok(CreateScoreReply { result: NetResult::InvalidParameter, score_id: 0 })
            }
        };
        match ScoreStore::create(&self.pool, owner, score_type, name, points).await? {
            Some(score_id) => Ok(CreateScoreReply { result: NetResult::Success, score_id }),
            None => Ok(CreateScoreReply { result: NetResult::ScoreAlreadyExists, score_id: 0 }),
        }
    }

    async fn handle_get_scores(&self, owner: u32, name: &str) -> Result<ScoresReply, StoreError> {
        let scores = ScoreStore::get_scores(&self.pool, owner, name).await?;
        Ok(ScoresReply { result: NetResult::Success, scores })
    }

    async fn handle_add_score_points(
        &self,
        score_id: u32,
        points: i32,
    ) -> Result<NetResult, StoreError> {
        let score_type = match ScoreStore::score_type(&self.pool, score_id).await? {
            Some(raw) => ScoreType::from_raw(raw),
            None => return Ok(NetResult::ScoreNoDataFound),
        };
        match score_type {
            Some(ScoreType::Fixed) => Ok(NetResult::ScoreWrongType),
            Some(score_type) => {
                ScoreStore::add_points(&self.pool, score_id, points, score_type.allows_negative())
                    .await?;
                Ok(NetResult::Success)
            }
            None => Ok(NetResult::ScoreWrongType),
        }
    }

    async fn handle_transfer_score_points(
        &self,
        src: u32,
        dst: u32,
        points: i32,
    ) -> Result<NetResult, StoreError> {
        let (src_raw, dst_raw) = match ScoreStore::score_type_pair(&self.pool, src, dst).await? {
            Some(pair) => pair,
            None => return Ok(NetResult::ScoreNoDataFound),
        };
        let (src_type, dst_type) = match (ScoreType::from_raw(src_raw), ScoreType::from_raw(dst_raw))
        {
            (Some(src_type), Some(dst_type)) => (src_type, dst_type),
            _ => return Ok(NetResult::ScoreWrongType),
        };
        if src_type == ScoreType::Fixed || dst_type == ScoreType::Fixed {
            return Ok(NetResult::ScoreWrongType);
        }
        let allow_negative = src_type == ScoreType::Golf && dst_type == ScoreType::Golf;
        if ScoreStore::transfer_points(&self.pool, src, dst, points, allow_negative).await? {
            Ok(NetResult::Success)
        } else {
            Ok(NetResult::ScoreNotEnoughPoints)
        }
    }

    async fn handle_set_score_points(
        &self,
        score_id: u32,
        points: i32,
    ) -> Result<NetResult, StoreError> {
        match ScoreStore::score_type(&self.pool, score_id).await? {
            None => Ok(NetResult::ScoreNoDataFound),
            Some(raw) if ScoreType::from_raw(raw) == Some(ScoreType::Fixed) => {
                ScoreStore::set_points(&self.pool, score_id, points).await?;
                Ok(NetResult::Success)
            }
            Some(_) => Ok(NetResult::ScoreWrongType),
        }
    }

    async fn handle_get_high_scores(
        &self,
        owner: u32,
        name: &str,
        max_scores: u32,
    ) -> Result<ScoresReply, StoreError> {
        if owner == 0 {
            let scores = ScoreStore::high_scores(&self.pool, name, max_scores).await?;
            return Ok(ScoresReply { result: NetResult::Success, scores });
        }
        match ScoreStore::high_scores_for_age(&self.pool, owner, name, max_scores).await? {
            Some(scores) => Ok(ScoresReply { result: NetResult::Success, scores }),
            None => {
                tracing::error!(owner, "No AgeOwnersFolder for high score query");
                Ok(ScoresReply { result: NetResult::InvalidParameter, scores: Vec::new() })
            }
        }
    }

    // ========================================================================
    // Vault handlers
    // ========================================================================

    async fn handle_vault_create(&self, node: &Node) -> Result<CreateNodeReply, StoreError> {
        let node_idx = VaultStore::create(&self.pool, node).await?;
        Ok(CreateNodeReply { result: NetResult::Success, node_idx })
    }

    async fn handle_vault_fetch(&self, node_idx: u32) -> Result<FetchNodeReply, StoreError> {
        let node = VaultStore::fetch(&self.pool, node_idx).await?;
        if node.is_null() {
            Ok(FetchNodeReply { result: NetResult::VaultNodeNotFound, node })
        } else {
            Ok(FetchNodeReply { result: NetResult::Success, node })
        }
    }

    async fn handle_vault_update(
        &self,
        node: &Node,
        revision: Uuid,
        internal: bool,
    ) -> Result<NetResult, StoreError> {
        // SDL updates are arbitrated by the game server owning the age:
        // it either absorbs the update and writes back a merged version,
        // or reports AgeNotFound and the vault applies the caller's
        // version unchanged. At most one writer per live instance.
        if !internal && node.has(fields::NODE_TYPE) && node.node_type == NodeType::Sdl.raw() {
            if let Some(mcp_id) = AgeStore::find_mcp_by_sdl(&self.pool, node.node_idx).await? {
                let result = self.game.update_vault_sdl(node, mcp_id).await;
                if result != NetResult::AgeNotFound {
                    return Ok(result);
                }
            }
        }

        let revision = if revision.is_nil() { Uuid::new_v4() } else { revision };
        if VaultStore::update(&self.pool, node).await? {
            self.bcast_node(node.node_idx, revision).await;
            Ok(NetResult::Success)
        } else {
            Ok(NetResult::InternalError)
        }
    }

    async fn handle_vault_ref(
        &self,
        parent: u32,
        child: u32,
        owner: u32,
    ) -> Result<NetResult, StoreError> {
        if VaultStore::ref_node(&self.pool, parent, child, owner).await? {
            self.bcast_ref(NodeRef::new(parent, child, owner)).await;
        }
        Ok(NetResult::Success)
    }

    async fn handle_vault_unref(&self, parent: u32, child: u32) -> Result<NetResult, StoreError> {
        if VaultStore::unref_node(&self.pool, parent, child).await? {
            self.bcast_unref(parent, child).await;
        }
        Ok(NetResult::Success)
    }

    async fn handle_vault_send(
        &self,
        node_idx: u32,
        to_player: u32,
        from_player: u32,
    ) -> Result<NetResult, StoreError> {
        let edge = VaultStore::send_node(&self.pool, node_idx, to_player, from_player).await?;
        if !edge.is_empty() {
            self.bcast_ref(edge).await;
        }
        // The NodeAdded broadcast is the only success signal the
        // recipient sees; this reply just unblocks the sender.
        Ok(NetResult::Success)
    }

    async fn handle_vault_fetch_tree(&self, node_idx: u32) -> Result<FetchTreeReply, StoreError> {
        let refs = VaultStore::fetch_tree(&self.pool, node_idx).await?;
        Ok(FetchTreeReply { result: NetResult::Success, refs })
    }

    async fn handle_vault_find(&self, template: &Node) -> Result<FindNodesReply, StoreError> {
        let nodes = VaultStore::find_nodes(&self.pool, template).await?;
        Ok(FindNodesReply { result: NetResult::Success, nodes })
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    async fn shutdown(&mut self) {
        tracing::info!("Auth daemon shutting down");

        // Ask every connection to close its socket.
        for session in self.sessions.snapshot() {
            session.close.notify_waiters();
        }

        // Give connections up to five seconds to unwind.
        for _ in 0..50 {
            if self.sessions.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if !self.sessions.is_empty() {
            tracing::warn!(remaining = self.sessions.len(), "Clients still alive after 5 seconds");
        }

        self.pool.close().await;
        self.global_states.clear();
        tracing::info!("Auth daemon stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;
    use tokio::sync::{mpsc as tokio_mpsc, oneshot};

    use crate::game::NoGameLink;
    use crate::session::PlayerBinding;

    /// A daemon over a pool that never connects; only handlers that skip
    /// the database can succeed, everything else must degrade to
    /// InternalError instead of hanging or crashing.
    fn unreachable_db_daemon() -> (
        AuthDaemon,
        mpsc::UnboundedSender<AuthMessage>,
        Arc<SessionTable>,
    ) {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://relto@127.0.0.1:9/relto")
            .expect("lazy pool");
        let sessions = SessionTable::new();
        let (daemon, tx) = AuthDaemon::new(
            pool,
            Arc::new(DescriptorDb::new()),
            Arc::new(NoGameLink),
            sessions.clone(),
            BootstrapState { all_players: 0, global_states: GlobalStates::empty() },
            false,
        );
        (daemon, tx, sessions)
    }

    fn test_session(id: u64) -> Arc<Session> {
        let (tx, _rx) = tokio_mpsc::unbounded_channel();
        Session::new(id, 0xFEED, tx)
    }

    #[tokio::test]
    async fn test_restrict_logins_toggles() {
        let (daemon, tx, _sessions) = unreachable_db_daemon();
        let worker = tokio::spawn(daemon.run());

        for expected in [true, false, true] {
            let (reply_tx, reply_rx) = oneshot::channel();
            tx.send(AuthMessage::RestrictLogins { reply: reply_tx }).expect("send");
            let reply = reply_rx.await.expect("reply");
            assert_eq!(reply.result, NetResult::Success);
            assert_eq!(reply.restricted, expected);
        }

        tx.send(AuthMessage::Shutdown).expect("send shutdown");
        worker.await.expect("worker exits");
    }

    #[tokio::test]
    async fn test_update_age_srv_binds_session() {
        let (daemon, tx, sessions) = unreachable_db_daemon();
        let session = test_session(1);
        session.bind_player(PlayerBinding { player_id: 42, ..PlayerBinding::default() });
        sessions.add(session.clone());
        let worker = tokio::spawn(daemon.run());

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(AuthMessage::UpdateAgeSrv { player_id: 42, age_node_id: 900, reply: reply_tx })
            .expect("send");
        let reply = reply_rx.await.expect("reply");
        assert_eq!(reply.result, NetResult::Success);
        assert!(!reply.is_admin);
        assert_eq!(session.interest_keys(), (900, 42));

        // An unbound player is reported, not guessed.
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(AuthMessage::UpdateAgeSrv { player_id: 43, age_node_id: 7, reply: reply_tx })
            .expect("send");
        let reply = reply_rx.await.expect("reply");
        assert_eq!(reply.result, NetResult::PlayerNotFound);

        sessions.remove(1);
        tx.send(AuthMessage::Shutdown).expect("send shutdown");
        worker.await.expect("worker exits");
    }

    #[tokio::test]
    async fn test_database_failure_becomes_internal_error() {
        let (daemon, tx, _sessions) = unreachable_db_daemon();
        let worker = tokio::spawn(daemon.run());

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(AuthMessage::AddAccount {
            login: "alice".to_string(),
            password: "pw".to_string(),
            reply: reply_tx,
        })
        .expect("send");
        assert_eq!(reply_rx.await.expect("reply"), NetResult::InternalError);

        let session = test_session(2);
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(AuthMessage::Login {
            session,
            login: "alice".to_string(),
            client_challenge: 1,
            pass_hash: ShaHash::default(),
            reply: reply_tx,
        })
        .expect("send");
        let reply = reply_rx.await.expect("reply");
        assert_eq!(reply.result, NetResult::InternalError);
        assert!(reply.players.is_empty());

        tx.send(AuthMessage::Shutdown).expect("send shutdown");
        worker.await.expect("worker exits");
    }

    #[tokio::test]
    async fn test_fetch_sdl_without_descriptor_is_empty_success() {
        let (daemon, tx, _sessions) = unreachable_db_daemon();
        let worker = tokio::spawn(daemon.run());

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(AuthMessage::FetchSdl {
            age_filename: "Teledahn".to_string(),
            sdl_node_id: 0,
            reply: reply_tx,
        })
        .expect("send");
        let reply = reply_rx.await.expect("reply");
        assert_eq!(reply.result, NetResult::Success);
        assert!(reply.global_blob.is_empty());
        assert!(reply.local_blob.is_empty());

        tx.send(AuthMessage::Shutdown).expect("send shutdown");
        worker.await.expect("worker exits");
    }

    #[tokio::test]
    async fn test_update_global_sdl_unknown_age() {
        let (daemon, tx, _sessions) = unreachable_db_daemon();
        let worker = tokio::spawn(daemon.run());

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(AuthMessage::UpdateGlobalSdl {
            age_filename: "nowhere".to_string(),
            variable: "x".to_string(),
            value: "1".to_string(),
            reply: reply_tx,
        })
        .expect("send");
        assert_eq!(reply_rx.await.expect("reply"), NetResult::StateObjectNotFound);

        tx.send(AuthMessage::Shutdown).expect("send shutdown");
        worker.await.expect("worker exits");
    }
}
