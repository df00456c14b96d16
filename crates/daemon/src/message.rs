//! The daemon's inbound message set.
//!
//! Every request a connection handler (or the admin console) can make is
//! one variant of [`AuthMessage`], carrying its payload and a oneshot
//! responder. The dispatch match in the daemon is total over this enum,
//! so adding a variant without a handler is a compile error rather than
//! a runtime protocol failure.

use std::sync::Arc;

use tokio::sync::oneshot;
use uuid::Uuid;

use relto_store::{AgeSpec, PublicAge, ScoreRow};
use relto_types::{NetResult, PlayerSummary, ShaHash};
use relto_vault::{Node, NodeRef};

use crate::session::Session;

/// Oneshot responder carried by each request.
pub type Reply<T> = oneshot::Sender<T>;

/// Login reply: status plus the account's roster on success.
#[derive(Debug)]
pub struct LoginReply {
    pub result: NetResult,
    pub billing_type: u32,
    pub players: Vec<PlayerSummary>,
}

impl LoginReply {
    /// A reply carrying only a failure status.
    pub fn failed(result: NetResult) -> Self {
        LoginReply { result, billing_type: 0, players: Vec::new() }
    }
}

/// SetPlayer reply: status plus the bound player on success.
#[derive(Debug)]
pub struct SetPlayerReply {
    pub result: NetResult,
    pub player: Option<PlayerSummary>,
}

/// CreatePlayer reply: status plus the new player's vault ids.
#[derive(Debug)]
pub struct CreatePlayerReply {
    pub result: NetResult,
    pub player: Option<PlayerSummary>,
    pub player_info_idx: u32,
}

impl CreatePlayerReply {
    /// A reply carrying only a failure status.
    pub fn failed(result: NetResult) -> Self {
        CreatePlayerReply { result, player: None, player_info_idx: 0 }
    }
}

/// CreateAge reply: status plus the Age and AgeInfo node ids.
#[derive(Debug)]
pub struct CreateAgeReply {
    pub result: NetResult,
    pub age_idx: u32,
    pub info_idx: u32,
}

/// FindGameServer reply: routing information for the requested instance.
#[derive(Debug)]
pub struct FindAgeReply {
    pub result: NetResult,
    pub mcp_id: u32,
    pub age_node_idx: u32,
    pub display_name: String,
}

impl FindAgeReply {
    /// A reply carrying only a failure status.
    pub fn failed(result: NetResult) -> Self {
        FindAgeReply { result, mcp_id: 0, age_node_idx: 0, display_name: String::new() }
    }
}

/// GetPublicAges reply.
#[derive(Debug)]
pub struct PublicAgesReply {
    pub result: NetResult,
    pub ages: Vec<PublicAge>,
}

/// Reply for score listing operations.
#[derive(Debug)]
pub struct ScoresReply {
    pub result: NetResult,
    pub scores: Vec<ScoreRow>,
}

/// CreateScore reply.
#[derive(Debug)]
pub struct CreateScoreReply {
    pub result: NetResult,
    pub score_id: u32,
}

/// UpdateAgeSrv reply: whether the bound account is an admin.
#[derive(Debug)]
pub struct UpdateAgeSrvReply {
    pub result: NetResult,
    pub is_admin: bool,
}

/// AcctFlags reply: the flag word after toggling.
#[derive(Debug)]
pub struct AcctFlagsReply {
    pub result: NetResult,
    pub flags: u32,
}

/// RestrictLogins reply: the new restriction state.
#[derive(Debug)]
pub struct RestrictLoginsReply {
    pub result: NetResult,
    pub restricted: bool,
}

/// FetchSDL reply: the age's global state and the node-local state.
#[derive(Debug)]
pub struct FetchSdlReply {
    pub result: NetResult,
    pub global_blob: Vec<u8>,
    pub local_blob: Vec<u8>,
}

impl FetchSdlReply {
    /// A reply carrying only a failure status.
    pub fn failed(result: NetResult) -> Self {
        FetchSdlReply { result, global_blob: Vec::new(), local_blob: Vec::new() }
    }
}

/// VaultCreateNode reply.
#[derive(Debug)]
pub struct CreateNodeReply {
    pub result: NetResult,
    pub node_idx: u32,
}

/// VaultFetchNode reply.
#[derive(Debug)]
pub struct FetchNodeReply {
    pub result: NetResult,
    pub node: Node,
}

/// VaultFetchTree reply.
#[derive(Debug)]
pub struct FetchTreeReply {
    pub result: NetResult,
    pub refs: Vec<NodeRef>,
}

/// VaultFindNode reply.
#[derive(Debug)]
pub struct FindNodesReply {
    pub result: NetResult,
    pub nodes: Vec<u32>,
}

/// Everything the daemon can be asked to do.
#[derive(Debug)]
pub enum AuthMessage {
    Login {
        session: Arc<Session>,
        login: String,
        client_challenge: u32,
        pass_hash: ShaHash,
        reply: Reply<LoginReply>,
    },
    SetPlayer {
        session: Arc<Session>,
        player_id: u32,
        reply: Reply<SetPlayerReply>,
    },
    CreatePlayer {
        session: Arc<Session>,
        player_name: String,
        avatar_shape: String,
        explorer: u32,
        reply: Reply<CreatePlayerReply>,
    },
    DeletePlayer {
        session: Arc<Session>,
        player_id: u32,
        reply: Reply<NetResult>,
    },
    AddAccount {
        login: String,
        password: String,
        reply: Reply<NetResult>,
    },
    Disconnect {
        session: Arc<Session>,
        reply: Reply<NetResult>,
    },
    CreateAge {
        spec: AgeSpec,
        reply: Reply<CreateAgeReply>,
    },
    FindGameServer {
        session: Arc<Session>,
        instance_uuid: Uuid,
        filename: String,
        reply: Reply<FindAgeReply>,
    },
    GetPublicAges {
        filename: String,
        reply: Reply<PublicAgesReply>,
    },
    SetPublic {
        node_idx: u32,
        public: bool,
        reply: Reply<NetResult>,
    },
    CreateScore {
        owner: u32,
        score_type: i32,
        name: String,
        points: i32,
        reply: Reply<CreateScoreReply>,
    },
    GetScores {
        owner: u32,
        name: String,
        reply: Reply<ScoresReply>,
    },
    AddScorePoints {
        score_id: u32,
        points: i32,
        reply: Reply<NetResult>,
    },
    TransferScorePoints {
        src_score_id: u32,
        dst_score_id: u32,
        points: i32,
        reply: Reply<NetResult>,
    },
    SetScorePoints {
        score_id: u32,
        points: i32,
        reply: Reply<NetResult>,
    },
    GetHighScores {
        owner: u32,
        name: String,
        max_scores: u32,
        reply: Reply<ScoresReply>,
    },
    UpdateAgeSrv {
        player_id: u32,
        age_node_id: u32,
        reply: Reply<UpdateAgeSrvReply>,
    },
    AcctFlags {
        login: String,
        toggle_mask: u32,
        reply: Reply<AcctFlagsReply>,
    },
    RestrictLogins {
        reply: Reply<RestrictLoginsReply>,
    },
    AddAllPlayers {
        player_id: u32,
        reply: Reply<NetResult>,
    },
    FetchSdl {
        age_filename: String,
        sdl_node_id: u32,
        reply: Reply<FetchSdlReply>,
    },
    UpdateGlobalSdl {
        age_filename: String,
        variable: String,
        value: String,
        reply: Reply<NetResult>,
    },
    VaultCreateNode {
        node: Node,
        reply: Reply<CreateNodeReply>,
    },
    VaultFetchNode {
        node_idx: u32,
        reply: Reply<FetchNodeReply>,
    },
    VaultUpdateNode {
        node: Node,
        /// Revision to broadcast; nil means "assign a fresh one".
        revision: Uuid,
        /// Internal updates skip the game-server arbitration.
        internal: bool,
        reply: Reply<NetResult>,
    },
    VaultRefNode {
        parent: u32,
        child: u32,
        owner: u32,
        reply: Reply<NetResult>,
    },
    VaultUnrefNode {
        parent: u32,
        child: u32,
        reply: Reply<NetResult>,
    },
    VaultSendNode {
        node_idx: u32,
        to_player: u32,
        from_player: u32,
        reply: Reply<NetResult>,
    },
    VaultFetchTree {
        node_idx: u32,
        reply: Reply<FetchTreeReply>,
    },
    VaultFindNode {
        template: Node,
        reply: Reply<FindNodesReply>,
    },
    /// Begin shutdown: close clients, drain, release the database.
    Shutdown,
}
