//! Canonical subtree construction and startup bootstrap.
//!
//! Player creation and age creation materialize fixed trees of folder
//! nodes; the folder lists are compile-time tables. Everything here goes
//! through [`VaultStore`], so creation stamps and index allocation are
//! uniform with ad-hoc node creation.

use snafu::ResultExt;
use sqlx::PgPool;
use uuid::Uuid;

use relto_types::{NodeType, StandardNode};
use relto_vault::Node;

use crate::error::{DatabaseSnafu, Result};
use crate::vault::VaultStore;

/// Folders every new player receives, with their container node type.
const PLAYER_FOLDERS: &[(NodeType, StandardNode)] = &[
    (NodeType::Folder, StandardNode::InboxFolder),
    (NodeType::Folder, StandardNode::BuddyListFolder),
    (NodeType::Folder, StandardNode::IgnoreListFolder),
    (NodeType::Folder, StandardNode::PeopleIKnowAboutFolder),
    (NodeType::Folder, StandardNode::ChronicleFolder),
    (NodeType::Folder, StandardNode::AgeJournalsFolder),
    (NodeType::Folder, StandardNode::DeviceInboxFolder),
    (NodeType::Folder, StandardNode::AvatarOutfitFolder),
    (NodeType::Folder, StandardNode::AvatarClosetFolder),
    (NodeType::Folder, StandardNode::PlayerInviteFolder),
    (NodeType::AgeInfoList, StandardNode::AgesIOwnFolder),
    (NodeType::AgeInfoList, StandardNode::AgesICanVisitFolder),
];

/// Folders attached directly to a new Age node.
const AGE_FOLDERS: &[(NodeType, StandardNode)] = &[
    (NodeType::Folder, StandardNode::ChronicleFolder),
    (NodeType::Folder, StandardNode::SubAgesFolder),
    (NodeType::Folder, StandardNode::AgeDevicesFolder),
];

/// Folders attached to a new AgeInfo node.
const AGE_INFO_FOLDERS: &[(NodeType, StandardNode)] = &[
    (NodeType::PlayerInfoList, StandardNode::AgeOwnersFolder),
    (NodeType::PlayerInfoList, StandardNode::CanVisitFolder),
    (NodeType::AgeInfoList, StandardNode::ChildAgesFolder),
];

/// Parameters for creating an age instance's vault tree.
#[derive(Debug, Clone, Default)]
pub struct AgeSpec {
    pub instance_uuid: Uuid,
    pub parent_uuid: Uuid,
    pub filename: String,
    pub instance_name: String,
    pub user_name: String,
    pub description: String,
    pub sequence: i32,
    pub language: i32,
    pub public: bool,
}

/// Subtree builders and startup bootstrap over the vault graph.
pub struct TemplateStore;

impl TemplateStore {
    /// Builds the canonical subtree for a new player.
    ///
    /// Returns `(player_idx, player_info_idx, hood_owners_folder)`; the
    /// caller links the info node into the neighborhood and AllPlayers
    /// and broadcasts those edges.
    pub async fn create_player(
        pool: &PgPool,
        acct_uuid: Uuid,
        player_name: &str,
        avatar_shape: &str,
        explorer: u32,
    ) -> Result<(u32, u32, u32)> {
        let mut player = Node::new();
        player.set_node_type(NodeType::Player.raw());
        player.set_creator_uuid(acct_uuid);
        player.set_uuid_1(acct_uuid);
        player.set_istring64_1(player_name);
        player.set_string64_1(avatar_shape);
        player.set_int32_2(explorer as i32);
        let player_idx = VaultStore::create(pool, &player).await?;

        let mut info = Node::new();
        info.set_node_type(NodeType::PlayerInfo.raw());
        info.set_creator_uuid(acct_uuid);
        info.set_creator_idx(player_idx);
        info.set_uint32_1(player_idx);
        info.set_int32_1(0);
        info.set_string64_1("");
        info.set_uuid_1(Uuid::nil());
        info.set_istring64_1(player_name);
        let info_idx = VaultStore::create(pool, &info).await?;
        VaultStore::ref_node(pool, player_idx, info_idx, 0).await?;

        for (node_type, folder) in PLAYER_FOLDERS {
            let mut node = Node::new();
            node.set_node_type(node_type.raw());
            node.set_creator_uuid(acct_uuid);
            node.set_creator_idx(player_idx);
            node.set_int32_1(folder.raw());
            let folder_idx = VaultStore::create(pool, &node).await?;
            VaultStore::ref_node(pool, player_idx, folder_idx, 0).await?;
        }

        let hood_owners = Self::find_or_create_hood(pool).await?;
        Ok((player_idx, info_idx, hood_owners))
    }

    /// Builds the canonical subtree for a new age instance.
    ///
    /// Returns `(age_idx, info_idx)`.
    pub async fn create_age(pool: &PgPool, spec: &AgeSpec) -> Result<(u32, u32)> {
        let mut age = Node::new();
        age.set_node_type(NodeType::Age.raw());
        age.set_creator_uuid(spec.instance_uuid);
        age.set_create_age_name(spec.filename.clone());
        age.set_create_age_uuid(spec.instance_uuid);
        age.set_uuid_1(spec.instance_uuid);
        if !spec.parent_uuid.is_nil() {
            age.set_uuid_2(spec.parent_uuid);
        }
        age.set_string64_1(spec.filename.clone());
        let age_idx = VaultStore::create(pool, &age).await?;

        for (node_type, folder) in AGE_FOLDERS {
            let mut node = Node::new();
            node.set_node_type(node_type.raw());
            node.set_creator_uuid(spec.instance_uuid);
            node.set_creator_idx(age_idx);
            node.set_int32_1(folder.raw());
            let folder_idx = VaultStore::create(pool, &node).await?;
            VaultStore::ref_node(pool, age_idx, folder_idx, 0).await?;
        }

        let mut info = Node::new();
        info.set_node_type(NodeType::AgeInfo.raw());
        info.set_creator_uuid(spec.instance_uuid);
        info.set_creator_idx(age_idx);
        info.set_int32_1(spec.sequence);
        info.set_int32_2(i32::from(spec.public));
        info.set_int32_3(spec.language);
        info.set_uint32_1(age_idx);
        info.set_uuid_1(spec.instance_uuid);
        if !spec.parent_uuid.is_nil() {
            info.set_uuid_2(spec.parent_uuid);
        }
        info.set_string64_2(spec.filename.clone());
        info.set_string64_3(spec.instance_name.clone());
        if !spec.user_name.is_empty() {
            info.set_string64_4(spec.user_name.clone());
        }
        if !spec.description.is_empty() {
            info.set_text_1(spec.description.clone());
        }
        let info_idx = VaultStore::create(pool, &info).await?;
        VaultStore::ref_node(pool, age_idx, info_idx, 0).await?;

        for (node_type, folder) in AGE_INFO_FOLDERS {
            let mut node = Node::new();
            node.set_node_type(node_type.raw());
            node.set_creator_uuid(spec.instance_uuid);
            node.set_creator_idx(info_idx);
            node.set_int32_1(folder.raw());
            let folder_idx = VaultStore::create(pool, &node).await?;
            VaultStore::ref_node(pool, info_idx, folder_idx, 0).await?;
        }

        // The instance SDL hook carries the age's local state blob.
        let mut sdl = Node::new();
        sdl.set_node_type(NodeType::Sdl.raw());
        sdl.set_creator_uuid(spec.instance_uuid);
        sdl.set_creator_idx(age_idx);
        sdl.set_int32_1(StandardNode::AgeInstanceSdlNode.raw());
        sdl.set_string64_1(spec.filename.clone());
        sdl.set_blob_1(Vec::new());
        let sdl_idx = VaultStore::create(pool, &sdl).await?;
        VaultStore::ref_node(pool, age_idx, sdl_idx, 0).await?;

        Ok((age_idx, info_idx))
    }

    /// Finds the public neighborhood new players join, creating it on
    /// first use. Returns the hood's AgeOwnersFolder index.
    pub async fn find_or_create_hood(pool: &PgPool) -> Result<u32> {
        let mut template = Node::new();
        template.set_node_type(NodeType::AgeInfo.raw());
        template.set_int32_2(1);
        template.set_string64_2("Neighborhood");
        let hoods = VaultStore::find_nodes(pool, &template).await?;

        let info_idx = match hoods.first() {
            Some(info_idx) => *info_idx,
            None => {
                let spec = AgeSpec {
                    instance_uuid: Uuid::new_v4(),
                    filename: "Neighborhood".to_string(),
                    instance_name: "Hood".to_string(),
                    user_name: "Relto".to_string(),
                    description: "Relto Hood".to_string(),
                    public: true,
                    ..AgeSpec::default()
                };
                let (_, info_idx) = Self::create_age(pool, &spec).await?;
                info_idx
            }
        };

        match VaultStore::find_folder(pool, info_idx, StandardNode::AgeOwnersFolder).await? {
            Some(folder) => Ok(folder),
            None => {
                tracing::error!(info_idx, "Neighborhood has no AgeOwnersFolder");
                Ok(0)
            }
        }
    }

    /// Finds or creates the AllPlayers folder, returning its index.
    ///
    /// Run once at daemon start; the index is cached for the process
    /// lifetime.
    pub async fn ensure_all_players(pool: &PgPool) -> Result<u32> {
        let mut template = Node::new();
        template.set_node_type(NodeType::PlayerInfoList.raw());
        template.set_int32_1(StandardNode::AllPlayersFolder.raw());
        let found = VaultStore::find_nodes(pool, &template).await?;
        if let Some(idx) = found.first() {
            return Ok(*idx);
        }

        let mut node = Node::new();
        node.set_node_type(NodeType::PlayerInfoList.raw());
        node.set_int32_1(StandardNode::AllPlayersFolder.raw());
        VaultStore::create(pool, &node).await
    }

    /// Finds or creates the System node with its GlobalInbox.
    pub async fn ensure_system_node(pool: &PgPool) -> Result<u32> {
        let mut template = Node::new();
        template.set_node_type(NodeType::System.raw());
        let found = VaultStore::find_nodes(pool, &template).await?;
        if let Some(idx) = found.first() {
            return Ok(*idx);
        }

        let mut system = Node::new();
        system.set_node_type(NodeType::System.raw());
        let system_idx = VaultStore::create(pool, &system).await?;

        let mut inbox = Node::new();
        inbox.set_node_type(NodeType::Folder.raw());
        inbox.set_int32_1(StandardNode::GlobalInboxFolder.raw());
        let inbox_idx = VaultStore::create(pool, &inbox).await?;
        VaultStore::ref_node(pool, system_idx, inbox_idx, 0).await?;

        Ok(system_idx)
    }

    /// Marks every PlayerInfo node offline. Run once at daemon start so
    /// stale online flags from an unclean shutdown don't linger.
    pub async fn mark_all_offline(pool: &PgPool) -> Result<u64> {
        let done = sqlx::query(
            "UPDATE vault.\"Nodes\" SET \"Int32_1\"=0 WHERE \"NodeType\"=$1",
        )
        .bind(NodeType::PlayerInfo.raw())
        .execute(pool)
        .await
        .context(DatabaseSnafu)?;
        Ok(done.rows_affected())
    }
}
