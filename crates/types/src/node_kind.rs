//! Vault node and folder type discriminators.
//!
//! Both enums carry stable wire values. [`NodeType`] discriminates the
//! record itself; [`StandardNode`] is stored in `Int32_1` of Folder,
//! PlayerInfoList, and AgeInfoList nodes to identify the canonical
//! folders of the player and age subtrees.

/// Discriminator stored in a vault node's `NodeType` field.
///
/// The gap between `Ccr` and `Folder` is historical; the intermediate
/// values were manager-internal types that never reach the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum NodeType {
    Invalid = 0,
    VNode = 1,
    Player = 2,
    Age = 3,
    GameServer = 4,
    AdminMgr = 5,
    VaultServer = 6,
    Ccr = 7,
    Folder = 22,
    PlayerInfo = 23,
    System = 24,
    Image = 25,
    TextNote = 26,
    Sdl = 27,
    AgeLink = 28,
    Chronicle = 29,
    PlayerInfoList = 30,
    Unused = 31,
    Marker = 32,
    AgeInfo = 33,
    AgeInfoList = 34,
    MarkerList = 35,
}

impl NodeType {
    /// Returns the wire value.
    pub const fn raw(self) -> i32 {
        self as i32
    }

    /// Decodes a wire value; unknown values map to `None`.
    pub const fn from_raw(value: i32) -> Option<Self> {
        Some(match value {
            0 => NodeType::Invalid,
            1 => NodeType::VNode,
            2 => NodeType::Player,
            3 => NodeType::Age,
            4 => NodeType::GameServer,
            5 => NodeType::AdminMgr,
            6 => NodeType::VaultServer,
            7 => NodeType::Ccr,
            22 => NodeType::Folder,
            23 => NodeType::PlayerInfo,
            24 => NodeType::System,
            25 => NodeType::Image,
            26 => NodeType::TextNote,
            27 => NodeType::Sdl,
            28 => NodeType::AgeLink,
            29 => NodeType::Chronicle,
            30 => NodeType::PlayerInfoList,
            31 => NodeType::Unused,
            32 => NodeType::Marker,
            33 => NodeType::AgeInfo,
            34 => NodeType::AgeInfoList,
            35 => NodeType::MarkerList,
            _ => return None,
        })
    }
}

/// Canonical folder identities for the standard player/age subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StandardNode {
    UserDefined = 0,
    InboxFolder = 1,
    BuddyListFolder = 2,
    IgnoreListFolder = 3,
    PeopleIKnowAboutFolder = 4,
    VaultMgrGlobalDataFolder = 5,
    ChronicleFolder = 6,
    AvatarOutfitFolder = 7,
    AgeTypeJournalFolder = 8,
    SubAgesFolder = 9,
    DeviceInboxFolder = 10,
    HoodMembersFolder = 11,
    AllPlayersFolder = 12,
    AgeMembersFolder = 13,
    AgeJournalsFolder = 14,
    AgeDevicesFolder = 15,
    AgeInstanceSdlNode = 16,
    AgeGlobalSdlNode = 17,
    CanVisitFolder = 18,
    AgeOwnersFolder = 19,
    AllAgeGlobalSdlNodesFolder = 20,
    PlayerInfoNode = 21,
    PublicAgesFolder = 22,
    AgesIOwnFolder = 23,
    AgesICanVisitFolder = 24,
    AvatarClosetFolder = 25,
    AgeInfoNode = 26,
    SystemNode = 27,
    PlayerInviteFolder = 28,
    CcrPlayersFolder = 29,
    GlobalInboxFolder = 30,
    ChildAgesFolder = 31,
    GameScoresFolder = 32,
}

impl StandardNode {
    /// Returns the wire value.
    pub const fn raw(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_roundtrip() {
        for raw in 0..=35 {
            if let Some(node_type) = NodeType::from_raw(raw) {
                assert_eq!(node_type.raw(), raw);
            }
        }
    }

    #[test]
    fn test_manager_gap_is_unknown() {
        // 8..=21 were manager-internal types and never reach the wire.
        for raw in 8..22 {
            assert_eq!(NodeType::from_raw(raw), None);
        }
    }

    #[test]
    fn test_folder_values_are_stable() {
        assert_eq!(StandardNode::InboxFolder.raw(), 1);
        assert_eq!(StandardNode::AllPlayersFolder.raw(), 12);
        assert_eq!(StandardNode::AgeOwnersFolder.raw(), 19);
        assert_eq!(StandardNode::AgesIOwnFolder.raw(), 23);
    }
}
