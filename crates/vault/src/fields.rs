//! Field presence bits for the sparse node record.
//!
//! One bit per field, assigned in ordinal order. Serialization emits set
//! fields in exactly this order, so these values double as the wire
//! layout; they must never be renumbered.

/// `NodeIdx: u32`, primary key, 0 = invalid/null.
pub const NODE_IDX: u64 = 1 << 0;
/// `CreateTime: u32`, seconds since epoch.
pub const CREATE_TIME: u64 = 1 << 1;
/// `ModifyTime: u32`, seconds since epoch.
pub const MODIFY_TIME: u64 = 1 << 2;
/// `CreateAgeName: str`.
pub const CREATE_AGE_NAME: u64 = 1 << 3;
/// `CreateAgeUuid: uuid`.
pub const CREATE_AGE_UUID: u64 = 1 << 4;
/// `CreatorUuid: uuid`.
pub const CREATOR_UUID: u64 = 1 << 5;
/// `CreatorIdx: u32`.
pub const CREATOR_IDX: u64 = 1 << 6;
/// `NodeType: i32`, see [`relto_types::NodeType`].
pub const NODE_TYPE: u64 = 1 << 7;
pub const INT32_1: u64 = 1 << 8;
pub const INT32_2: u64 = 1 << 9;
pub const INT32_3: u64 = 1 << 10;
pub const INT32_4: u64 = 1 << 11;
pub const UINT32_1: u64 = 1 << 12;
pub const UINT32_2: u64 = 1 << 13;
pub const UINT32_3: u64 = 1 << 14;
pub const UINT32_4: u64 = 1 << 15;
pub const UUID_1: u64 = 1 << 16;
pub const UUID_2: u64 = 1 << 17;
pub const UUID_3: u64 = 1 << 18;
pub const UUID_4: u64 = 1 << 19;
pub const STRING64_1: u64 = 1 << 20;
pub const STRING64_2: u64 = 1 << 21;
pub const STRING64_3: u64 = 1 << 22;
pub const STRING64_4: u64 = 1 << 23;
pub const STRING64_5: u64 = 1 << 24;
pub const STRING64_6: u64 = 1 << 25;
/// Case-insensitive comparison.
pub const ISTRING64_1: u64 = 1 << 26;
/// Case-insensitive comparison.
pub const ISTRING64_2: u64 = 1 << 27;
pub const TEXT_1: u64 = 1 << 28;
pub const TEXT_2: u64 = 1 << 29;
pub const BLOB_1: u64 = 1 << 30;
pub const BLOB_2: u64 = 1 << 31;

/// Every defined field bit.
pub const ALL: u64 = (1 << 32) - 1;
