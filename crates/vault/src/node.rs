//! The sparse vault node record.
//!
//! A node is a presence bitmask plus per-field storage. Fields are public
//! for row-materialization in the store layer, which fills them together
//! with an explicit mask; everyone else should go through the `set_*`
//! methods, which keep the mask in sync.

use uuid::Uuid;

use crate::fields;

/// A sparse typed record in the vault graph.
///
/// Two nodes compare equal iff their masks are identical and every set
/// field compares equal; the `IString64_*` fields compare
/// case-insensitively. A node with an empty mask is the null node.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Presence bitmask, one bit per field (see [`fields`]).
    pub fields: u64,
    pub node_idx: u32,
    pub create_time: u32,
    pub modify_time: u32,
    pub create_age_name: String,
    pub create_age_uuid: Uuid,
    pub creator_uuid: Uuid,
    pub creator_idx: u32,
    pub node_type: i32,
    pub int32_1: i32,
    pub int32_2: i32,
    pub int32_3: i32,
    pub int32_4: i32,
    pub uint32_1: u32,
    pub uint32_2: u32,
    pub uint32_3: u32,
    pub uint32_4: u32,
    pub uuid_1: Uuid,
    pub uuid_2: Uuid,
    pub uuid_3: Uuid,
    pub uuid_4: Uuid,
    pub string64_1: String,
    pub string64_2: String,
    pub string64_3: String,
    pub string64_4: String,
    pub string64_5: String,
    pub string64_6: String,
    pub istring64_1: String,
    pub istring64_2: String,
    pub text_1: String,
    pub text_2: String,
    pub blob_1: Vec<u8>,
    pub blob_2: Vec<u8>,
}

macro_rules! setter {
    ($(#[$meta:meta])* $name:ident, $field:ident, $bit:path, $ty:ty) => {
        $(#[$meta])*
        pub fn $name(&mut self, value: $ty) {
            self.fields |= $bit;
            self.$field = value.into();
        }
    };
}

impl Node {
    /// Creates the null node.
    pub fn new() -> Self {
        Node::default()
    }

    /// True iff no field is present.
    pub const fn is_null(&self) -> bool {
        self.fields == 0
    }

    /// True iff the given field bit is present.
    pub const fn has(&self, bit: u64) -> bool {
        self.fields & bit != 0
    }

    setter!(set_node_idx, node_idx, fields::NODE_IDX, u32);
    setter!(set_create_time, create_time, fields::CREATE_TIME, u32);
    setter!(set_modify_time, modify_time, fields::MODIFY_TIME, u32);
    setter!(set_create_age_name, create_age_name, fields::CREATE_AGE_NAME, impl Into<String>);
    setter!(set_create_age_uuid, create_age_uuid, fields::CREATE_AGE_UUID, Uuid);
    setter!(set_creator_uuid, creator_uuid, fields::CREATOR_UUID, Uuid);
    setter!(set_creator_idx, creator_idx, fields::CREATOR_IDX, u32);
    setter!(set_node_type, node_type, fields::NODE_TYPE, i32);
    setter!(set_int32_1, int32_1, fields::INT32_1, i32);
    setter!(set_int32_2, int32_2, fields::INT32_2, i32);
    setter!(set_int32_3, int32_3, fields::INT32_3, i32);
    setter!(set_int32_4, int32_4, fields::INT32_4, i32);
    setter!(set_uint32_1, uint32_1, fields::UINT32_1, u32);
    setter!(set_uint32_2, uint32_2, fields::UINT32_2, u32);
    setter!(set_uint32_3, uint32_3, fields::UINT32_3, u32);
    setter!(set_uint32_4, uint32_4, fields::UINT32_4, u32);
    setter!(set_uuid_1, uuid_1, fields::UUID_1, Uuid);
    setter!(set_uuid_2, uuid_2, fields::UUID_2, Uuid);
    setter!(set_uuid_3, uuid_3, fields::UUID_3, Uuid);
    setter!(set_uuid_4, uuid_4, fields::UUID_4, Uuid);
    setter!(set_string64_1, string64_1, fields::STRING64_1, impl Into<String>);
    setter!(set_string64_2, string64_2, fields::STRING64_2, impl Into<String>);
    setter!(set_string64_3, string64_3, fields::STRING64_3, impl Into<String>);
    setter!(set_string64_4, string64_4, fields::STRING64_4, impl Into<String>);
    setter!(set_string64_5, string64_5, fields::STRING64_5, impl Into<String>);
    setter!(set_string64_6, string64_6, fields::STRING64_6, impl Into<String>);
    setter!(set_istring64_1, istring64_1, fields::ISTRING64_1, impl Into<String>);
    setter!(set_istring64_2, istring64_2, fields::ISTRING64_2, impl Into<String>);
    setter!(set_text_1, text_1, fields::TEXT_1, impl Into<String>);
    setter!(set_text_2, text_2, fields::TEXT_2, impl Into<String>);
    setter!(set_blob_1, blob_1, fields::BLOB_1, Vec<u8>);
    setter!(set_blob_2, blob_2, fields::BLOB_2, Vec<u8>);
}

macro_rules! field_eq {
    ($lhs:expr, $rhs:expr, $bit:path, $field:ident) => {
        if $lhs.fields & $bit != 0 && $lhs.$field != $rhs.$field {
            return false;
        }
    };
    (icase $lhs:expr, $rhs:expr, $bit:path, $field:ident) => {
        if $lhs.fields & $bit != 0
            && $lhs.$field.to_lowercase() != $rhs.$field.to_lowercase()
        {
            return false;
        }
    };
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.fields != other.fields {
            return false;
        }
        field_eq!(self, other, fields::NODE_IDX, node_idx);
        field_eq!(self, other, fields::CREATE_TIME, create_time);
        field_eq!(self, other, fields::MODIFY_TIME, modify_time);
        field_eq!(self, other, fields::CREATE_AGE_NAME, create_age_name);
        field_eq!(self, other, fields::CREATE_AGE_UUID, create_age_uuid);
        field_eq!(self, other, fields::CREATOR_UUID, creator_uuid);
        field_eq!(self, other, fields::CREATOR_IDX, creator_idx);
        field_eq!(self, other, fields::NODE_TYPE, node_type);
        field_eq!(self, other, fields::INT32_1, int32_1);
        field_eq!(self, other, fields::INT32_2, int32_2);
        field_eq!(self, other, fields::INT32_3, int32_3);
        field_eq!(self, other, fields::INT32_4, int32_4);
        field_eq!(self, other, fields::UINT32_1, uint32_1);
        field_eq!(self, other, fields::UINT32_2, uint32_2);
        field_eq!(self, other, fields::UINT32_3, uint32_3);
        field_eq!(self, other, fields::UINT32_4, uint32_4);
        field_eq!(self, other, fields::UUID_1, uuid_1);
        field_eq!(self, other, fields::UUID_2, uuid_2);
        field_eq!(self, other, fields::UUID_3, uuid_3);
        field_eq!(self, other, fields::UUID_4, uuid_4);
        field_eq!(self, other, fields::STRING64_1, string64_1);
        field_eq!(self, other, fields::STRING64_2, string64_2);
        field_eq!(self, other, fields::STRING64_3, string64_3);
        field_eq!(self, other, fields::STRING64_4, string64_4);
        field_eq!(self, other, fields::STRING64_5, string64_5);
        field_eq!(self, other, fields::STRING64_6, string64_6);
        field_eq!(icase self, other, fields::ISTRING64_1, istring64_1);
        field_eq!(icase self, other, fields::ISTRING64_2, istring64_2);
        field_eq!(self, other, fields::TEXT_1, text_1);
        field_eq!(self, other, fields::TEXT_2, text_2);
        field_eq!(self, other, fields::BLOB_1, blob_1);
        field_eq!(self, other, fields::BLOB_2, blob_2);
        true
    }
}

impl Eq for Node {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_node() {
        let node = Node::new();
        assert!(node.is_null());

        let mut node = Node::new();
        node.set_node_idx(1);
        assert!(!node.is_null());
    }

    #[test]
    fn test_setters_maintain_mask() {
        let mut node = Node::new();
        node.set_node_type(23);
        node.set_string64_1("Relto");
        assert!(node.has(fields::NODE_TYPE));
        assert!(node.has(fields::STRING64_1));
        assert!(!node.has(fields::STRING64_2));
    }

    #[test]
    fn test_equality_requires_identical_masks() {
        let mut a = Node::new();
        a.set_uint32_1(7);
        let mut b = a.clone();
        assert_eq!(a, b);

        b.set_int32_1(0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_unset_fields_are_ignored() {
        let mut a = Node::new();
        a.set_uint32_1(7);
        let mut b = a.clone();
        // Divergent storage behind an unset bit must not affect equality.
        b.string64_1 = "garbage".to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn test_istring_compares_case_insensitively() {
        let mut a = Node::new();
        a.set_istring64_1("Zandi");
        let mut b = Node::new();
        b.set_istring64_1("zANDI");
        assert_eq!(a, b);

        let mut c = Node::new();
        c.set_string64_1("Zandi");
        let mut d = Node::new();
        d.set_string64_1("zANDI");
        assert_ne!(c, d);
    }
}
