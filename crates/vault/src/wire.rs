//! Deterministic ordinal serializer for vault nodes.
//!
//! Layout: the `u64` presence mask (little-endian), then every set field
//! in ordinal order. Strings are length-prefixed UTF-16LE; the u32
//! prefix is a byte count that includes the terminating NUL code unit.
//! Uuids use the classic mixed-endian GUID layout the wire has always
//! carried. Blobs are a u32 length plus raw bytes.
//!
//! `read_node(write_node(n)) == n` byte-for-byte; the reader rejects
//! malformed input rather than guessing.

use snafu::Snafu;
use uuid::Uuid;

use crate::fields;
use crate::node::Node;

/// Errors produced while decoding a node from the wire.
#[derive(Debug, Snafu)]
pub enum WireError {
    /// The buffer ended before the announced content.
    #[snafu(display("Node data truncated at offset {offset}"))]
    Truncated {
        /// Byte offset where more data was expected.
        offset: usize,
    },

    /// A string's byte count was not a whole number of UTF-16 units.
    #[snafu(display("String with odd byte count {count} at offset {offset}"))]
    OddStringLength {
        /// The announced byte count.
        count: u32,
        /// Byte offset of the length prefix.
        offset: usize,
    },
}

/// Result type for wire decoding.
pub type Result<T> = std::result::Result<T, WireError>;

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => TruncatedSnafu { offset: self.pos }.fail(),
        }
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(self.u32()? as i32)
    }

    fn u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn uuid(&mut self) -> Result<Uuid> {
        let data1 = self.u32()?;
        let data2 = self.u16()?;
        let data3 = self.u16()?;
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(self.take(8)?);
        Ok(Uuid::from_fields(data1, data2, data3, &data4))
    }

    fn string(&mut self) -> Result<String> {
        let prefix_offset = self.pos;
        let count = self.u32()?;
        if count % 2 != 0 {
            return OddStringLengthSnafu { count, offset: prefix_offset }.fail();
        }
        let bytes = self.take(count as usize)?;
        let mut units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        // The byte count includes the terminating NUL; strip it.
        if units.last() == Some(&0) {
            units.pop();
        }
        Ok(String::from_utf16_lossy(&units))
    }

    fn blob(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()?;
        Ok(self.take(len as usize)?.to_vec())
    }
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Writes one length-prefixed UTF-16LE wire string.
pub fn write_wire_string(out: &mut Vec<u8>, value: &str) {
    let units: Vec<u16> = value.encode_utf16().collect();
    write_u32(out, ((units.len() + 1) * 2) as u32);
    for unit in &units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
}

/// Reads one length-prefixed UTF-16LE wire string.
pub fn read_wire_string(data: &[u8]) -> Result<(String, usize)> {
    let mut reader = Reader { data, pos: 0 };
    let value = reader.string()?;
    Ok((value, reader.pos))
}

/// Writes a uuid in the mixed-endian GUID wire layout.
pub fn write_wire_uuid(out: &mut Vec<u8>, value: &Uuid) {
    let (data1, data2, data3, data4) = value.as_fields();
    write_u32(out, data1);
    out.extend_from_slice(&data2.to_le_bytes());
    out.extend_from_slice(&data3.to_le_bytes());
    out.extend_from_slice(data4);
}

/// Serializes a node, set fields in ordinal order.
pub fn write_node(node: &Node, out: &mut Vec<u8>) {
    out.extend_from_slice(&node.fields.to_le_bytes());

    macro_rules! emit {
        ($bit:path, $write:expr) => {
            if node.fields & $bit != 0 {
                $write;
            }
        };
    }

    emit!(fields::NODE_IDX, write_u32(out, node.node_idx));
    emit!(fields::CREATE_TIME, write_u32(out, node.create_time));
    emit!(fields::MODIFY_TIME, write_u32(out, node.modify_time));
    emit!(fields::CREATE_AGE_NAME, write_wire_string(out, &node.create_age_name));
    emit!(fields::CREATE_AGE_UUID, write_wire_uuid(out, &node.create_age_uuid));
    emit!(fields::CREATOR_UUID, write_wire_uuid(out, &node.creator_uuid));
    emit!(fields::CREATOR_IDX, write_u32(out, node.creator_idx));
    emit!(fields::NODE_TYPE, write_u32(out, node.node_type as u32));
    emit!(fields::INT32_1, write_u32(out, node.int32_1 as u32));
    emit!(fields::INT32_2, write_u32(out, node.int32_2 as u32));
    emit!(fields::INT32_3, write_u32(out, node.int32_3 as u32));
    emit!(fields::INT32_4, write_u32(out, node.int32_4 as u32));
    emit!(fields::UINT32_1, write_u32(out, node.uint32_1));
    emit!(fields::UINT32_2, write_u32(out, node.uint32_2));
    emit!(fields::UINT32_3, write_u32(out, node.uint32_3));
    emit!(fields::UINT32_4, write_u32(out, node.uint32_4));
    emit!(fields::UUID_1, write_wire_uuid(out, &node.uuid_1));
    emit!(fields::UUID_2, write_wire_uuid(out, &node.uuid_2));
    emit!(fields::UUID_3, write_wire_uuid(out, &node.uuid_3));
    emit!(fields::UUID_4, write_wire_uuid(out, &node.uuid_4));
    emit!(fields::STRING64_1, write_wire_string(out, &node.string64_1));
    emit!(fields::STRING64_2, write_wire_string(out, &node.string64_2));
    emit!(fields::STRING64_3, write_wire_string(out, &node.string64_3));
    emit!(fields::STRING64_4, write_wire_string(out, &node.string64_4));
    emit!(fields::STRING64_5, write_wire_string(out, &node.string64_5));
    emit!(fields::STRING64_6, write_wire_string(out, &node.string64_6));
    emit!(fields::ISTRING64_1, write_wire_string(out, &node.istring64_1));
    emit!(fields::ISTRING64_2, write_wire_string(out, &node.istring64_2));
    emit!(fields::TEXT_1, write_wire_string(out, &node.text_1));
    emit!(fields::TEXT_2, write_wire_string(out, &node.text_2));
    emit!(fields::BLOB_1, {
        write_u32(out, node.blob_1.len() as u32);
        out.extend_from_slice(&node.blob_1);
    });
    emit!(fields::BLOB_2, {
        write_u32(out, node.blob_2.len() as u32);
        out.extend_from_slice(&node.blob_2);
    });
}

/// Deserializes a node written by [`write_node`].
pub fn read_node(data: &[u8]) -> Result<Node> {
    let mut reader = Reader { data, pos: 0 };
    let mut node = Node::new();
    node.fields = reader.u64()?;

    macro_rules! fill {
        ($bit:path, $field:ident, $read:expr) => {
            if node.fields & $bit != 0 {
                node.$field = $read;
            }
        };
    }

    fill!(fields::NODE_IDX, node_idx, reader.u32()?);
    fill!(fields::CREATE_TIME, create_time, reader.u32()?);
    fill!(fields::MODIFY_TIME, modify_time, reader.u32()?);
    fill!(fields::CREATE_AGE_NAME, create_age_name, reader.string()?);
    fill!(fields::CREATE_AGE_UUID, create_age_uuid, reader.uuid()?);
    fill!(fields::CREATOR_UUID, creator_uuid, reader.uuid()?);
    fill!(fields::CREATOR_IDX, creator_idx, reader.u32()?);
    fill!(fields::NODE_TYPE, node_type, reader.i32()?);
    fill!(fields::INT32_1, int32_1, reader.i32()?);
    fill!(fields::INT32_2, int32_2, reader.i32()?);
    fill!(fields::INT32_3, int32_3, reader.i32()?);
    fill!(fields::INT32_4, int32_4, reader.i32()?);
    fill!(fields::UINT32_1, uint32_1, reader.u32()?);
    fill!(fields::UINT32_2, uint32_2, reader.u32()?);
    fill!(fields::UINT32_3, uint32_3, reader.u32()?);
    fill!(fields::UINT32_4, uint32_4, reader.u32()?);
    fill!(fields::UUID_1, uuid_1, reader.uuid()?);
    fill!(fields::UUID_2, uuid_2, reader.uuid()?);
    fill!(fields::UUID_3, uuid_3, reader.uuid()?);
    fill!(fields::UUID_4, uuid_4, reader.uuid()?);
    fill!(fields::STRING64_1, string64_1, reader.string()?);
    fill!(fields::STRING64_2, string64_2, reader.string()?);
    fill!(fields::STRING64_3, string64_3, reader.string()?);
    fill!(fields::STRING64_4, string64_4, reader.string()?);
    fill!(fields::STRING64_5, string64_5, reader.string()?);
    fill!(fields::STRING64_6, string64_6, reader.string()?);
    fill!(fields::ISTRING64_1, istring64_1, reader.string()?);
    fill!(fields::ISTRING64_2, istring64_2, reader.string()?);
    fill!(fields::TEXT_1, text_1, reader.string()?);
    fill!(fields::TEXT_2, text_2, reader.string()?);
    fill!(fields::BLOB_1, blob_1, reader.blob()?);
    fill!(fields::BLOB_2, blob_2, reader.blob()?);

    Ok(node)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn sample_node() -> Node {
        let mut node = Node::new();
        node.set_node_idx(4242);
        node.set_create_time(1_700_000_000);
        node.set_modify_time(1_700_000_100);
        node.set_create_age_name("Neighborhood");
        node.set_create_age_uuid(Uuid::from_u128(0x1122_3344_5566_7788_99aa_bbcc_ddee_ff00));
        node.set_node_type(relto_types::NodeType::PlayerInfo.raw());
        node.set_int32_1(-5);
        node.set_uint32_1(977);
        node.set_uuid_1(Uuid::from_u128(7));
        node.set_string64_1("Bevin");
        node.set_istring64_1("Zandi");
        node.set_text_1("a much longer body of text");
        node.set_blob_1(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        node
    }

    #[test]
    fn test_roundtrip_is_byte_exact() {
        let node = sample_node();
        let mut wire = Vec::new();
        write_node(&node, &mut wire);

        let decoded = read_node(&wire).expect("decode node");
        assert_eq!(decoded, node);

        let mut rewire = Vec::new();
        write_node(&decoded, &mut rewire);
        assert_eq!(wire, rewire);
    }

    #[test]
    fn test_null_node_is_eight_bytes() {
        let mut wire = Vec::new();
        write_node(&Node::new(), &mut wire);
        assert_eq!(wire, vec![0u8; 8]);

        let decoded = read_node(&wire).expect("decode null node");
        assert!(decoded.is_null());
    }

    #[test]
    fn test_string_prefix_counts_terminator() {
        let mut out = Vec::new();
        write_wire_string(&mut out, "ab");
        // 2 units + NUL = 6 bytes announced.
        assert_eq!(&out[0..4], &6u32.to_le_bytes());
        assert_eq!(out.len(), 4 + 6);
        assert_eq!(&out[out.len() - 2..], &[0, 0]);

        let (value, consumed) = read_wire_string(&out).expect("read string");
        assert_eq!(value, "ab");
        assert_eq!(consumed, out.len());
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let node = sample_node();
        let mut wire = Vec::new();
        write_node(&node, &mut wire);
        for len in 0..wire.len() {
            assert!(read_node(&wire[..len]).is_err(), "prefix of {len} bytes decoded");
        }
    }

    #[test]
    fn test_odd_string_length_is_rejected() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&fields::CREATE_AGE_NAME.to_le_bytes());
        wire.extend_from_slice(&3u32.to_le_bytes());
        wire.extend_from_slice(&[0x41, 0x00, 0x42]);
        assert!(matches!(
            read_node(&wire),
            Err(WireError::OddStringLength { count: 3, .. })
        ));
    }

    #[test]
    fn test_uuid_wire_layout_is_mixed_endian() {
        let uuid = Uuid::from_fields(
            0x00112233,
            0x4455,
            0x6677,
            &[0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
        );
        let mut out = Vec::new();
        write_wire_uuid(&mut out, &uuid);
        assert_eq!(
            out,
            [
                0x33, 0x22, 0x11, 0x00, // data1 LE
                0x55, 0x44, // data2 LE
                0x77, 0x66, // data3 LE
                0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF,
            ]
        );
    }
}
