//! Vault change broadcast frames.
//!
//! Each frame is built once and shared read-only (`Arc`) across every
//! interested session's channel; nothing mutates a frame after
//! construction. The payload is the already-encoded wire body so the
//! per-client sender tasks do no further work per recipient.

use std::sync::Arc;

use uuid::Uuid;

use relto_vault::wire::write_wire_uuid;
use relto_vault::NodeRef;

/// What kind of vault change a frame announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A node's fields changed; payload is node index + revision uuid.
    NodeChanged,
    /// An edge was created; payload is parent, child, owner.
    NodeAdded,
    /// An edge was removed; payload is parent, child.
    NodeRemoved,
}

/// One encoded broadcast, shared across all recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastFrame {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl BroadcastFrame {
    /// Builds a `NodeChanged` frame.
    pub fn node_changed(node_idx: u32, revision: Uuid) -> Arc<Self> {
        let mut payload = Vec::with_capacity(20);
        payload.extend_from_slice(&node_idx.to_le_bytes());
        write_wire_uuid(&mut payload, &revision);
        Arc::new(BroadcastFrame { kind: FrameKind::NodeChanged, payload })
    }

    /// Builds a `NodeAdded` frame.
    pub fn node_added(edge: NodeRef) -> Arc<Self> {
        let mut payload = Vec::with_capacity(12);
        payload.extend_from_slice(&edge.parent.to_le_bytes());
        payload.extend_from_slice(&edge.child.to_le_bytes());
        payload.extend_from_slice(&edge.owner.to_le_bytes());
        Arc::new(BroadcastFrame { kind: FrameKind::NodeAdded, payload })
    }

    /// Builds a `NodeRemoved` frame.
    pub fn node_removed(parent: u32, child: u32) -> Arc<Self> {
        let mut payload = Vec::with_capacity(8);
        payload.extend_from_slice(&parent.to_le_bytes());
        payload.extend_from_slice(&child.to_le_bytes());
        Arc::new(BroadcastFrame { kind: FrameKind::NodeRemoved, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_changed_layout() {
        let revision = Uuid::from_u128(5);
        let frame = BroadcastFrame::node_changed(0x01020304, revision);
        assert_eq!(frame.kind, FrameKind::NodeChanged);
        assert_eq!(frame.payload.len(), 20);
        assert_eq!(&frame.payload[0..4], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_node_added_layout() {
        let frame = BroadcastFrame::node_added(NodeRef::new(1, 2, 3));
        assert_eq!(frame.kind, FrameKind::NodeAdded);
        assert_eq!(
            frame.payload,
            [1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]
        );
    }

    #[test]
    fn test_node_removed_omits_owner() {
        let frame = BroadcastFrame::node_removed(1, 2);
        assert_eq!(frame.kind, FrameKind::NodeRemoved);
        assert_eq!(frame.payload, [1, 0, 0, 0, 2, 0, 0, 0]);
    }
}
