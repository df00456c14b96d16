//! The game-server link.
//!
//! The game daemon is an in-process peer reached through two calls: an
//! authoritative SDL merge and a best-effort global-state notification.
//! The trait keeps the auth daemon testable and lets a shard run the
//! auth role without a game daemon at all.

use async_trait::async_trait;

use relto_types::NetResult;
use relto_vault::Node;

/// RPC surface of the game-server daemon.
#[async_trait]
pub trait GameLink: Send + Sync {
    /// Hands an SDL node update to the instance that owns it. The game
    /// server either absorbs the update (returning its own status, which
    /// becomes the client's reply) or returns [`NetResult::AgeNotFound`]
    /// to signal that no live instance owns the state.
    async fn update_vault_sdl(&self, node: &Node, mcp_id: u32) -> NetResult;

    /// Tells active instances that an age's global SDL changed.
    /// Best-effort; there is no reply.
    async fn update_global_sdl(&self, age_filename: &str);
}

/// A link with no game server behind it.
///
/// Every SDL merge reports `AgeNotFound`, so vault updates always fall
/// through to the plain persistence path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGameLink;

#[async_trait]
impl GameLink for NoGameLink {
    async fn update_vault_sdl(&self, _node: &Node, _mcp_id: u32) -> NetResult {
        NetResult::AgeNotFound
    }

    async fn update_global_sdl(&self, _age_filename: &str) {}
}
