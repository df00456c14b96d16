//! Account flags and player identity records.

use serde::{Deserialize, Serialize};

/// Bit flags stored in `auth.Accounts.AcctFlags`.
///
/// The values are stable wire/database values. Only the three flags the
/// toggle operation covers are defined; the rest of the word is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountFlags(pub u32);

impl AccountFlags {
    /// Full access to restricted operations; bypasses login restriction.
    pub const ADMIN: u32 = 1 << 0;
    /// Bypasses login restriction without admin access.
    pub const BETA_TESTER: u32 = 1 << 1;
    /// Account may never log in.
    pub const BANNED: u32 = 1 << 16;

    /// All flags the toggle operation may flip.
    pub const TOGGLEABLE: u32 = Self::ADMIN | Self::BETA_TESTER | Self::BANNED;

    /// True if the account is banned.
    pub const fn is_banned(self) -> bool {
        self.0 & Self::BANNED != 0
    }

    /// True if the account is an admin.
    pub const fn is_admin(self) -> bool {
        self.0 & Self::ADMIN != 0
    }

    /// True if the account may log in while logins are restricted.
    pub const fn bypasses_restriction(self) -> bool {
        self.0 & (Self::ADMIN | Self::BETA_TESTER) != 0
    }

    /// Applies the XOR-toggle semantics of the flag maintenance operation:
    /// every toggleable flag set in `mask` is flipped, everything else is
    /// left alone.
    pub const fn toggled(self, mask: u32) -> Self {
        AccountFlags(self.0 ^ (mask & Self::TOGGLEABLE))
    }
}

/// One row of the per-account player roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Player id, unique across the shard.
    pub player_id: u32,
    /// Display name, unique across the shard.
    pub player_name: String,
    /// Avatar mesh selector, `"male"` or `"female"`.
    pub avatar_shape: String,
    /// Nonzero for full explorer accounts.
    pub explorer: u32,
}

/// Coerces an avatar shape to one of the two supported meshes.
///
/// Anything else came from a modified client and falls back to `"male"`.
pub fn sanitize_avatar_shape(shape: &str) -> &str {
    match shape {
        "male" | "female" => shape,
        _ => "male",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_sets_and_clears() {
        let flags = AccountFlags(0);
        let flags = flags.toggled(AccountFlags::ADMIN | AccountFlags::BANNED);
        assert!(flags.is_admin());
        assert!(flags.is_banned());

        let flags = flags.toggled(AccountFlags::BANNED);
        assert!(flags.is_admin());
        assert!(!flags.is_banned());
    }

    #[test]
    fn test_toggle_ignores_reserved_bits() {
        let flags = AccountFlags(0).toggled(0xFFFF_FFFF);
        assert_eq!(flags.0, AccountFlags::TOGGLEABLE);
    }

    #[test]
    fn test_restriction_bypass() {
        assert!(AccountFlags(AccountFlags::ADMIN).bypasses_restriction());
        assert!(AccountFlags(AccountFlags::BETA_TESTER).bypasses_restriction());
        assert!(!AccountFlags(AccountFlags::BANNED).bypasses_restriction());
        assert!(!AccountFlags(0).bypasses_restriction());
    }

    #[test]
    fn test_avatar_shape_fallback() {
        assert_eq!(sanitize_avatar_shape("male"), "male");
        assert_eq!(sanitize_avatar_shape("female"), "female");
        assert_eq!(sanitize_avatar_shape("dragon"), "male");
        assert_eq!(sanitize_avatar_shape(""), "male");
    }
}
