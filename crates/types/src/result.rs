//! Reply status codes.
//!
//! Every reply the daemon writes back to a client carries exactly one
//! [`NetResult`]. The numeric values are part of the wire protocol and
//! must never be renumbered.

use std::fmt;

/// Status code returned in every auth reply.
///
/// Only the codes the daemon actually produces are enumerated; unknown
/// values received from a peer are preserved by [`NetResult::from_raw`]
/// as [`NetResult::Other`] rather than dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetResult {
    /// Operation completed.
    Success,
    /// Unrecoverable server-side failure (usually a database error).
    InternalError,
    /// No age instance matches the request.
    AgeNotFound,
    /// An account with this login already exists.
    AccountAlreadyExists,
    /// A player with this name already exists.
    PlayerAlreadyExists,
    /// The requested player does not exist or belongs to another account.
    PlayerNotFound,
    /// A request parameter failed validation.
    InvalidParameter,
    /// The requested player is already active on another connection.
    LoggedInElsewhere,
    /// The requested vault node does not exist.
    VaultNodeNotFound,
    /// Bad credentials, or an account lookup that must not be surfaced.
    AuthenticationFailed,
    /// No global SDL state is registered for the age.
    StateObjectNotFound,
    /// Logins are restricted and the account carries no override flag.
    LoginDenied,
    /// The operation is recognized but not implemented for this input.
    NotSupported,
    /// The account is banned.
    AccountBanned,
    /// Score operation applied to the wrong score type.
    ScoreWrongType,
    /// Transfer source holds fewer points than requested.
    ScoreNotEnoughPoints,
    /// A score with this owner and name already exists.
    ScoreAlreadyExists,
    /// No score row matches the request.
    ScoreNoDataFound,
    /// A code this daemon never emits itself, preserved verbatim.
    Other(u32),
}

impl NetResult {
    /// Returns the stable wire value.
    pub const fn raw(self) -> u32 {
        match self {
            NetResult::Success => 0,
            NetResult::InternalError => 1,
            NetResult::AgeNotFound => 4,
            NetResult::AccountAlreadyExists => 11,
            NetResult::PlayerAlreadyExists => 12,
            NetResult::PlayerNotFound => 14,
            NetResult::InvalidParameter => 15,
            NetResult::LoggedInElsewhere => 17,
            NetResult::VaultNodeNotFound => 18,
            NetResult::AuthenticationFailed => 20,
            NetResult::StateObjectNotFound => 21,
            NetResult::LoginDenied => 22,
            NetResult::NotSupported => 29,
            NetResult::AccountBanned => 38,
            NetResult::ScoreWrongType => 40,
            NetResult::ScoreNotEnoughPoints => 41,
            NetResult::ScoreAlreadyExists => 42,
            NetResult::ScoreNoDataFound => 43,
            NetResult::Other(value) => value,
        }
    }

    /// Decodes a wire value, preserving unknown codes.
    pub const fn from_raw(value: u32) -> Self {
        match value {
            0 => NetResult::Success,
            1 => NetResult::InternalError,
            4 => NetResult::AgeNotFound,
            11 => NetResult::AccountAlreadyExists,
            12 => NetResult::PlayerAlreadyExists,
            14 => NetResult::PlayerNotFound,
            15 => NetResult::InvalidParameter,
            17 => NetResult::LoggedInElsewhere,
            18 => NetResult::VaultNodeNotFound,
            20 => NetResult::AuthenticationFailed,
            21 => NetResult::StateObjectNotFound,
            22 => NetResult::LoginDenied,
            29 => NetResult::NotSupported,
            38 => NetResult::AccountBanned,
            40 => NetResult::ScoreWrongType,
            41 => NetResult::ScoreNotEnoughPoints,
            42 => NetResult::ScoreAlreadyExists,
            43 => NetResult::ScoreNoDataFound,
            other => NetResult::Other(other),
        }
    }

    /// True for [`NetResult::Success`] only.
    pub const fn is_success(self) -> bool {
        matches!(self, NetResult::Success)
    }
}

impl fmt::Display for NetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetResult::Other(value) => write!(f, "Other({value})"),
            known => write!(f, "{known:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        let codes = [
            NetResult::Success,
            NetResult::InternalError,
            NetResult::AgeNotFound,
            NetResult::AccountAlreadyExists,
            NetResult::PlayerAlreadyExists,
            NetResult::PlayerNotFound,
            NetResult::InvalidParameter,
            NetResult::LoggedInElsewhere,
            NetResult::VaultNodeNotFound,
            NetResult::AuthenticationFailed,
            NetResult::StateObjectNotFound,
            NetResult::LoginDenied,
            NetResult::NotSupported,
            NetResult::AccountBanned,
            NetResult::ScoreWrongType,
            NetResult::ScoreNotEnoughPoints,
            NetResult::ScoreAlreadyExists,
            NetResult::ScoreNoDataFound,
        ];
        for code in codes {
            assert_eq!(NetResult::from_raw(code.raw()), code);
        }
    }

    #[test]
    fn test_unknown_codes_preserved() {
        assert_eq!(NetResult::from_raw(999), NetResult::Other(999));
        assert_eq!(NetResult::Other(999).raw(), 999);
    }

    #[test]
    fn test_is_success() {
        assert!(NetResult::Success.is_success());
        assert!(!NetResult::InternalError.is_success());
    }
}
