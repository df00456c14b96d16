//! SHA-1 challenge hashing.
//!
//! The login protocol predates this server and carries two deliberate
//! quirks that are wire-compatibility requirements, not defects:
//!
//! - The "buggy" password hash concatenates password and login as
//!   UTF-16LE and zeroes the final code unit of each before hashing,
//!   faithfully reproducing an off-by-one in the original client.
//! - On the non-email path the client transmits its SHA-1 digest as
//!   big-endian words, so the received hash must be byte-swapped per
//!   32-bit word before comparison.

use std::fmt;

use sha1::{Digest, Sha1};

/// A 20-byte SHA-1 digest, stored in the database as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShaHash(pub [u8; 20]);

impl ShaHash {
    /// Hashes a byte buffer.
    pub fn sha1(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        ShaHash(hasher.finalize().into())
    }

    /// Parses the database hex representation.
    ///
    /// Returns `None` unless the input is exactly 40 hex digits.
    pub fn from_hex(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        if bytes.len() != 40 {
            return None;
        }
        let mut digest = [0u8; 20];
        for (i, out) in digest.iter_mut().enumerate() {
            let hi = (bytes[i * 2] as char).to_digit(16)?;
            let lo = (bytes[i * 2 + 1] as char).to_digit(16)?;
            *out = ((hi << 4) | lo) as u8;
        }
        Some(ShaHash(digest))
    }

    /// Swaps the byte order of each 32-bit word in place.
    ///
    /// The client sends its digest as five big-endian words; everything
    /// server-side is little-endian.
    pub fn swap_word_bytes(&mut self) {
        for word in self.0.chunks_exact_mut(4) {
            word.reverse();
        }
    }
}

impl fmt::Display for ShaHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Hashes a password for storage on the plain (non-email) path.
pub fn hash_password(password: &str) -> ShaHash {
    ShaHash::sha1(password.as_bytes())
}

/// Returns true when the login must use the legacy email challenge flow:
/// the login contains an `@` and `"gametap"` occurs somewhere after it.
pub fn use_email_auth(login: &str) -> bool {
    match login.split_once('@') {
        Some((_, domain)) => domain.to_lowercase().contains("gametap"),
        None => false,
    }
}

/// The legacy stored-password hash for email-authenticated accounts.
///
/// Password then login, each as UTF-16LE with its final code unit zeroed,
/// hashed as one buffer. Empty components contribute nothing.
pub fn buggy_hash_password(login: &str, password: &str) -> ShaHash {
    let mut units: Vec<u16> = password.encode_utf16().collect();
    if let Some(last) = units.last_mut() {
        *last = 0;
    }
    let login_start = units.len();
    units.extend(login.encode_utf16());
    if units.len() > login_start {
        if let Some(last) = units.last_mut() {
            *last = 0;
        }
    }

    let mut buffer = Vec::with_capacity(units.len() * 2);
    for unit in units {
        buffer.extend_from_slice(&unit.to_le_bytes());
    }
    ShaHash::sha1(&buffer)
}

/// The per-login challenge hash for email-authenticated accounts:
/// SHA-1 over client challenge, server challenge, and the stored hash.
pub fn buggy_hash_login(
    stored: ShaHash,
    server_challenge: u32,
    client_challenge: u32,
) -> ShaHash {
    let mut buffer = [0u8; 28];
    buffer[0..4].copy_from_slice(&client_challenge.to_le_bytes());
    buffer[4..8].copy_from_slice(&server_challenge.to_le_bytes());
    buffer[8..28].copy_from_slice(&stored.0);
    ShaHash::sha1(&buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let hash = hash_password("secret");
        let parsed = ShaHash::from_hex(&hash.to_string()).expect("parse hex");
        assert_eq!(parsed, hash);
    }

    #[test]
    fn test_hex_rejects_bad_input() {
        assert!(ShaHash::from_hex("").is_none());
        assert!(ShaHash::from_hex("abcd").is_none());
        assert!(ShaHash::from_hex(&"zz".repeat(20)).is_none());
    }

    #[test]
    fn test_word_swap_is_involution() {
        let mut hash = hash_password("secret");
        let original = hash;
        hash.swap_word_bytes();
        assert_ne!(hash, original);
        hash.swap_word_bytes();
        assert_eq!(hash, original);
    }

    #[test]
    fn test_email_auth_heuristic() {
        assert!(use_email_auth("bob@gametap.com"));
        assert!(use_email_auth("bob@mail.GameTap.com"));
        assert!(!use_email_auth("bob@example.com"));
        assert!(!use_email_auth("gametap"));
        assert!(!use_email_auth("bob"));
    }

    #[test]
    fn test_truncation_quirk_discards_final_units() {
        // The final code unit of both password and login is zeroed before
        // hashing, so variants differing only there must collide.
        assert_eq!(
            buggy_hash_password("bob@gametap.com", "hunter1"),
            buggy_hash_password("bob@gametap.com", "hunter2"),
        );
        assert_eq!(
            buggy_hash_password("bob@gametap.coM", "hunter1"),
            buggy_hash_password("bob@gametap.coN", "hunter1"),
        );
        // Anything earlier still matters.
        assert_ne!(
            buggy_hash_password("bob@gametap.com", "hunter1"),
            buggy_hash_password("bob@gametap.com", "gatherer1"),
        );
    }

    #[test]
    fn test_challenge_hash_binds_both_nonces() {
        let stored = hash_password("pw");
        let base = buggy_hash_login(stored, 1, 2);
        assert_eq!(buggy_hash_login(stored, 1, 2), base);
        assert_ne!(buggy_hash_login(stored, 3, 2), base);
        assert_ne!(buggy_hash_login(stored, 1, 4), base);
    }
}
