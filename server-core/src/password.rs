//! Password hashing for the auth protocol (§4.6). SHA-256 over
//! `salt || password`, salt stored alongside the hash — no plaintext ever
//! persisted. `RTYPE_TEST_HASH`, when set, pins the salt so fixtures in
//! tests get deterministic hashes instead of a fresh random salt per run.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

pub const SALT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub salt: [u8; SALT_LEN],
    pub digest: [u8; 32],
}

impl PasswordHash {
    pub fn new(password: &str) -> Self {
        let mut salt = [0u8; SALT_LEN];
        match std::env::var("RTYPE_TEST_HASH") {
            Ok(fixed) if !fixed.is_empty() => {
                let bytes = fixed.as_bytes();
                for (i, slot) in salt.iter_mut().enumerate() {
                    *slot = bytes[i % bytes.len()];
                }
            }
            _ => OsRng.fill_bytes(&mut salt),
        }
        let digest = Self::digest(&salt, password);
        PasswordHash { salt, digest }
    }

    pub fn verify(&self, password: &str) -> bool {
        Self::digest(&self.salt, password) == self.digest
    }

    fn digest(salt: &[u8; SALT_LEN], password: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hasher.finalize().into()
    }
}

/// Username: 6-21 characters.
pub fn validate_username(username: &str) -> bool {
    (6..=21).contains(&username.chars().count())
}

/// Simplified RFC-5322 email check, matching §4.6.
pub fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else { return false };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Password: at least 6 characters.
pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= 6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_correct_password_only() {
        let hash = PasswordHash::new("secret123");
        assert!(hash.verify("secret123"));
        assert!(!hash.verify("wrong"));
    }

    #[test]
    fn validators_match_spec_bounds() {
        assert!(validate_username("alice_user"));
        assert!(!validate_username("ab"));
        assert!(validate_email("alice@example.com"));
        assert!(!validate_email("not-an-email"));
        assert!(validate_password("secret123"));
        assert!(!validate_password("ab"));
    }
}
