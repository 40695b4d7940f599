//! Password hashing capability
//!
//! One-way salted hash plus verify, behind a trait so the concrete adaptive
//! algorithm is swappable without touching the token authority or handlers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hashing(String),
}

/// Hash and verify passwords.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password with a fresh random salt
    fn hash(&self, plain: &str) -> Result<String, PasswordError>;

    /// Verify a plaintext password against a stored hash.
    ///
    /// Returns `false` for both mismatches and unparseable stored hashes.
    fn verify(&self, plain: &str, stored_hash: &str) -> bool;
}

/// Argon2id implementation of the password capability
#[derive(Default)]
pub struct Argon2PasswordHasher;

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plain: &str) -> Result<String, PasswordError> {
        use argon2::password_hash::{rand_core::OsRng, PasswordHasher as _, SaltString};
        use argon2::Argon2;

        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| PasswordError::Hashing(e.to_string()))
    }

    fn verify(&self, plain: &str, stored_hash: &str) -> bool {
        use argon2::password_hash::{PasswordHash, PasswordVerifier as _};
        use argon2::Argon2;

        match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2PasswordHasher::new();
        let hash = hasher.hash("admin123").unwrap();

        assert!(hasher.verify("admin123", &hash));
        assert!(!hasher.verify("wrong-password", &hash));
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = Argon2PasswordHasher::new();
        let a = hasher.hash("same-password").unwrap();
        let b = hasher.hash("same-password").unwrap();

        assert_ne!(a, b);
        assert!(hasher.verify("same-password", &a));
        assert!(hasher.verify("same-password", &b));
    }

    #[test]
    fn test_hash_does_not_contain_plaintext() {
        let hasher = Argon2PasswordHasher::new();
        let hash = hasher.hash("hunter2-hunter2").unwrap();
        assert!(!hash.contains("hunter2"));
    }

    #[test]
    fn test_verify_unparseable_hash_is_false() {
        let hasher = Argon2PasswordHasher::new();
        assert!(!hasher.verify("anything", "not-a-phc-string"));
        assert!(!hasher.verify("anything", ""));
    }
}
