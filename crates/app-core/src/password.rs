//! Argon2id password hashing for locally managed identities.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{Error as Argon2Error, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HashingError {
    #[error("Failed to hash or verify password: {0}")]
    Hash(Argon2Error),
}

impl From<Argon2Error> for HashingError {
    fn from(err: Argon2Error) -> Self {
        HashingError::Hash(err)
    }
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Hasher: Send + Sync {
    fn hash(&self, plain: &str) -> Result<String, HashingError>;

    /// `Ok(false)` for a wrong password; `Err` only for a malformed hash.
    fn verify(&self, plain: &str, hash: &str) -> Result<bool, HashingError>;
}

#[derive(Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Hasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> Result<String, HashingError> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self.argon2.hash_password(plain.as_bytes(), &salt)?.to_string())
    }

    fn verify(&self, plain: &str, hash: &str) -> Result<bool, HashingError> {
        let parsed = PasswordHash::new(hash)?;
        match self.argon2.verify_password(plain.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(Argon2Error::Password) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = Argon2Hasher::new();

        let hashed = hasher.hash("s3cret-pass").unwrap();

        assert!(hashed.starts_with("$argon2id$"));
        assert!(hasher.verify("s3cret-pass", &hashed).unwrap());
        assert!(!hasher.verify("wrong-pass", &hashed).unwrap());
    }

    #[test]
    fn test_verify_malformed_hash() {
        let hasher = Argon2Hasher::new();

        let result = hasher.verify("any", "not-an-argon2-hash");

        assert!(matches!(result, Err(HashingError::Hash(_))));
    }

    #[test]
    fn test_salted_hashes_differ() {
        let hasher = Argon2Hasher::default();

        let first = hasher.hash("same").unwrap();
        let second = hasher.hash("same").unwrap();

        assert_ne!(first, second);
    }
}
