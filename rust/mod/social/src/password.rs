//! Argon2id password hashing.

use argon2::Argon2;
use microblog_core::{CredentialVerifier, ServiceError};
use password_hash::rand_core::OsRng;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// `CredentialVerifier` backed by argon2id with default parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn hash(&self, secret: &str) -> Result<String, ServiceError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(secret.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ServiceError::Internal(format!("hash password: {}", e)))
    }

    fn verify(&self, secret: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let v = Argon2Verifier;
        let hash = v.hash("cat").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(v.verify("cat", &hash));
        assert!(!v.verify("dog", &hash));
    }

    #[test]
    fn salts_differ() {
        let v = Argon2Verifier;
        assert_ne!(v.hash("cat").unwrap(), v.hash("cat").unwrap());
    }

    #[test]
    fn garbage_hash_rejected() {
        assert!(!Argon2Verifier.verify("cat", "not-a-hash"));
    }
}
