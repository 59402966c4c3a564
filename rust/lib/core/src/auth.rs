//! Credential verification boundary.
//!
//! The core does not know how passwords are hashed. It only knows this
//! trait; the concrete implementation is injected at startup.

use crate::ServiceError;

/// Pluggable password hasher / verifier.
pub trait CredentialVerifier: Send + Sync + 'static {
    /// Produce a new stored hash for a plaintext secret.
    fn hash(&self, secret: &str) -> Result<String, ServiceError>;

    /// Check a plaintext secret against a stored hash.
    fn verify(&self, secret: &str, hash: &str) -> bool;
}
