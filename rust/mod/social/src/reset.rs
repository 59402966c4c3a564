//! Signed password reset tokens.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use microblog_core::ServiceError;
use serde::{Deserialize, Serialize};

/// What a reset token carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetClaims {
    /// Id of the user allowed to reset their password.
    pub reset_password: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}

/// Issues and checks HS256 reset tokens.
#[derive(Clone)]
pub struct ResetTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expire_secs: i64,
}

impl ResetTokens {
    pub fn new(secret: &str, expire_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            expire_secs,
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String, ServiceError> {
        let claims = ResetClaims {
            reset_password: user_id,
            exp: chrono::Utc::now().timestamp() + self.expire_secs,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(format!("reset token encode: {}", e)))
    }

    /// User id from a valid token. None if it is malformed, tampered
    /// with or expired.
    pub fn verify(&self, token: &str) -> Option<i64> {
        jsonwebtoken::decode::<ResetClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.reset_password)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify() {
        let tokens = ResetTokens::new("secret", 600);
        let token = tokens.issue(42).unwrap();
        assert_eq!(tokens.verify(&token), Some(42));
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = ResetTokens::new("secret-a", 600).issue(1).unwrap();
        assert_eq!(ResetTokens::new("secret-b", 600).verify(&token), None);
    }

    #[test]
    fn expired_rejected() {
        // Past the default leeway.
        let tokens = ResetTokens::new("secret", -120);
        let token = tokens.issue(1).unwrap();
        assert_eq!(tokens.verify(&token), None);
    }

    #[test]
    fn garbage_rejected() {
        assert_eq!(ResetTokens::new("secret", 600).verify("invalid.token.here"), None);
    }
}
