use chrono::{DateTime, Utc};
use microblog_core::{CredentialVerifier, ServiceError};
use microblog_store::{Column, Entity};
use serde::{Deserialize, Serialize};

/// Longest accepted username.
pub const USERNAME_MAX: usize = 32;
/// Longest accepted email address.
pub const EMAIL_MAX: usize = 128;
/// Longest accepted "about me" text.
pub const ABOUT_ME_MAX: usize = 256;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub about_me: Option<String>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub last_seen: DateTime<Utc>,
}

impl User {
    pub fn new(username: &str, email: &str) -> Self {
        Self {
            id: 0,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: None,
            about_me: None,
            last_seen: Utc::now(),
        }
    }

    pub fn set_password(
        &mut self,
        credentials: &dyn CredentialVerifier,
        password: &str,
    ) -> Result<(), ServiceError> {
        self.password_hash = Some(credentials.hash(password)?);
        Ok(())
    }

    /// False for accounts that never had a password set.
    pub fn check_password(&self, credentials: &dyn CredentialVerifier, password: &str) -> bool {
        match &self.password_hash {
            Some(hash) => credentials.verify(password, hash),
            None => false,
        }
    }

    /// Gravatar URL for the lowercased email, identicon fallback.
    pub fn avatar(&self, size: u32) -> String {
        let digest = md5::compute(self.email.to_lowercase().as_bytes());
        format!("https://www.gravatar.com/avatar/{:x}?d=identicon&s={}", digest, size)
    }
}

impl Entity for User {
    const TABLE: &'static str = "user";
    const COLUMNS: &'static [Column] = &[
        Column::text("username").unique(),
        Column::text("email").unique(),
    ];

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_is_gravatar_of_email() {
        let u = User::new("john", "john@example.com");
        assert_eq!(
            u.avatar(128),
            "https://www.gravatar.com/avatar/d4c74594d841139328695756648b6bd6?d=identicon&s=128"
        );
    }

    #[test]
    fn avatar_ignores_email_case() {
        let lower = User::new("john", "john@example.com");
        let upper = User::new("john", "John@Example.COM");
        assert_eq!(lower.avatar(64), upper.avatar(64));
    }
}
