pub mod auth;
pub mod config;
pub mod error;
pub mod types;

pub use auth::CredentialVerifier;
pub use config::{SelfFollow, ServiceConfig};
pub use error::ServiceError;
pub use types::{Page, PageParams};
