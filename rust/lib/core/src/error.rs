use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Front ends match on these,
// never on the human-readable (and possibly translated) message.

/// Stable error code constants.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const INTERNAL: &str = "INTERNAL";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

// ── ServiceError ────────────────────────────────────────────────────

/// Unified service error type used by the store and the social module.
///
/// Each variant maps to a stable error code (see [`error_code`]). The
/// `Display` output is only the message, which may already be localized.
///
/// Search backend failures never show up here: the index is a derived
/// cache and its write failures are logged, not returned.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness or referential constraint violated.
    #[error("{0}")]
    Conflict(String),

    /// Input data is invalid.
    #[error("{0}")]
    Validation(String),

    /// Missing or wrong credentials, or an invalid token.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed to touch this entity.
    #[error("{0}")]
    PermissionDenied(String),

    /// Relational store failure.
    #[error("{0}")]
    Storage(String),

    /// Unexpected internal error (serialization, hashing, ...).
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Conflict(_) => error_code::ALREADY_EXISTS,
            ServiceError::Validation(_) => error_code::VALIDATION_FAILED,
            ServiceError::Unauthorized(_) => error_code::UNAUTHENTICATED,
            ServiceError::PermissionDenied(_) => error_code::PERMISSION_DENIED,
            ServiceError::Storage(_) => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    /// True for errors caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Storage(_) | ServiceError::Internal(_))
    }
}
