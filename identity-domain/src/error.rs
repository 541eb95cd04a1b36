use common_error::ErrorKind;
use thiserror::Error;

/// Errors surfaced by persistence adapters. All storage-layer failures that
/// are not explicitly modeled (connection loss, constraint violations other
/// than the unique-email case) collapse to `Internal` per spec §7 — the
/// authority does not recover from them beyond logging.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("a user with this email already exists")]
    EmailAlreadyExists,

    #[error("user not found")]
    UserNotFound,

    #[error("session not found")]
    SessionNotFound,

    #[error("role not found: {0}")]
    RoleNotFound(String),

    #[error("permission not found: {0}")]
    PermissionNotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::EmailAlreadyExists => ErrorKind::AlreadyExists,
            DomainError::UserNotFound | DomainError::SessionNotFound => ErrorKind::NotFound,
            DomainError::RoleNotFound(_) | DomainError::PermissionNotFound(_) => ErrorKind::NotFound,
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::Backend(_) => ErrorKind::Internal,
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
