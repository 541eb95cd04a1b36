use crate::password::PasswordError;
use crate::token::TokenError;
use common_error::ErrorKind;
use identity_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("a user with this email already exists")]
    AlreadyExists,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is locked")]
    Locked,
    #[error("account is inactive")]
    Inactive,
    #[error("not found")]
    NotFound,
    #[error("token or session has expired")]
    Expired,
    #[error("permission denied")]
    PermissionDenied,
    #[error("too many attempts, try again later")]
    RateLimited,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::AlreadyExists => ErrorKind::AlreadyExists,
            AuthError::InvalidCredentials => ErrorKind::InvalidCredentials,
            AuthError::Locked => ErrorKind::Locked,
            AuthError::Inactive => ErrorKind::Inactive,
            AuthError::NotFound => ErrorKind::NotFound,
            AuthError::Expired => ErrorKind::Expired,
            AuthError::PermissionDenied => ErrorKind::PermissionDenied,
            AuthError::RateLimited => ErrorKind::RateLimited,
            AuthError::Domain(e) => e.kind(),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        AuthError::Validation(e.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e.kind() {
            ErrorKind::Expired => AuthError::Expired,
            _ => AuthError::InvalidCredentials,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
