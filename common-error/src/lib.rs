//! Shared error taxonomy used across the identity, mesh, and simulation
//! crates. Every public operation in the workspace returns an error that
//! carries one of these kinds; handlers at the HTTP/RPC boundary translate
//! the kind into a stable wire status, never the underlying cause.

use serde::{Deserialize, Serialize};

/// The taxonomy of failure kinds a public operation can surface.
///
/// This is not itself an error type — concrete crates define their own
/// `thiserror` enums and expose a `kind() -> ErrorKind` method, following
/// the teacher's `MistralRsError::category()` classification idiom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    AlreadyExists,
    InvalidCredentials,
    Locked,
    Inactive,
    NotFound,
    Expired,
    PermissionDenied,
    RateLimited,
    CircuitOpen,
    PeerUnavailable,
    Timeout,
    Internal,
}

impl ErrorKind {
    /// The stable, wire-visible string for this kind (used in error-code
    /// fields and metrics labels).
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_failed",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::Locked => "locked",
            ErrorKind::Inactive => "inactive",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Expired => "expired",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::PeerUnavailable => "peer_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }

    /// The HTTP status code this kind maps to, per spec §7.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::AlreadyExists => 400,
            ErrorKind::InvalidCredentials | ErrorKind::Expired => 401,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::CircuitOpen | ErrorKind::PeerUnavailable => 503,
            ErrorKind::Timeout => 504,
            ErrorKind::Locked | ErrorKind::Inactive | ErrorKind::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_matches_spec_table() {
        assert_eq!(ErrorKind::Validation.http_status(), 400);
        assert_eq!(ErrorKind::AlreadyExists.http_status(), 400);
        assert_eq!(ErrorKind::InvalidCredentials.http_status(), 401);
        assert_eq!(ErrorKind::Expired.http_status(), 401);
        assert_eq!(ErrorKind::PermissionDenied.http_status(), 403);
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::RateLimited.http_status(), 429);
        assert_eq!(ErrorKind::CircuitOpen.http_status(), 503);
        assert_eq!(ErrorKind::PeerUnavailable.http_status(), 503);
        assert_eq!(ErrorKind::Timeout.http_status(), 504);
        assert_eq!(ErrorKind::Internal.http_status(), 500);
    }

    #[test]
    fn as_str_round_trips_through_display() {
        assert_eq!(ErrorKind::RateLimited.to_string(), "rate_limited");
    }
}
