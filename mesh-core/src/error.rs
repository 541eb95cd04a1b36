use common_error::ErrorKind;
use thiserror::Error;

/// Errors surfaced by the registry, pools, and circuit breaker. Transport
/// and storage causes are preserved only for logs (spec §9 "exceptions /
/// error returns") — callers match on the variant, not the message.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("no healthy connection available for {service}")]
    NoHealthyConnection { service: String },

    #[error("peer {service} is not present in the registry")]
    PeerUnavailable { service: String },

    #[error("circuit for {peer} is open")]
    CircuitOpen { peer: String },

    #[error("call to {peer} timed out")]
    Timeout { peer: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("registry/ephemeral-store backend error: {0}")]
    Backend(String),
}

impl MeshError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MeshError::NoHealthyConnection { .. } | MeshError::PeerUnavailable { .. } => ErrorKind::PeerUnavailable,
            MeshError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            MeshError::Timeout { .. } => ErrorKind::Timeout,
            MeshError::InvalidArgument(_) => ErrorKind::Validation,
            MeshError::Backend(_) => ErrorKind::Internal,
        }
    }

    /// Per spec §4.2 retry policy: `InvalidArgument`-class errors are never
    /// retried, nor is an already-open circuit (retrying would defeat it).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, MeshError::InvalidArgument(_) | MeshError::CircuitOpen { .. })
    }
}

pub type MeshResult<T> = Result<T, MeshError>;
