//! Error taxonomy for the tick coordinator, following the shared
//! `ErrorKind` classification idiom used by every other crate in the
//! workspace (spec §7, §9 "every public operation returns a typed error
//! kind").

use common_error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("component '{id}' is already registered")]
    AlreadyRegistered { id: String },

    #[error("component '{id}' observed a tick gap: expected {expected}, got {actual}")]
    TickGap { id: String, expected: u64, actual: u64 },

    #[error("coordinator is not running")]
    NotRunning,
}

impl SimError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::AlreadyRegistered { .. } => ErrorKind::AlreadyExists,
            SimError::TickGap { .. } | SimError::NotRunning => ErrorKind::Internal,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_gap_classifies_as_internal() {
        let err = SimError::TickGap { id: "c1".to_string(), expected: 3, actual: 5 };
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn already_registered_classifies_as_already_exists() {
        let err = SimError::AlreadyRegistered { id: "c1".to_string() };
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }
}
