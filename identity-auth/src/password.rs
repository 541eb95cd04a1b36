//! Adaptive password hashing and the shared strength policy. Argon2id is
//! memory-hard by default; hashes are opaque PHC strings that embed their
//! own parameters, so verification never needs a stored algorithm version.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use thiserror::Error;

const MIN_LENGTH: usize = 8;
const MAX_LENGTH: usize = 128;

/// Deliberately small and literal; a production deployment would load this
/// from a maintained list. Matching is case-insensitive substring, so it
/// also catches "Password123!" style attempts.
const COMMON_DENYLIST: &[&str] = &["password", "12345678", "qwertyui", "letmein1", "admin1234", "iloveyou"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must be at least {MIN_LENGTH} characters")]
    TooShort,
    #[error("password must be at most {MAX_LENGTH} characters")]
    TooLong,
    #[error("password must contain upper, lower, digit, and symbol characters")]
    MissingCharacterClass,
    #[error("password is too common")]
    TooCommon,
    #[error("password hashing failed")]
    HashFailure,
}

pub fn check_strength(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_LENGTH {
        return Err(PasswordError::TooShort);
    }
    if password.chars().count() > MAX_LENGTH {
        return Err(PasswordError::TooLong);
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| !c.is_ascii_alphanumeric());
    if !(has_upper && has_lower && has_digit && has_symbol) {
        return Err(PasswordError::MissingCharacterClass);
    }
    let lowered = password.to_ascii_lowercase();
    if COMMON_DENYLIST.iter().any(|p| lowered.contains(p)) {
        return Err(PasswordError::TooCommon);
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordError::HashFailure)
}

/// Constant-time verification by construction: `argon2`'s comparison runs
/// over the full digest regardless of where the first mismatch occurs.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else { return false };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_and_long() {
        assert_eq!(check_strength("Ab1!").unwrap_err(), PasswordError::TooShort);
        let too_long = format!("Ab1!{}", "a".repeat(130));
        assert_eq!(check_strength(&too_long).unwrap_err(), PasswordError::TooLong);
    }

    #[test]
    fn rejects_missing_character_classes() {
        assert_eq!(check_strength("alllowercase1!").unwrap_err(), PasswordError::MissingCharacterClass);
        assert_eq!(check_strength("ALLUPPERCASE1!").unwrap_err(), PasswordError::MissingCharacterClass);
        assert_eq!(check_strength("NoDigitsHere!").unwrap_err(), PasswordError::MissingCharacterClass);
        assert_eq!(check_strength("NoSymbols123").unwrap_err(), PasswordError::MissingCharacterClass);
    }

    #[test]
    fn rejects_denylisted_patterns() {
        assert_eq!(check_strength("Password123!").unwrap_err(), PasswordError::TooCommon);
    }

    #[test]
    fn accepts_strong_password() {
        assert!(check_strength("Str0ng!Passw0rd").is_ok());
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("Str0ng!Passw0rd").unwrap();
        assert!(verify_password("Str0ng!Passw0rd", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn each_hash_uses_a_fresh_salt() {
        let a = hash_password("Str0ng!Passw0rd").unwrap();
        let b = hash_password("Str0ng!Passw0rd").unwrap();
        assert_ne!(a, b);
    }
}
