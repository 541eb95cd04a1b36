//! JWT issuance and verification. Both token slots share one claim shape;
//! `token_type` pins a token to the slot it was minted for so an access
//! token can never be replayed as a refresh token or vice versa.

use chrono::{DateTime, Duration, Utc};
use common_error::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub session_id: Uuid,
    pub token_type: TokenType,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token signature or structure is invalid")]
    Invalid,
    #[error("token type does not match the expected slot")]
    WrongType,
}

impl TokenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TokenError::Expired => ErrorKind::Expired,
            TokenError::Invalid | TokenError::WrongType => ErrorKind::InvalidCredentials,
        }
    }
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        &self,
        user_id: Uuid,
        email: &str,
        is_admin: bool,
        session_id: Uuid,
        token_type: TokenType,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            is_admin,
            session_id,
            token_type,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|_| TokenError::Invalid)
    }

    pub fn verify(&self, token: &str, expected_type: TokenType) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;
        if data.claims.token_type != expected_type {
            return Err(TokenError::WrongType);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("a-test-secret-that-is-at-least-32-bytes-long", "identity-service")
    }

    #[test]
    fn issues_and_verifies_matching_type() {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let token = issuer
            .issue(user_id, "a@x.io", false, session_id, TokenType::Access, Duration::minutes(15), now)
            .unwrap();
        let claims = issuer.verify(&token, TokenType::Access).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.session_id, session_id);
    }

    #[test]
    fn rejects_wrong_slot() {
        let issuer = issuer();
        let now = Utc::now();
        let token = issuer
            .issue(Uuid::new_v4(), "a@x.io", false, Uuid::new_v4(), TokenType::Refresh, Duration::days(7), now)
            .unwrap();
        let err = issuer.verify(&token, TokenType::Access).unwrap_err();
        assert!(matches!(err, TokenError::WrongType));
    }

    #[test]
    fn rejects_expired_token() {
        let issuer = issuer();
        let now = Utc::now() - Duration::minutes(30);
        let token = issuer
            .issue(Uuid::new_v4(), "a@x.io", false, Uuid::new_v4(), TokenType::Access, Duration::minutes(15), now)
            .unwrap();
        let err = issuer.verify(&token, TokenType::Access).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn rejects_token_signed_with_different_secret() {
        let issuer_a = issuer();
        let issuer_b = TokenIssuer::new("a-different-test-secret-at-least-32-bytes", "identity-service");
        let now = Utc::now();
        let token = issuer_a
            .issue(Uuid::new_v4(), "a@x.io", false, Uuid::new_v4(), TokenType::Access, Duration::minutes(15), now)
            .unwrap();
        assert!(issuer_b.verify(&token, TokenType::Access).is_err());
    }
}
