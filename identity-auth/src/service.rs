//! The credential and session authority's single entry point. Every public
//! operation here corresponds 1:1 to a flow described for the authority:
//! register, login, refresh, logout, email verification, password reset,
//! and permission evaluation. HTTP/RPC binding lives in `identity-service`;
//! this crate knows nothing about wire formats.

use crate::error::{AuthError, AuthResult};
use crate::fingerprint::{fingerprint, random_token};
use crate::password::{check_strength, hash_password, verify_password};
use crate::token::{Claims, TokenIssuer, TokenType};
use chrono::{Duration as ChronoDuration, Utc};
use common_config::{JwtConfig, RateLimitConfig};
use eventbus::{topics, EmailKind, EmailTask, EventBus};
use identity_domain::{
    DomainError, Permission, Role, RoleId, RoleRepository, Session, SessionId, SessionRepository,
    User, UserId, UserRepository, VerificationToken, ROLE_ADMIN, ROLE_USER,
};
use std::sync::{Arc, OnceLock};
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

fn dummy_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| {
        hash_password("Dummy!Comparison0").unwrap_or_else(|_| {
            "$argon2id$v=19$m=19456,t=2,p=1$AAAAAAAAAAAAAAAAAAAAAA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string()
        })
    })
}

fn chrono_duration(d: StdDuration) -> ChronoDuration {
    ChronoDuration::milliseconds(d.as_millis().min(i64::MAX as u128) as i64)
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub session_id: SessionId,
}

#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: User,
    pub tokens: TokenPair,
    pub remember_me: bool,
}

pub struct ValidatedToken {
    pub claims: Claims,
    pub session: Session,
    pub permissions: Vec<String>,
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    roles: Arc<dyn RoleRepository>,
    bus: Arc<dyn EventBus>,
    issuer: TokenIssuer,
    jwt: JwtConfig,
    rate_limit: RateLimitConfig,
    /// Serializes refresh-token rotation so a given refresh token can mint
    /// at most one new pair even under concurrent callers (spec §5).
    refresh_lock: Mutex<()>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        roles: Arc<dyn RoleRepository>,
        bus: Arc<dyn EventBus>,
        jwt: JwtConfig,
        rate_limit: RateLimitConfig,
    ) -> Self {
        let issuer = TokenIssuer::new(&jwt.secret, jwt.issuer.clone());
        Self { users, sessions, roles, bus, issuer, jwt, rate_limit, refresh_lock: Mutex::new(()) }
    }

    fn pepper(&self) -> &[u8] {
        self.jwt.secret.as_bytes()
    }

    async fn publish_best_effort(&self, topic: &'static str, payload: serde_json::Value) {
        if let Err(e) = self.bus.publish(topic, payload).await {
            warn!(topic, error = %e, "failed to publish event, continuing");
        }
    }

    async fn ensure_default_role(&self, user_id: UserId) {
        match self.roles.find_role_by_name(ROLE_USER).await {
            Ok(Some(role)) => {
                if let Err(e) = self.roles.assign_role(user_id, role.id, None).await {
                    warn!(error = %e, %user_id, "failed to assign default role, continuing");
                }
            }
            Ok(None) => warn!(%user_id, "default role {ROLE_USER} is not provisioned"),
            Err(e) => warn!(error = %e, "failed to look up default role"),
        }
    }

    async fn create_session(
        &self,
        user: &User,
        remember: bool,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<TokenPair> {
        let now = Utc::now();
        let session_id = Uuid::new_v4();
        let access_ttl = chrono_duration(self.jwt.access_duration);
        let refresh_ttl =
            chrono_duration(if remember { self.jwt.refresh_duration_remember_me } else { self.jwt.refresh_duration });

        let access_token =
            self.issuer.issue(user.id, &user.email, user.is_admin, session_id, TokenType::Access, access_ttl, now)?;
        let refresh_token =
            self.issuer.issue(user.id, &user.email, user.is_admin, session_id, TokenType::Refresh, refresh_ttl, now)?;

        let session = Session {
            id: session_id,
            user_id: user.id,
            access_fingerprint: fingerprint(&access_token, self.pepper()),
            refresh_fingerprint: fingerprint(&refresh_token, self.pepper()),
            device_info: None,
            user_agent,
            ip,
            access_expires_at: now + access_ttl,
            refresh_expires_at: now + refresh_ttl,
            last_used_at: now,
            is_active: true,
            revoked_at: None,
            revoked_reason: None,
            created_at: now,
        };
        self.sessions.insert(session).await?;
        self.publish_best_effort(
            topics::AUTH_SESSION_CREATED,
            serde_json::json!({ "user_id": user.id, "session_id": session_id }),
        )
        .await;

        Ok(TokenPair { access_token, refresh_token, expires_in: access_ttl.num_seconds(), session_id })
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        given_name: &str,
        family_name: &str,
        company: Option<String>,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<AuthOutcome> {
        check_strength(password)?;

        if self.users.find_by_email(email).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        let now = Utc::now();
        let password_hash = hash_password(password)?;
        let verification = VerificationToken {
            token: random_token(),
            expires_at: now + ChronoDuration::hours(24),
            attempts_in_window: 0,
            window_started_at: now,
        };
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash,
            given_name: given_name.to_string(),
            family_name: family_name.to_string(),
            company,
            email_verified: false,
            email_verification: Some(verification),
            password_reset: None,
            failed_login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            last_login_ip: None,
            is_active: true,
            is_admin: false,
            preferences: serde_json::json!({}),
            notification_preferences: serde_json::json!({}),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.users.insert(user.clone()).await?;
        self.ensure_default_role(user.id).await;

        self.publish_best_effort(topics::AUTH_REGISTER, serde_json::json!({ "user_id": user.id, "email": user.email })).await;
        if let Some(verification) = &user.email_verification {
            let task = EmailTask::new(
                EmailKind::Verification,
                user.email.clone(),
                "Verify your email",
                "verification",
                serde_json::json!({ "token": verification.token }),
            );
            self.publish_best_effort(topics::EMAIL_QUEUE, serde_json::to_value(task).unwrap_or_default()).await;
        }

        let tokens = self.create_session(&user, false, ip, user_agent).await?;
        Ok(AuthOutcome { user, tokens, remember_me: false })
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember: bool,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> AuthResult<AuthOutcome> {
        let now = Utc::now();
        let Some(mut user) = self.users.find_by_email(email).await? else {
            // No such user: still run a hash comparison so the response
            // latency doesn't disclose account existence.
            verify_password(password, dummy_hash());
            return Err(AuthError::InvalidCredentials);
        };

        if user.is_locked(now) {
            return Err(AuthError::Locked);
        }
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        if !verify_password(password, &user.password_hash) {
            user.failed_login_attempts += 1;
            if user.failed_login_attempts >= self.rate_limit.lockout_threshold {
                user.locked_until = Some(now + ChronoDuration::from_std(self.rate_limit.lockout_window).unwrap_or(ChronoDuration::minutes(15)));
            }
            user.updated_at = now;
            self.users.update(user.clone()).await?;
            self.publish_best_effort(topics::AUTH_ACCOUNT_LOCKED, serde_json::json!({ "user_id": user.id })).await;
            return Err(AuthError::InvalidCredentials);
        }

        user.failed_login_attempts = 0;
        user.locked_until = None;
        user.last_login_at = Some(now);
        user.last_login_ip = ip.clone();
        user.updated_at = now;
        self.users.update(user.clone()).await?;

        let tokens = self.create_session(&user, remember, ip, user_agent).await?;
        self.publish_best_effort(topics::AUTH_LOGIN, serde_json::json!({ "user_id": user.id })).await;
        Ok(AuthOutcome { user, tokens, remember_me: remember })
    }

    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenPair> {
        let _guard = self.refresh_lock.lock().await;

        let claims = self.issuer.verify(refresh_token, TokenType::Refresh)?;
        let fp = fingerprint(refresh_token, self.pepper());
        // A token that was already rotated by a concurrent caller no longer
        // matches any session's current fingerprint; that loser sees the
        // same InvalidCredentials a forged token would produce.
        let Some(mut session) = self.sessions.find_by_refresh_fingerprint(&fp).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !session.is_active {
            return Err(AuthError::InvalidCredentials);
        }
        let now = Utc::now();
        if session.is_refresh_expired(now) {
            return Err(AuthError::Expired);
        }

        let Some(user) = self.users.find_by_id(claims.sub).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        let access_ttl = chrono_duration(self.jwt.access_duration);
        let refresh_ttl = chrono_duration(self.jwt.refresh_duration);
        let access_token =
            self.issuer.issue(user.id, &user.email, user.is_admin, session.id, TokenType::Access, access_ttl, now)?;
        let new_refresh_token =
            self.issuer.issue(user.id, &user.email, user.is_admin, session.id, TokenType::Refresh, refresh_ttl, now)?;

        session.access_fingerprint = fingerprint(&access_token, self.pepper());
        session.refresh_fingerprint = fingerprint(&new_refresh_token, self.pepper());
        session.access_expires_at = now + access_ttl;
        session.refresh_expires_at = now + refresh_ttl;
        session.last_used_at = now;
        self.sessions.update(session.clone()).await?;

        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh_token,
            expires_in: access_ttl.num_seconds(),
            session_id: session.id,
        })
    }

    pub async fn logout(&self, session_id: SessionId) -> AuthResult<()> {
        let Some(mut session) = self.sessions.find_by_id(session_id).await? else {
            return Ok(());
        };
        if !session.is_active {
            return Ok(());
        }
        session.is_active = false;
        session.revoked_at = Some(Utc::now());
        session.revoked_reason = Some("user_logout".to_string());
        self.sessions.update(session.clone()).await?;
        self.publish_best_effort(
            topics::AUTH_SESSION_REVOKED,
            serde_json::json!({ "session_id": session_id, "reason": "user_logout" }),
        )
        .await;
        self.publish_best_effort(topics::AUTH_LOGOUT, serde_json::json!({ "session_id": session_id })).await;
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> AuthResult<()> {
        let Some(mut user) = self.users.find_by_verification_token(token).await? else {
            return Err(AuthError::NotFound);
        };
        let Some(verification) = user.email_verification.clone() else {
            return Err(AuthError::NotFound);
        };
        if !verification.is_valid(Utc::now()) {
            return Err(AuthError::Expired);
        }
        user.email_verified = true;
        user.email_verification = None;
        user.updated_at = Utc::now();
        self.users.update(user.clone()).await?;
        self.publish_best_effort(topics::AUTH_EMAIL_VERIFIED, serde_json::json!({ "user_id": user.id })).await;
        Ok(())
    }

    pub async fn resend_verification(&self, email: &str) -> AuthResult<()> {
        let Some(mut user) = self.users.find_by_email(email).await? else {
            return Err(AuthError::NotFound);
        };
        if user.email_verified {
            return Ok(());
        }
        let now = Utc::now();
        let mut verification = user.email_verification.clone().unwrap_or(VerificationToken {
            token: random_token(),
            expires_at: now + ChronoDuration::hours(24),
            attempts_in_window: 0,
            window_started_at: now,
        });

        if now.signed_duration_since(verification.window_started_at)
            > ChronoDuration::from_std(self.rate_limit.verification_window).unwrap_or(ChronoDuration::hours(1))
        {
            verification.attempts_in_window = 0;
            verification.window_started_at = now;
        }
        if verification.attempts_in_window >= self.rate_limit.verification_attempts_per_window {
            return Err(AuthError::RateLimited);
        }

        verification.token = random_token();
        verification.expires_at = now + ChronoDuration::hours(24);
        verification.attempts_in_window += 1;
        user.email_verification = Some(verification.clone());
        user.updated_at = now;
        self.users.update(user.clone()).await?;

        let task = EmailTask::new(
            EmailKind::Verification,
            user.email.clone(),
            "Verify your email",
            "verification",
            serde_json::json!({ "token": verification.token }),
        );
        self.publish_best_effort(topics::EMAIL_QUEUE, serde_json::to_value(task).unwrap_or_default()).await;
        Ok(())
    }

    /// Always succeeds from the caller's perspective; whether the address
    /// exists is never observable (spec §7: no oracle leakage).
    pub async fn forgot_password(&self, email: &str) -> AuthResult<()> {
        let Some(mut user) = self.users.find_by_email(email).await? else {
            return Ok(());
        };
        let now = Utc::now();
        let mut reset = user.password_reset.clone().unwrap_or(VerificationToken {
            token: random_token(),
            expires_at: now + ChronoDuration::hours(1),
            attempts_in_window: 0,
            window_started_at: now,
        });
        if now.signed_duration_since(reset.window_started_at)
            > ChronoDuration::from_std(self.rate_limit.reset_window).unwrap_or(ChronoDuration::hours(1))
        {
            reset.attempts_in_window = 0;
            reset.window_started_at = now;
        }
        if reset.attempts_in_window >= self.rate_limit.reset_attempts_per_window {
            return Ok(());
        }

        reset.token = random_token();
        reset.expires_at = now + ChronoDuration::hours(1);
        reset.attempts_in_window += 1;
        user.password_reset = Some(reset.clone());
        user.updated_at = now;
        self.users.update(user.clone()).await?;

        let task = EmailTask::new(
            EmailKind::PasswordReset,
            user.email.clone(),
            "Reset your password",
            "password_reset",
            serde_json::json!({ "token": reset.token }),
        );
        self.publish_best_effort(topics::EMAIL_QUEUE, serde_json::to_value(task).unwrap_or_default()).await;
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> AuthResult<()> {
        let Some(mut user) = self.users.find_by_reset_token(token).await? else {
            return Err(AuthError::NotFound);
        };
        let Some(reset) = user.password_reset.clone() else {
            return Err(AuthError::NotFound);
        };
        if !reset.is_valid(Utc::now()) {
            return Err(AuthError::Expired);
        }
        check_strength(new_password)?;

        user.password_hash = hash_password(new_password)?;
        user.password_reset = None;
        user.updated_at = Utc::now();
        self.users.update(user.clone()).await?;

        for mut session in self.sessions.list_active_for_user(user.id).await? {
            session.is_active = false;
            session.revoked_at = Some(Utc::now());
            session.revoked_reason = Some("password_reset".to_string());
            self.sessions.update(session).await?;
        }

        self.publish_best_effort(topics::AUTH_PASSWORD_CHANGED, serde_json::json!({ "user_id": user.id })).await;
        Ok(())
    }

    pub async fn get_user(&self, user_id: UserId) -> AuthResult<User> {
        self.users.find_by_id(user_id).await?.ok_or(AuthError::NotFound)
    }

    /// Updates presentation fields only (given/family name, company); no
    /// authority invariant is attached, unlike `change_password` or
    /// `reset_password`, which also revoke sessions.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        given_name: Option<String>,
        family_name: Option<String>,
        company: Option<String>,
    ) -> AuthResult<User> {
        let mut user = self.users.find_by_id(user_id).await?.ok_or(AuthError::NotFound)?;
        if let Some(given_name) = given_name {
            user.given_name = given_name;
        }
        if let Some(family_name) = family_name {
            user.family_name = family_name;
        }
        if company.is_some() {
            user.company = company;
        }
        user.updated_at = Utc::now();
        self.users.update(user.clone()).await?;
        Ok(user)
    }

    pub async fn validate_access_token(&self, token: &str) -> AuthResult<ValidatedToken> {
        let claims = self.issuer.verify(token, TokenType::Access)?;
        let Some(session) = self.sessions.find_by_id(claims.session_id).await? else {
            return Err(AuthError::NotFound);
        };
        if !session.is_usable(Utc::now()) {
            return Err(AuthError::Expired);
        }
        let permissions = self.permission_names_for(claims.sub).await?;
        Ok(ValidatedToken { claims, session, permissions })
    }

    async fn permission_names_for(&self, user_id: UserId) -> AuthResult<Vec<String>> {
        let roles = self.roles.roles_for_user(user_id).await?;
        let role_ids: Vec<RoleId> = roles.iter().map(|r| r.id).collect();
        let permissions = self.roles.permissions_for_roles(&role_ids).await?;
        Ok(permissions.into_iter().map(|p| p.name).collect())
    }

    pub async fn has_permission(&self, user_id: UserId, permission_name: &str) -> AuthResult<bool> {
        let names = self.permission_names_for(user_id).await?;
        Ok(names.iter().any(|n| n == permission_name))
    }

    pub async fn list_roles(&self, user_id: UserId) -> AuthResult<Vec<Role>> {
        Ok(self.roles.roles_for_user(user_id).await?)
    }

    pub async fn list_permissions(&self, user_id: UserId) -> AuthResult<Vec<Permission>> {
        let roles = self.roles.roles_for_user(user_id).await?;
        let role_ids: Vec<RoleId> = roles.iter().map(|r| r.id).collect();
        Ok(self.roles.permissions_for_roles(&role_ids).await?)
    }

    async fn require_permission(&self, caller_id: UserId, permission_name: &str) -> AuthResult<()> {
        if self.has_permission(caller_id, permission_name).await? {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied)
        }
    }

    pub async fn list_all_roles(&self, caller_id: UserId) -> AuthResult<Vec<Role>> {
        self.require_permission(caller_id, "roles:list").await?;
        Ok(self.roles.list_roles().await?)
    }

    pub async fn list_all_permissions(&self, caller_id: UserId) -> AuthResult<Vec<Permission>> {
        self.require_permission(caller_id, "permissions:list").await?;
        Ok(self.roles.list_permissions().await?)
    }

    pub async fn assign_role(&self, caller_id: UserId, target_user_id: UserId, role_id: RoleId) -> AuthResult<()> {
        self.require_permission(caller_id, "roles:assign").await?;
        self.roles.assign_role(target_user_id, role_id, Some(caller_id)).await?;
        self.publish_best_effort(
            topics::AUTH_PERMISSION_CHANGED,
            serde_json::json!({ "user_id": target_user_id, "role_id": role_id, "action": "assign" }),
        )
        .await;
        Ok(())
    }

    /// Refuses when the target role is the admin role and removing it would
    /// leave the system with zero admins (spec §4.1 invariant).
    pub async fn remove_role(&self, caller_id: UserId, target_user_id: UserId, role_id: RoleId) -> AuthResult<()> {
        self.require_permission(caller_id, "roles:assign").await?;

        if let Some(admin_role) = self.roles.find_role_by_name(ROLE_ADMIN).await? {
            if admin_role.id == role_id {
                let admins = self.roles.users_with_role(role_id).await?;
                if admins.len() <= 1 && admins.contains(&target_user_id) {
                    return Err(AuthError::Domain(DomainError::Validation(
                        "cannot remove the last admin in the system".to_string(),
                    )));
                }
            }
        }

        self.roles.remove_role(target_user_id, role_id).await?;
        self.publish_best_effort(
            topics::AUTH_PERMISSION_CHANGED,
            serde_json::json!({ "user_id": target_user_id, "role_id": role_id, "action": "remove" }),
        )
        .await;
        Ok(())
    }

    pub async fn change_password(&self, user_id: UserId, current_password: &str, new_password: &str) -> AuthResult<()> {
        let Some(mut user) = self.users.find_by_id(user_id).await? else {
            return Err(AuthError::NotFound);
        };
        if !verify_password(current_password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        check_strength(new_password)?;
        user.password_hash = hash_password(new_password)?;
        user.updated_at = Utc::now();
        self.users.update(user.clone()).await?;

        for mut session in self.sessions.list_active_for_user(user.id).await? {
            session.is_active = false;
            session.revoked_at = Some(Utc::now());
            session.revoked_reason = Some("password_changed".to_string());
            self.sessions.update(session).await?;
        }

        self.publish_best_effort(topics::AUTH_PASSWORD_CHANGED, serde_json::json!({ "user_id": user.id })).await;
        Ok(())
    }
}
