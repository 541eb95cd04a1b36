//! Persistence-adapter traits. These are the "leaves" of spec §2 — the
//! authority depends on them as interfaces only; concrete implementations
//! (in-memory for tests, `sqlx`/Postgres for production) live in
//! [`crate::memory`] and [`crate::postgres`] respectively, following the
//! teacher's `adk_session::SessionService` trait-plus-backends shape.

use crate::entities::{Permission, PermissionId, Role, RoleId, Session, SessionId, User, UserId};
use crate::error::DomainResult;
use async_trait::async_trait;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: User) -> DomainResult<()>;
    async fn update(&self, user: User) -> DomainResult<()>;
    async fn find_by_id(&self, id: UserId) -> DomainResult<Option<User>>;
    /// Never returns a soft-deleted row (spec §3: "email unique among rows
    /// with deleted_at = null").
    async fn find_by_email(&self, email: &str) -> DomainResult<Option<User>>;
    async fn find_by_verification_token(&self, token: &str) -> DomainResult<Option<User>>;
    async fn find_by_reset_token(&self, token: &str) -> DomainResult<Option<User>>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: Session) -> DomainResult<()>;
    async fn update(&self, session: Session) -> DomainResult<()>;
    async fn find_by_id(&self, id: SessionId) -> DomainResult<Option<Session>>;
    async fn find_by_refresh_fingerprint(&self, fingerprint: &str) -> DomainResult<Option<Session>>;
    async fn list_active_for_user(&self, user_id: UserId) -> DomainResult<Vec<Session>>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn find_role_by_id(&self, id: RoleId) -> DomainResult<Option<Role>>;
    async fn find_role_by_name(&self, name: &str) -> DomainResult<Option<Role>>;
    async fn list_roles(&self) -> DomainResult<Vec<Role>>;

    async fn find_permission_by_name(&self, name: &str) -> DomainResult<Option<Permission>>;
    async fn list_permissions(&self) -> DomainResult<Vec<Permission>>;

    async fn roles_for_user(&self, user_id: UserId) -> DomainResult<Vec<Role>>;
    async fn permissions_for_roles(&self, role_ids: &[RoleId]) -> DomainResult<Vec<Permission>>;

    async fn assign_role(&self, user_id: UserId, role_id: RoleId, assigned_by: Option<UserId>) -> DomainResult<()>;
    async fn remove_role(&self, user_id: UserId, role_id: RoleId) -> DomainResult<()>;

    /// Users holding the given role, used to enforce "cannot remove the last
    /// admin system-wide" (spec §4.1).
    async fn users_with_role(&self, role_id: RoleId) -> DomainResult<Vec<UserId>>;

    async fn permission_id(&self, id: PermissionId) -> DomainResult<Option<Permission>>;
}
