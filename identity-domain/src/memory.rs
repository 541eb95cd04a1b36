//! In-memory persistence adapters used by tests and by the `simd`/gateway
//! integration harness. Structure follows the teacher's
//! `adk_session::InMemorySessionService`: `Arc<RwLock<HashMap<..>>>` maps
//! plus secondary indexes kept in lockstep, never a single global lock.

use crate::entities::{Permission, PermissionId, Role, RoleId, Session, SessionId, User, UserId};
use crate::error::{DomainError, DomainResult};
use crate::repository::{RoleRepository, SessionRepository, UserRepository};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryUserRepository {
    by_id: RwLock<HashMap<UserId, User>>,
    email_index: RwLock<HashMap<String, UserId>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert(&self, user: User) -> DomainResult<()> {
        if user.deleted_at.is_none() {
            let email_index = self.email_index.read().unwrap();
            if email_index.contains_key(&user.email) {
                return Err(DomainError::EmailAlreadyExists);
            }
        }
        let mut by_id = self.by_id.write().unwrap();
        let mut email_index = self.email_index.write().unwrap();
        email_index.insert(user.email.clone(), user.id);
        by_id.insert(user.id, user);
        Ok(())
    }

    async fn update(&self, user: User) -> DomainResult<()> {
        let mut by_id = self.by_id.write().unwrap();
        let mut email_index = self.email_index.write().unwrap();
        if let Some(previous) = by_id.get(&user.id) {
            if previous.email != user.email && previous.deleted_at.is_none() {
                email_index.remove(&previous.email);
            }
            // A soft-deleted row frees its email for reuse; a freshly
            // tombstoned row must drop its index entry here too, since
            // `insert` only guards against rows that were never deleted.
            if user.deleted_at.is_some() {
                email_index.remove(&user.email);
            } else {
                email_index.insert(user.email.clone(), user.id);
            }
        }
        by_id.insert(user.id, user);
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> DomainResult<Option<User>> {
        Ok(self.by_id.read().unwrap().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> DomainResult<Option<User>> {
        let email_index = self.email_index.read().unwrap();
        let Some(id) = email_index.get(email) else { return Ok(None) };
        let by_id = self.by_id.read().unwrap();
        Ok(by_id.get(id).filter(|u| !u.is_deleted()).cloned())
    }

    async fn find_by_verification_token(&self, token: &str) -> DomainResult<Option<User>> {
        let by_id = self.by_id.read().unwrap();
        Ok(by_id
            .values()
            .find(|u| u.email_verification.as_ref().is_some_and(|t| t.token == token))
            .cloned())
    }

    async fn find_by_reset_token(&self, token: &str) -> DomainResult<Option<User>> {
        let by_id = self.by_id.read().unwrap();
        Ok(by_id.values().find(|u| u.password_reset.as_ref().is_some_and(|t| t.token == token)).cloned())
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    by_id: RwLock<HashMap<SessionId, Session>>,
    refresh_index: RwLock<HashMap<String, SessionId>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: Session) -> DomainResult<()> {
        let mut by_id = self.by_id.write().unwrap();
        let mut refresh_index = self.refresh_index.write().unwrap();
        refresh_index.insert(session.refresh_fingerprint.clone(), session.id);
        by_id.insert(session.id, session);
        Ok(())
    }

    async fn update(&self, session: Session) -> DomainResult<()> {
        let mut by_id = self.by_id.write().unwrap();
        let mut refresh_index = self.refresh_index.write().unwrap();
        if let Some(previous) = by_id.get(&session.id) {
            if previous.refresh_fingerprint != session.refresh_fingerprint {
                refresh_index.remove(&previous.refresh_fingerprint);
                refresh_index.insert(session.refresh_fingerprint.clone(), session.id);
            }
        }
        by_id.insert(session.id, session);
        Ok(())
    }

    async fn find_by_id(&self, id: SessionId) -> DomainResult<Option<Session>> {
        Ok(self.by_id.read().unwrap().get(&id).cloned())
    }

    async fn find_by_refresh_fingerprint(&self, fingerprint: &str) -> DomainResult<Option<Session>> {
        let refresh_index = self.refresh_index.read().unwrap();
        let Some(id) = refresh_index.get(fingerprint) else { return Ok(None) };
        Ok(self.by_id.read().unwrap().get(id).cloned())
    }

    async fn list_active_for_user(&self, user_id: UserId) -> DomainResult<Vec<Session>> {
        let by_id = self.by_id.read().unwrap();
        Ok(by_id.values().filter(|s| s.user_id == user_id && s.is_active).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryRoleRepository {
    roles: RwLock<HashMap<RoleId, Role>>,
    permissions: RwLock<HashMap<PermissionId, Permission>>,
    role_permissions: RwLock<HashMap<RoleId, HashSet<PermissionId>>>,
    user_roles: RwLock<HashMap<UserId, HashSet<RoleId>>>,
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_role(&self, role: Role) {
        self.roles.write().unwrap().insert(role.id, role);
    }

    pub fn add_permission(&self, permission: Permission) {
        self.permissions.write().unwrap().insert(permission.id, permission);
    }

    pub fn bind_permission(&self, role_id: RoleId, permission_id: PermissionId) {
        self.role_permissions.write().unwrap().entry(role_id).or_default().insert(permission_id);
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn find_role_by_id(&self, id: RoleId) -> DomainResult<Option<Role>> {
        Ok(self.roles.read().unwrap().get(&id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> DomainResult<Option<Role>> {
        Ok(self.roles.read().unwrap().values().find(|r| r.name == name).cloned())
    }

    async fn list_roles(&self) -> DomainResult<Vec<Role>> {
        Ok(self.roles.read().unwrap().values().cloned().collect())
    }

    async fn find_permission_by_name(&self, name: &str) -> DomainResult<Option<Permission>> {
        Ok(self.permissions.read().unwrap().values().find(|p| p.name == name).cloned())
    }

    async fn list_permissions(&self) -> DomainResult<Vec<Permission>> {
        Ok(self.permissions.read().unwrap().values().cloned().collect())
    }

    async fn roles_for_user(&self, user_id: UserId) -> DomainResult<Vec<Role>> {
        let user_roles = self.user_roles.read().unwrap();
        let Some(role_ids) = user_roles.get(&user_id) else { return Ok(Vec::new()) };
        let roles = self.roles.read().unwrap();
        Ok(role_ids.iter().filter_map(|id| roles.get(id).cloned()).collect())
    }

    async fn permissions_for_roles(&self, role_ids: &[RoleId]) -> DomainResult<Vec<Permission>> {
        let role_permissions = self.role_permissions.read().unwrap();
        let permissions = self.permissions.read().unwrap();
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for role_id in role_ids {
            if let Some(perm_ids) = role_permissions.get(role_id) {
                for perm_id in perm_ids {
                    if seen.insert(*perm_id) {
                        if let Some(p) = permissions.get(perm_id) {
                            result.push(p.clone());
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    async fn assign_role(&self, user_id: UserId, role_id: RoleId, _assigned_by: Option<UserId>) -> DomainResult<()> {
        if !self.roles.read().unwrap().contains_key(&role_id) {
            return Err(DomainError::RoleNotFound(role_id.to_string()));
        }
        self.user_roles.write().unwrap().entry(user_id).or_default().insert(role_id);
        Ok(())
    }

    async fn remove_role(&self, user_id: UserId, role_id: RoleId) -> DomainResult<()> {
        if let Some(roles) = self.user_roles.write().unwrap().get_mut(&user_id) {
            roles.remove(&role_id);
        }
        Ok(())
    }

    async fn users_with_role(&self, role_id: RoleId) -> DomainResult<Vec<UserId>> {
        let user_roles = self.user_roles.read().unwrap();
        Ok(user_roles.iter().filter(|(_, roles)| roles.contains(&role_id)).map(|(u, _)| *u).collect())
    }

    async fn permission_id(&self, id: PermissionId) -> DomainResult<Option<Permission>> {
        Ok(self.permissions.read().unwrap().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_user(email: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            given_name: "A".to_string(),
            family_name: "B".to_string(),
            company: None,
            email_verified: false,
            email_verification: None,
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
        }
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let repo = InMemoryUserRepository::new();
        repo.insert(sample_user("a@x.io")).await.unwrap();
        let err = repo.insert(sample_user("a@x.io")).await.unwrap_err();
        assert!(matches!(err, DomainError::EmailAlreadyExists));
    }

    #[tokio::test]
    async fn email_is_reusable_after_soft_delete() {
        let repo = InMemoryUserRepository::new();
        let mut user = sample_user("a@x.io");
        repo.insert(user.clone()).await.unwrap();
        user.deleted_at = Some(Utc::now());
        repo.update(user).await.unwrap();

        repo.insert(sample_user("a@x.io")).await.expect("tombstoned row must free its email");
    }

    #[tokio::test]
    async fn soft_deleted_user_not_found_by_email() {
        let repo = InMemoryUserRepository::new();
        let mut user = sample_user("a@x.io");
        let id = user.id;
        repo.insert(user.clone()).await.unwrap();
        user.deleted_at = Some(Utc::now());
        repo.update(user).await.unwrap();

        assert!(repo.find_by_email("a@x.io").await.unwrap().is_none());
        assert!(repo.find_by_id(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn role_assignment_and_permission_union() {
        let repo = InMemoryRoleRepository::new();
        let role_id = Uuid::new_v4();
        let perm_id = Uuid::new_v4();
        repo.add_role(Role {
            id: role_id,
            name: "user".into(),
            description: String::new(),
            is_system: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        repo.add_permission(Permission {
            id: perm_id,
            name: "users:read".into(),
            resource: "users".into(),
            action: "read".into(),
            description: String::new(),
        });
        repo.bind_permission(role_id, perm_id);

        let user_id = Uuid::new_v4();
        repo.assign_role(user_id, role_id, None).await.unwrap();
        let roles = repo.roles_for_user(user_id).await.unwrap();
        assert_eq!(roles.len(), 1);

        let perms = repo.permissions_for_roles(&[role_id]).await.unwrap();
        assert_eq!(perms.len(), 1);
        assert_eq!(perms[0].name, "users:read");
    }
}
