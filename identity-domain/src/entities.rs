//! Entity definitions for the credential and session authority (spec §3).
//! Plain data, no behavior — invariants are enforced by `identity-auth` and
//! by the repository implementations, not by the structs themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type SessionId = Uuid;
pub type RoleId = Uuid;
pub type PermissionId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub attempts_in_window: u32,
    pub window_started_at: DateTime<Utc>,
}

impl VerificationToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub given_name: String,
    pub family_name: String,
    pub company: Option<String>,
    pub email_verified: bool,
    pub email_verification: Option<VerificationToken>,
    pub password_reset: Option<VerificationToken>,
    pub failed_login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub is_active: bool,
    pub is_admin: bool,
    pub preferences: serde_json::Value,
    pub notification_preferences: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// A user is visible to lookups only while not tombstoned (spec §3 P1).
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub access_fingerprint: String,
    pub refresh_fingerprint: String,
    pub device_info: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub is_active: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_refresh_expired(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at <= now
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.access_expires_at > now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub permission_id: PermissionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRole {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub assigned_by: Option<UserId>,
    pub assigned_at: DateTime<Utc>,
}

/// Well-known system role names (spec §4.1: "default non-admin role",
/// §4.1/§9: "the admin role").
pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";
