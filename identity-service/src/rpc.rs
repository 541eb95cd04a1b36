//! Inter-service surface other authorities call into: `ValidateToken`,
//! `GetUserContext`, `CheckPermission`, `GetUserPermissions`, `HealthCheck`.
//! Transported as JSON over HTTP rather than generated protobuf stubs — see
//! the ledger entry in `DESIGN.md` for why. Callers authenticate the usual
//! way (mesh-internal network boundary plus the token under evaluation);
//! there is no separate service-to-service credential here.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use identity_auth::AuthError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,
    #[serde(default)]
    pub calling_service: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateTokenResponse {
    pub valid: bool,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub is_admin: Option<bool>,
    pub session_id: Option<Uuid>,
    pub permissions: Vec<String>,
    pub expires_at: Option<i64>,
    pub error_message: Option<String>,
}

pub async fn validate_token(
    State(state): State<AppState>,
    Json(req): Json<ValidateTokenRequest>,
) -> Json<ValidateTokenResponse> {
    if req.token.is_empty() {
        return Json(ValidateTokenResponse {
            valid: false,
            user_id: None,
            email: None,
            is_admin: None,
            session_id: None,
            permissions: Vec::new(),
            expires_at: None,
            error_message: Some("token is required".to_string()),
        });
    }
    match state.auth.validate_access_token(&req.token).await {
        Ok(validated) => Json(ValidateTokenResponse {
            valid: true,
            user_id: Some(validated.claims.sub),
            email: Some(validated.claims.email.clone()),
            is_admin: Some(validated.claims.is_admin),
            session_id: Some(validated.session.id),
            permissions: validated.permissions,
            expires_at: Some(validated.claims.exp),
            error_message: None,
        }),
        Err(e) => Json(ValidateTokenResponse {
            valid: false,
            user_id: None,
            email: None,
            is_admin: None,
            session_id: None,
            permissions: Vec::new(),
            expires_at: None,
            error_message: Some(e.to_string()),
        }),
    }
}

#[derive(Debug, Deserialize)]
pub struct UserContextRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UserContextResponse {
    pub found: bool,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub is_admin: Option<bool>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

pub async fn get_user_context(State(state): State<AppState>, Json(req): Json<UserContextRequest>) -> Json<UserContextResponse> {
    match state.auth.get_user(req.user_id).await {
        Ok(user) => {
            let roles = state.auth.list_roles(user.id).await.unwrap_or_default();
            let permissions = state.auth.list_permissions(user.id).await.unwrap_or_default();
            Json(UserContextResponse {
                found: true,
                user_id: Some(user.id),
                email: Some(user.email),
                given_name: Some(user.given_name),
                family_name: Some(user.family_name),
                is_admin: Some(user.is_admin),
                roles: roles.into_iter().map(|r| r.name).collect(),
                permissions: permissions.into_iter().map(|p| p.name).collect(),
            })
        }
        Err(_) => Json(UserContextResponse {
            found: false,
            user_id: None,
            email: None,
            given_name: None,
            family_name: None,
            is_admin: None,
            roles: Vec::new(),
            permissions: Vec::new(),
        }),
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckPermissionRequest {
    pub user_id: Uuid,
    pub permission: String,
    #[serde(default)]
    pub resource_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckPermissionResponse {
    pub allowed: bool,
    pub reason: String,
    pub user_id: Uuid,
    pub permission: String,
    pub resource_id: Option<String>,
}

pub async fn check_permission(State(state): State<AppState>, Json(req): Json<CheckPermissionRequest>) -> Json<CheckPermissionResponse> {
    let (allowed, reason) = match state.auth.has_permission(req.user_id, &req.permission).await {
        Ok(true) => (true, "granted".to_string()),
        Ok(false) => (false, "user has no role bound to this permission".to_string()),
        Err(e) => (false, e.to_string()),
    };
    Json(CheckPermissionResponse {
        allowed,
        reason,
        user_id: req.user_id,
        permission: req.permission,
        resource_id: req.resource_id,
    })
}

#[derive(Debug, Deserialize)]
pub struct UserPermissionsRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub include_roles: bool,
}

#[derive(Debug, Serialize)]
pub struct UserPermissionsResponse {
    pub permissions: Vec<String>,
    pub roles: Vec<String>,
}

pub async fn get_user_permissions(State(state): State<AppState>, Json(req): Json<UserPermissionsRequest>) -> Json<UserPermissionsResponse> {
    let permissions = match state.auth.list_permissions(req.user_id).await {
        Ok(perms) => perms.into_iter().map(|p| p.name).collect(),
        Err(AuthError::NotFound) => Vec::new(),
        Err(_) => Vec::new(),
    };
    let roles = if req.include_roles {
        state.auth.list_roles(req.user_id).await.map(|rs| rs.into_iter().map(|r| r.name).collect()).unwrap_or_default()
    } else {
        Vec::new()
    };
    Json(UserPermissionsResponse { permissions, roles })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}
