//! End-to-end flows against the in-memory backends, matching the concrete
//! scenarios the authority is expected to satisfy.

use chrono::Utc;
use common_config::{JwtConfig, RateLimitConfig};
use eventbus::InMemoryEventBus;
use eventbus::topics;
use identity_auth::{AuthError, AuthService};
use identity_domain::{
    InMemoryRoleRepository, InMemorySessionRepository, InMemoryUserRepository, Permission, Role,
    RoleId, RoleRepository, ROLE_ADMIN, ROLE_USER,
};
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    auth: AuthService,
    roles: Arc<InMemoryRoleRepository>,
    admin_role_id: RoleId,
    bus: Arc<InMemoryEventBus>,
}

fn new_fixture() -> Fixture {
    let users = Arc::new(InMemoryUserRepository::new());
    let sessions = Arc::new(InMemorySessionRepository::new());
    let roles = Arc::new(InMemoryRoleRepository::new());
    let now = Utc::now();
    let user_role_id = Uuid::new_v4();
    let admin_role_id = Uuid::new_v4();
    roles.add_role(Role { id: user_role_id, name: ROLE_USER.to_string(), description: String::new(), is_system: true, created_at: now, updated_at: now });
    roles.add_role(Role { id: admin_role_id, name: ROLE_ADMIN.to_string(), description: String::new(), is_system: true, created_at: now, updated_at: now });
    let assign_permission_id = Uuid::new_v4();
    roles.add_permission(Permission { id: assign_permission_id, name: "roles:assign".to_string(), resource: "roles".to_string(), action: "assign".to_string(), description: String::new() });
    roles.bind_permission(admin_role_id, assign_permission_id);
    let bus = Arc::new(InMemoryEventBus::new());

    let auth = AuthService::new(
        users,
        sessions,
        roles.clone(),
        bus.clone(),
        JwtConfig::for_tests(),
        RateLimitConfig::for_tests(),
    );
    Fixture { auth, roles, admin_role_id, bus }
}

#[tokio::test]
async fn s1_register_login_refresh_logout() {
    let fx = new_fixture();

    let registered = fx
        .auth
        .register("a@x.io", "Str0ng!Passw0rd", "A", "B", None, None, None)
        .await
        .expect("registration should succeed");
    let registration_session_id = registered.tokens.session_id;

    let logged_in = fx
        .auth
        .login("a@x.io", "Str0ng!Passw0rd", false, None, None)
        .await
        .expect("login should succeed");
    assert_ne!(logged_in.tokens.session_id, registration_session_id, "login opens its own session");

    let refreshed = fx.auth.refresh(&logged_in.tokens.refresh_token).await.expect("first refresh should succeed");
    assert_eq!(refreshed.session_id, logged_in.tokens.session_id);

    let reuse = fx.auth.refresh(&logged_in.tokens.refresh_token).await;
    assert!(matches!(reuse, Err(AuthError::InvalidCredentials)), "reusing a rotated refresh token must fail");

    fx.auth.logout(refreshed.session_id).await.expect("logout should succeed");
    let validated = fx.auth.validate_access_token(&refreshed.access_token).await;
    assert!(validated.is_err(), "validating a token from a logged-out session must fail");
}

#[tokio::test]
async fn s2_lockout_after_five_failures() {
    let fx = new_fixture();
    fx.auth.register("b@x.io", "Str0ng!Passw0rd", "B", "B", None, None, None).await.unwrap();

    for attempt in 0..4 {
        let err = fx.auth.login("b@x.io", "WrongPassword1!", false, None, None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials), "attempt {attempt} should be a plain credential failure");
    }
    let fifth = fx.auth.login("b@x.io", "WrongPassword1!", false, None, None).await.unwrap_err();
    assert!(matches!(fifth, AuthError::InvalidCredentials));

    let sixth = fx.auth.login("b@x.io", "Str0ng!Passw0rd", false, None, None).await.unwrap_err();
    assert!(matches!(sixth, AuthError::Locked), "correct password must not bypass lockout even when supplied correctly");
}

#[tokio::test]
async fn s3_password_reset_revokes_sessions() {
    let fx = new_fixture();
    fx.auth.register("c@x.io", "Str0ng!Passw0rd", "C", "C", None, None, None).await.unwrap();
    let login = fx.auth.login("c@x.io", "Str0ng!Passw0rd", false, None, None).await.unwrap();

    let mut email_rx = fx.bus.subscribe(topics::EMAIL_QUEUE);
    fx.auth.forgot_password("c@x.io").await.unwrap();
    let task = email_rx.recv().await.expect("a password-reset email should have been queued");
    let reset_token = task["variables"]["token"].as_str().expect("task carries the reset token").to_string();

    fx.auth.reset_password(&reset_token, "NewStr0ng!Passw0rd").await.expect("reset should succeed");

    let validated = fx.auth.validate_access_token(&login.tokens.access_token).await;
    assert!(validated.is_err(), "sessions active before reset must be revoked");

    let relogin_old = fx.auth.login("c@x.io", "Str0ng!Passw0rd", false, None, None).await;
    assert!(relogin_old.is_err(), "old password must no longer work");

    let relogin_new = fx.auth.login("c@x.io", "NewStr0ng!Passw0rd", false, None, None).await;
    assert!(relogin_new.is_ok(), "new password must work");
}

#[tokio::test]
async fn last_admin_cannot_be_demoted() {
    let fx = new_fixture();
    let registered = fx.auth.register("admin@x.io", "Str0ng!Passw0rd", "Ad", "Min", None, None, None).await.unwrap();

    fx.roles.assign_role(registered.user.id, fx.admin_role_id, None).await.unwrap();

    let err = fx.auth.remove_role(registered.user.id, registered.user.id, fx.admin_role_id).await;
    assert!(err.is_err(), "removing the only admin's admin role must be refused");
}

#[tokio::test]
async fn second_admin_can_be_demoted() {
    let fx = new_fixture();
    let first = fx.auth.register("admin1@x.io", "Str0ng!Passw0rd", "A", "One", None, None, None).await.unwrap();
    let second = fx.auth.register("admin2@x.io", "Str0ng!Passw0rd", "A", "Two", None, None, None).await.unwrap();
    fx.roles.assign_role(first.user.id, fx.admin_role_id, None).await.unwrap();
    fx.roles.assign_role(second.user.id, fx.admin_role_id, None).await.unwrap();

    let result = fx.auth.remove_role(first.user.id, second.user.id, fx.admin_role_id).await;
    assert!(result.is_ok(), "with two admins present, demoting one must be allowed");
}
