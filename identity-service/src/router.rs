use crate::{handlers, rpc};
use crate::state::AppState;
use axum::routing::{get, post, put};
use axum::Router;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn build(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/forgot-password", post(handlers::forgot_password))
        .route("/auth/reset-password", post(handlers::reset_password))
        .route("/auth/verify-email", post(handlers::verify_email))
        .route("/auth/resend-verification", post(handlers::resend_verification));

    let user_routes = Router::new()
        .route("/user/profile", get(handlers::get_profile))
        .route("/user/profile", put(handlers::update_profile))
        .route("/user/change-password", post(handlers::change_password));

    // Internal surface other services dial into. Not exposed through the
    // public gateway; reachable only on the mesh-internal network.
    let rpc_routes = Router::new()
        .route("/rpc/validate-token", post(rpc::validate_token))
        .route("/rpc/user-context", post(rpc::get_user_context))
        .route("/rpc/check-permission", post(rpc::check_permission))
        .route("/rpc/user-permissions", post(rpc::get_user_permissions))
        .route("/rpc/health", get(rpc::health_check));

    Router::new()
        .merge(auth_routes)
        .merge(user_routes)
        .merge(rpc_routes)
        .route("/health", get(rpc::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
