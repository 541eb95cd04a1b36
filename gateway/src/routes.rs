//! The gateway's request-routing tables (spec §1: "specified only insofar
//! as they touch C1 and C2"). Auth-surface requests are forwarded verbatim
//! to the identity-service's HTTP surface; a small `/mesh/:service/:method`
//! surface exercises the mesh client directly so peers reachable only via
//! C2 (not C1) have an entry point through the edge.

use crate::mesh_client::MeshClient;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use mesh_core::MeshError;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use std::time::Duration;

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn build(state: AppState) -> Router {
    let forwarded = Router::new()
        .route("/auth/register", post(forward))
        .route("/auth/login", post(forward))
        .route("/auth/refresh", post(forward))
        .route("/auth/logout", post(forward))
        .route("/auth/forgot-password", post(forward))
        .route("/auth/reset-password", post(forward))
        .route("/auth/verify-email", post(forward))
        .route("/auth/resend-verification", post(forward))
        .route("/user/profile", any(forward))
        .route("/user/change-password", post(forward));

    Router::new()
        .merge(forwarded)
        .route("/mesh/{service}/{method}", post(mesh_call))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Forwards the request verbatim (method, path, `Authorization` header,
/// body) to the identity-service and mirrors its status/body back. Request
/// binding/validation beyond this pass-through is the identity-service's
/// job, not the gateway's (spec.md §1 Non-goals).
async fn forward(
    State(state): State<AppState>,
    method: Method,
    original: axum::extract::OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let url = format!("{}{}", state.identity_base_url, original.0.path());
    let mut req = state.http.request(method, &url).body(body.to_vec());

    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        req = req.header(axum::http::header::AUTHORIZATION, auth.clone());
    }
    if let Some(ct) = headers.get(axum::http::header::CONTENT_TYPE) {
        req = req.header(axum::http::header::CONTENT_TYPE, ct.clone());
    } else {
        req = req.header(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    match req.send().await {
        Ok(resp) => {
            let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            let bytes = resp.bytes().await.unwrap_or_default();
            (status, bytes).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, "identity-service forward failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({"error": "peer_unavailable", "message": "identity service unreachable"})),
            )
                .into_response()
        }
    }
}

async fn mesh_call(
    State(state): State<AppState>,
    Path((service, method)): Path<(String, String)>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    match state.mesh.call(&service, &method, payload).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => mesh_error_response(e),
    }
}

fn mesh_error_response(err: MeshError) -> Response {
    let status = StatusCode::from_u16(err.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({"error": err.kind().as_str(), "message": err.to_string()}))).into_response()
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let _ = &state.mesh as &std::sync::Arc<MeshClient>;
    Json(serde_json::json!({"status": "ok", "service": "gateway"}))
}
