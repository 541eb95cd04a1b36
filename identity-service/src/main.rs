mod dto;
mod error;
mod extractor;
mod handlers;
mod router;
mod rpc;
mod state;

use common_config::{JwtConfig, RateLimitConfig};
use eventbus::InMemoryEventBus;
use identity_auth::AuthService;
use identity_domain::{InMemoryRoleRepository, InMemorySessionRepository, InMemoryUserRepository};
use state::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    common_telemetry::init_default("identity-service");

    let jwt = JwtConfig::from_env()?;
    let rate_limit = RateLimitConfig::from_env()?;

    let auth = Arc::new(AuthService::new(
        Arc::new(InMemoryUserRepository::new()),
        Arc::new(InMemorySessionRepository::new()),
        Arc::new(InMemoryRoleRepository::new()),
        Arc::new(InMemoryEventBus::new()),
        jwt,
        rate_limit,
    ));

    let app = router::build(AppState::new(auth));

    let port: u16 = std::env::var("IDENTITY_SERVICE_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8081);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "identity-service listening");
    axum::serve(listener, app).await?;
    Ok(())
}
