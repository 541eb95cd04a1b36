mod config;
mod mesh_client;
mod routes;
mod state;

use chrono::Utc;
use common_config::{MeshConfig, TransportConfig};
use config::GatewayConfig;
use mesh_client::MeshClient;
use mesh_core::transport::grpc::GrpcTransportFactory;
use mesh_core::{PeerInstance, PeerStatus};
use mesh_registry::store::memory::InMemoryEphemeralStore;
use mesh_registry::{RegistryClient, RegistryReader};
use mesh_pool::PoolManager;
use state::AppState;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    common_telemetry::init_default("gateway");

    // Spec §6: both HTTP2_ENABLED and TLS_ENABLED must be true at start.
    // Actual TLS termination and HTTP/2-specific transport setup is the
    // out-of-scope "glue" spec.md §1 names; this call only enforces the
    // operator-visible invariant before the process starts serving.
    TransportConfig::from_env()?;

    let gateway_cfg = GatewayConfig::from_env();
    let mesh_cfg = MeshConfig::from_env()?;

    let store = Arc::new(InMemoryEphemeralStore::new());
    let self_instance = PeerInstance {
        instance_id: Uuid::new_v4(),
        service_name: gateway_cfg.self_service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        host: "127.0.0.1".to_string(),
        grpc_port: 0,
        http_port: gateway_cfg.bind_port,
        status: PeerStatus::Starting,
        last_seen: Utc::now(),
        started_at: Utc::now(),
        metadata: serde_json::json!({}),
    };
    let registry_client = Arc::new(RegistryClient::new(store.clone(), self_instance, &mesh_cfg));
    registry_client.start().await;
    registry_client.set_status(PeerStatus::Healthy).await;

    let reader = Arc::new(RegistryReader::new(store, mesh_cfg.registry_ttl));
    let factory = Arc::new(GrpcTransportFactory);
    let pool_manager = Arc::new(PoolManager::new(gateway_cfg.self_service_name.clone(), reader, factory, mesh_cfg.clone()));
    pool_manager.start().await;

    let mesh = Arc::new(MeshClient::new(pool_manager.clone(), mesh_cfg));
    let state = AppState::new(gateway_cfg.identity_service_base_url.clone(), mesh);
    let app = routes::build(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", gateway_cfg.bind_port)).await?;
    tracing::info!(port = gateway_cfg.bind_port, identity_url = %gateway_cfg.identity_service_base_url, "gateway listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("gateway shutting down");
    };
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    pool_manager.stop().await;
    registry_client.stop().await;
    Ok(())
}
