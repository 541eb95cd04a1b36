//! Shared state handed to every gateway route: the identity-service HTTP
//! client (spec §2 "forwards to C1 over HTTP or RPC") and the mesh client
//! used to reach other peers (spec §2 "uses C2 to reach other peers with
//! timeouts and retries").

use crate::mesh_client::MeshClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub identity_base_url: Arc<String>,
    pub http: reqwest::Client,
    pub mesh: Arc<MeshClient>,
}

impl AppState {
    pub fn new(identity_base_url: String, mesh: Arc<MeshClient>) -> Self {
        Self { identity_base_url: Arc::new(identity_base_url), http: reqwest::Client::new(), mesh }
    }
}
