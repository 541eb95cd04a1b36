//! Gateway-specific environment configuration, following the same
//! `from_env` shape as `common-config`'s structs.

use std::env;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_port: u16,
    pub identity_service_base_url: String,
    pub self_service_name: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            bind_port: env::var("GATEWAY_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080),
            identity_service_base_url: env::var("IDENTITY_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:8081".to_string()),
            self_service_name: "gateway".to_string(),
        }
    }
}
