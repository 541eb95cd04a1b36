//! The registry entry a service instance publishes about itself (spec §3
//! `PeerInstance`, §4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    Starting,
    Healthy,
    Draining,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInstance {
    pub instance_id: Uuid,
    pub service_name: String,
    pub version: String,
    pub host: String,
    pub grpc_port: u16,
    pub http_port: u16,
    pub status: PeerStatus,
    pub last_seen: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl PeerInstance {
    pub fn grpc_address(&self) -> String {
        format!("{}:{}", self.host, self.grpc_port)
    }

    pub fn http_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    /// An entry whose `last_seen` is older than `ttl` is treated as not
    /// present even if the underlying record still exists (spec §3
    /// invariant, §4.2 registry reader).
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen) > ttl
    }
}
