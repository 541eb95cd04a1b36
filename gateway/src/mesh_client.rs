//! The gateway's path to mesh peers: a breaker-guarded, retrying call on
//! top of `mesh-pool`'s per-service connection pools (spec §4.2 retry
//! policy on top of the mesh client).

use common_config::MeshConfig;
use dashmap::DashMap;
use mesh_breaker::CircuitBreaker;
use mesh_core::{MeshError, MeshResult};
use mesh_pool::PoolManager;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(50);

pub struct MeshClient {
    pool_manager: Arc<PoolManager>,
    config: MeshConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl MeshClient {
    pub fn new(pool_manager: Arc<PoolManager>, config: MeshConfig) -> Self {
        Self { pool_manager, config, breakers: DashMap::new() }
    }

    fn breaker_for(&self, service_name: &str) -> Arc<CircuitBreaker> {
        self.breakers.entry(service_name.to_string()).or_insert_with(|| Arc::new(CircuitBreaker::new(service_name, &self.config))).clone()
    }

    /// Bounded retries with jittered backoff on a transient failure; never
    /// retries a `CircuitOpen` rejection (that would defeat the breaker)
    /// nor an `InvalidArgument`-class error (retrying won't change the
    /// outcome).
    pub async fn call(&self, service_name: &str, method: &str, payload: serde_json::Value) -> MeshResult<serde_json::Value> {
        let breaker = self.breaker_for(service_name);
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            let pool_manager = &self.pool_manager;
            let payload = payload.clone();
            let started = Instant::now();
            let outcome = breaker
                .call(|| async move {
                    let conn = pool_manager.get_connection(service_name).await?;
                    conn.transport.call(method, payload).await
                })
                .await;
            let elapsed = started.elapsed();

            match outcome {
                Ok(value) => {
                    self.pool_manager.record_result(service_name, true, elapsed).await;
                    return Ok(value);
                }
                Err(e) => {
                    self.pool_manager.record_result(service_name, false, elapsed).await;
                    if matches!(e, MeshError::CircuitOpen { .. }) || !e.is_retryable() {
                        return Err(e);
                    }
                    warn!(service = service_name, method, attempt, error = %e, "mesh call failed, retrying");
                    last_err = Some(e);
                    if attempt + 1 < MAX_ATTEMPTS {
                        sleep_with_jitter(attempt).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(MeshError::PeerUnavailable { service: service_name.to_string() }))
    }
}

async fn sleep_with_jitter(attempt: u32) {
    let base = BASE_BACKOFF * 2u32.pow(attempt);
    let jitter_ms = rand::rng().random_range(0..=base.as_millis() as u64 / 2);
    tokio::time::sleep(base + Duration::from_millis(jitter_ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::transport::mock::MockTransportFactory;
    use mesh_registry::store::memory::InMemoryEphemeralStore;
    use mesh_registry::{instance_key, instances_set_key};

    fn test_config() -> MeshConfig {
        let mut cfg = MeshConfig::for_tests();
        cfg.min_connections = 1;
        cfg.max_connections = 2;
        cfg.circuit_failure_threshold = 3;
        cfg.circuit_recovery_timeout = Duration::from_millis(50);
        cfg.circuit_request_timeout = Duration::from_millis(200);
        cfg
    }

    async fn seeded_manager(cfg: &MeshConfig) -> Arc<PoolManager> {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let instance = mesh_core::PeerInstance {
            instance_id: uuid::Uuid::new_v4(),
            service_name: "identity".to_string(),
            version: "0.1.0".to_string(),
            host: "127.0.0.1".to_string(),
            grpc_port: 7000,
            http_port: 8000,
            status: mesh_core::PeerStatus::Healthy,
            last_seen: chrono::Utc::now(),
            started_at: chrono::Utc::now(),
            metadata: serde_json::json!({}),
        };
        store
            .set_ex(&instance_key("identity", &instance.instance_id.to_string()), serde_json::to_string(&instance).unwrap(), Duration::from_secs(45))
            .await
            .unwrap();
        store.sadd(&instances_set_key("identity"), &instance.instance_id.to_string()).await.unwrap();

        let reader = Arc::new(mesh_registry::RegistryReader::new(store, Duration::from_secs(45)));
        let factory = Arc::new(MockTransportFactory::default());
        Arc::new(PoolManager::new("gateway", reader, factory, cfg.clone()))
    }

    #[tokio::test]
    async fn successful_call_returns_echoed_payload() {
        let cfg = test_config();
        let manager = seeded_manager(&cfg).await;
        let client = MeshClient::new(manager, cfg);
        let result = client.call("identity", "health", serde_json::json!({"ping": true})).await.unwrap();
        assert_eq!(result["ping"], true);
    }

    #[tokio::test]
    async fn peer_unavailable_for_unregistered_service() {
        let cfg = test_config();
        let manager = seeded_manager(&cfg).await;
        let client = MeshClient::new(manager, cfg);
        let err = client.call("nonexistent", "health", serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, MeshError::PeerUnavailable { .. }));
    }
}
