//! Registry client: owned by each instance, publishes its own `PeerInstance`
//! record and keeps it alive with a heartbeat loop (spec §4.2).

use crate::keys::{instance_key, instances_set_key};
use crate::store::EphemeralStore;
use chrono::Utc;
use common_config::MeshConfig;
use mesh_core::{PeerInstance, PeerStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

pub struct RegistryClient {
    store: Arc<dyn EphemeralStore>,
    instance: Mutex<PeerInstance>,
    ttl: std::time::Duration,
    heartbeat_interval: std::time::Duration,
    started: AtomicBool,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl RegistryClient {
    pub fn new(store: Arc<dyn EphemeralStore>, instance: PeerInstance, config: &MeshConfig) -> Self {
        Self {
            store,
            instance: Mutex::new(instance),
            ttl: config.registry_ttl,
            heartbeat_interval: config.heartbeat_interval,
            started: AtomicBool::new(false),
            heartbeat: Mutex::new(None),
        }
    }

    async fn write_record(&self, instance: &PeerInstance) {
        let key = instance_key(&instance.service_name, &instance.instance_id.to_string());
        let set_key = instances_set_key(&instance.service_name);
        let Ok(payload) = serde_json::to_string(instance) else {
            warn!(instance_id = %instance.instance_id, "failed to serialize registry record");
            return;
        };
        if let Err(e) = self.store.set_ex(&key, payload, self.ttl).await {
            warn!(error = %e, instance_id = %instance.instance_id, "heartbeat write failed, will retry next tick");
            return;
        }
        if let Err(e) = self.store.sadd(&set_key, &instance.instance_id.to_string()).await {
            warn!(error = %e, instance_id = %instance.instance_id, "failed to add instance to registry set");
        }
    }

    /// Idempotent: a second `start()` call is a no-op (spec §9 Open
    /// Question (b)).
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let instance = self.instance.lock().await;
            self.write_record(&instance).await;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.heartbeat_interval);
            ticker.tick().await; // first tick fires immediately; skip it, initial write already happened
            loop {
                ticker.tick().await;
                let mut instance = this.instance.lock().await;
                instance.status = PeerStatus::Healthy;
                instance.last_seen = Utc::now();
                this.write_record(&instance).await;
            }
        });
        *self.heartbeat.lock().await = Some(handle);
    }

    /// Idempotent: a second `stop()` call is a no-op.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.heartbeat.lock().await.take() {
            handle.abort();
        }
        let instance = self.instance.lock().await;
        let key = instance_key(&instance.service_name, &instance.instance_id.to_string());
        let set_key = instances_set_key(&instance.service_name);
        if let Err(e) = self.store.delete(&key).await {
            warn!(error = %e, "failed to delete registry key on stop");
        }
        if let Err(e) = self.store.srem(&set_key, &instance.instance_id.to_string()).await {
            warn!(error = %e, "failed to remove instance from registry set on stop");
        }
    }

    pub async fn instance_id(&self) -> Uuid {
        self.instance.lock().await.instance_id
    }

    pub async fn set_status(&self, status: PeerStatus) {
        self.instance.lock().await.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryEphemeralStore;
    use serde_json;
    use uuid::Uuid;

    fn sample_instance() -> PeerInstance {
        PeerInstance {
            instance_id: Uuid::new_v4(),
            service_name: "identity".to_string(),
            version: "0.1.0".to_string(),
            host: "127.0.0.1".to_string(),
            grpc_port: 7000,
            http_port: 8000,
            status: PeerStatus::Starting,
            last_seen: Utc::now(),
            started_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn start_writes_instance_key_and_set_member() {
        let store: Arc<dyn EphemeralStore> = Arc::new(InMemoryEphemeralStore::new());
        let instance = sample_instance();
        let instance_id = instance.instance_id;
        let client = Arc::new(RegistryClient::new(store.clone(), instance, &MeshConfig::for_tests()));
        client.start().await;

        let key = instance_key("identity", &instance_id.to_string());
        assert!(store.get(&key).await.unwrap().is_some());
        let members = store.smembers(&instances_set_key("identity")).await.unwrap();
        assert!(members.contains(&instance_id.to_string()));
        client.stop().await;
    }

    #[tokio::test]
    async fn stop_removes_key_and_set_membership() {
        let store: Arc<dyn EphemeralStore> = Arc::new(InMemoryEphemeralStore::new());
        let instance = sample_instance();
        let instance_id = instance.instance_id;
        let client = Arc::new(RegistryClient::new(store.clone(), instance, &MeshConfig::for_tests()));
        client.start().await;
        client.stop().await;

        let key = instance_key("identity", &instance_id.to_string());
        assert!(store.get(&key).await.unwrap().is_none());
        let members = store.smembers(&instances_set_key("identity")).await.unwrap();
        assert!(!members.contains(&instance_id.to_string()));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let store: Arc<dyn EphemeralStore> = Arc::new(InMemoryEphemeralStore::new());
        let client = Arc::new(RegistryClient::new(store, sample_instance(), &MeshConfig::for_tests()));
        client.start().await;
        client.start().await; // second call must not spawn a second heartbeat task
        client.stop().await;
    }
}
