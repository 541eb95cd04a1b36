//! Registry reader: `discover(name)` and `list_all()` (spec §4.2). Both
//! tolerate disappearing entries — an expired record is pruned from the
//! instances set as part of the traversal rather than surfaced as an error
//! (spec §8 P7).

use crate::keys::{instance_key, instances_set_key, instances_set_pattern, service_name_from_set_key};
use crate::store::EphemeralStore;
use chrono::Utc;
use mesh_core::{MeshResult, PeerInstance};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct RegistryReader {
    store: Arc<dyn EphemeralStore>,
    ttl: chrono::Duration,
}

impl RegistryReader {
    pub fn new(store: Arc<dyn EphemeralStore>, ttl: std::time::Duration) -> Self {
        Self { store, ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(45)) }
    }

    /// Returns only the instances whose record is both present and not
    /// TTL-expired, pruning stale ids from the set as it goes (spec §4.2
    /// "self-healing GC").
    pub async fn discover(&self, service_name: &str) -> MeshResult<Vec<PeerInstance>> {
        let set_key = instances_set_key(service_name);
        let ids = self.store.smembers(&set_key).await?;
        let mut surviving = Vec::with_capacity(ids.len());
        let now = Utc::now();

        for id in ids {
            let key = instance_key(service_name, &id);
            match self.store.get(&key).await? {
                Some(raw) => match serde_json::from_str::<PeerInstance>(&raw) {
                    Ok(instance) if !instance.is_expired(now, self.ttl) => surviving.push(instance),
                    _ => {
                        debug!(service_name, %id, "pruning stale/expired registry entry");
                        self.store.srem(&set_key, &id).await?;
                    }
                },
                None => {
                    debug!(service_name, %id, "pruning registry entry with no backing key");
                    self.store.srem(&set_key, &id).await?;
                }
            }
        }
        Ok(surviving)
    }

    /// Scans `services:*:instances` and maps each to its surviving peer
    /// list via [`Self::discover`].
    pub async fn list_all(&self) -> MeshResult<HashMap<String, Vec<PeerInstance>>> {
        let set_keys = self.store.scan_keys(instances_set_pattern()).await?;
        let mut result = HashMap::new();
        for set_key in set_keys {
            let Some(service_name) = service_name_from_set_key(&set_key) else { continue };
            let instances = self.discover(service_name).await?;
            result.insert(service_name.to_string(), instances);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryEphemeralStore;
    use mesh_core::PeerStatus;
    use std::time::Duration;
    use uuid::Uuid;

    fn instance(service: &str, last_seen: chrono::DateTime<Utc>) -> PeerInstance {
        PeerInstance {
            instance_id: Uuid::new_v4(),
            service_name: service.to_string(),
            version: "0.1.0".to_string(),
            host: "127.0.0.1".to_string(),
            grpc_port: 7000,
            http_port: 8000,
            status: PeerStatus::Healthy,
            last_seen,
            started_at: Utc::now(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn discover_returns_only_fresh_instances() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let fresh = instance("identity", Utc::now());
        let fresh_id = fresh.instance_id.to_string();
        store
            .set_ex(&instance_key("identity", &fresh_id), serde_json::to_string(&fresh).unwrap(), Duration::from_secs(45))
            .await
            .unwrap();
        store.sadd(&instances_set_key("identity"), &fresh_id).await.unwrap();

        let stale = instance("identity", Utc::now() - chrono::Duration::seconds(100));
        let stale_id = stale.instance_id.to_string();
        store
            .set_ex(&instance_key("identity", &stale_id), serde_json::to_string(&stale).unwrap(), Duration::from_secs(45))
            .await
            .unwrap();
        store.sadd(&instances_set_key("identity"), &stale_id).await.unwrap();

        let reader = RegistryReader::new(store.clone(), Duration::from_secs(45));
        let found = reader.discover("identity").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instance_id.to_string(), fresh_id);

        // The stale id must have been pruned from the set (spec §8 P7).
        let members = store.smembers(&instances_set_key("identity")).await.unwrap();
        assert!(!members.contains(&stale_id));
        assert!(members.contains(&fresh_id));
    }

    #[tokio::test]
    async fn discover_prunes_ids_whose_key_expired_from_the_store() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let id = Uuid::new_v4().to_string();
        // Member added to the set but the backing key was never written
        // (or already expired out of the store) — simulates TTL expiry.
        store.sadd(&instances_set_key("identity"), &id).await.unwrap();

        let reader = RegistryReader::new(store.clone(), Duration::from_secs(45));
        let found = reader.discover("identity").await.unwrap();
        assert!(found.is_empty());
        let members = store.smembers(&instances_set_key("identity")).await.unwrap();
        assert!(!members.contains(&id));
    }

    #[tokio::test]
    async fn list_all_maps_set_keys_to_service_names() {
        let store = Arc::new(InMemoryEphemeralStore::new());
        let a = instance("identity", Utc::now());
        store
            .set_ex(
                &instance_key("identity", &a.instance_id.to_string()),
                serde_json::to_string(&a).unwrap(),
                Duration::from_secs(45),
            )
            .await
            .unwrap();
        store.sadd(&instances_set_key("identity"), &a.instance_id.to_string()).await.unwrap();

        let reader = RegistryReader::new(store, Duration::from_secs(45));
        let all = reader.list_all().await.unwrap();
        assert_eq!(all.get("identity").map(|v| v.len()), Some(1));
    }
}
