//! The ephemeral store interface the registry is built on (spec §2: "a fast
//! ephemeral store for session caches, rate-limit counters, registry
//! entries, and a publish/subscribe event bus" — this crate only uses the
//! key/set slice of that contract). Kept narrow and registry-shaped rather
//! than a general Redis-command surface.

use async_trait::async_trait;
use mesh_core::MeshResult;
use std::time::Duration;

#[async_trait]
pub trait EphemeralStore: Send + Sync {
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> MeshResult<()>;
    async fn get(&self, key: &str) -> MeshResult<Option<String>>;
    async fn delete(&self, key: &str) -> MeshResult<()>;

    async fn sadd(&self, set_key: &str, member: &str) -> MeshResult<()>;
    async fn srem(&self, set_key: &str, member: &str) -> MeshResult<()>;
    async fn smembers(&self, set_key: &str) -> MeshResult<Vec<String>>;

    /// Spec §9 Open Question (c): a coarse key-pattern scan, not a secondary
    /// index — matches the reference's own framing of this as future work.
    async fn scan_keys(&self, pattern: &str) -> MeshResult<Vec<String>>;
}

pub mod memory {
    use super::*;
    use mesh_core::MeshError;
    use std::collections::{HashMap, HashSet};
    use std::sync::RwLock;
    use tokio::time::Instant;

    struct Entry {
        value: String,
        expires_at: Option<Instant>,
    }

    /// In-process ephemeral store used by tests and single-instance
    /// deployments. Structure follows `identity-domain::memory`'s
    /// `RwLock<HashMap<..>>` style; expired entries are pruned lazily on
    /// read, mirroring the reference's TTL-key semantics.
    #[derive(Default)]
    pub struct InMemoryEphemeralStore {
        kv: RwLock<HashMap<String, Entry>>,
        sets: RwLock<HashMap<String, HashSet<String>>>,
    }

    impl InMemoryEphemeralStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn is_live(entry: &Entry, now: Instant) -> bool {
            entry.expires_at.is_none_or(|at| at > now)
        }
    }

    #[async_trait]
    impl EphemeralStore for InMemoryEphemeralStore {
        async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> MeshResult<()> {
            let expires_at = Some(Instant::now() + ttl);
            self.kv.write().unwrap().insert(key.to_string(), Entry { value, expires_at });
            Ok(())
        }

        async fn get(&self, key: &str) -> MeshResult<Option<String>> {
            let now = Instant::now();
            let kv = self.kv.read().unwrap();
            Ok(kv.get(key).filter(|e| Self::is_live(e, now)).map(|e| e.value.clone()))
        }

        async fn delete(&self, key: &str) -> MeshResult<()> {
            self.kv.write().unwrap().remove(key);
            Ok(())
        }

        async fn sadd(&self, set_key: &str, member: &str) -> MeshResult<()> {
            self.sets.write().unwrap().entry(set_key.to_string()).or_default().insert(member.to_string());
            Ok(())
        }

        async fn srem(&self, set_key: &str, member: &str) -> MeshResult<()> {
            if let Some(set) = self.sets.write().unwrap().get_mut(set_key) {
                set.remove(member);
            }
            Ok(())
        }

        async fn smembers(&self, set_key: &str) -> MeshResult<Vec<String>> {
            Ok(self.sets.read().unwrap().get(set_key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
        }

        async fn scan_keys(&self, pattern: &str) -> MeshResult<Vec<String>> {
            let prefix = pattern.trim_end_matches('*');
            Ok(self.sets.read().unwrap().keys().filter(|k| k.starts_with(prefix)).cloned().collect())
        }
    }
}

#[cfg(feature = "redis")]
pub mod redis {
    //! `fred`-backed implementation, matching the teacher's `adk-session`
    //! `redis = ["fred"]` feature wiring (spec §3 "ephemeral store ... is
    //! modeled as an interface only" — this is the production adapter for
    //! it, kept behind the same kind of optional feature the teacher uses
    //! for its own Redis session backend).
    use super::*;
    use fred::prelude::*;
    use mesh_core::MeshError;

    pub struct RedisEphemeralStore {
        client: fred::clients::Client,
    }

    impl RedisEphemeralStore {
        pub async fn connect(url: &str) -> MeshResult<Self> {
            let config = Config::from_url(url).map_err(|e| MeshError::Backend(e.to_string()))?;
            let client = Client::new(config, None, None, None);
            client.init().await.map_err(|e| MeshError::Backend(e.to_string()))?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl EphemeralStore for RedisEphemeralStore {
        async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> MeshResult<()> {
            self.client
                .set::<(), _, _>(key, value, Some(Expiration::EX(ttl.as_secs() as i64)), None, false)
                .await
                .map_err(|e| MeshError::Backend(e.to_string()))
        }

        async fn get(&self, key: &str) -> MeshResult<Option<String>> {
            self.client.get(key).await.map_err(|e| MeshError::Backend(e.to_string()))
        }

        async fn delete(&self, key: &str) -> MeshResult<()> {
            self.client.del::<(), _>(key).await.map_err(|e| MeshError::Backend(e.to_string()))
        }

        async fn sadd(&self, set_key: &str, member: &str) -> MeshResult<()> {
            self.client.sadd::<(), _, _>(set_key, member).await.map_err(|e| MeshError::Backend(e.to_string()))
        }

        async fn srem(&self, set_key: &str, member: &str) -> MeshResult<()> {
            self.client.srem::<(), _, _>(set_key, member).await.map_err(|e| MeshError::Backend(e.to_string()))
        }

        async fn smembers(&self, set_key: &str) -> MeshResult<Vec<String>> {
            self.client.smembers(set_key).await.map_err(|e| MeshError::Backend(e.to_string()))
        }

        async fn scan_keys(&self, pattern: &str) -> MeshResult<Vec<String>> {
            use futures::TryStreamExt;
            let mut keys = Vec::new();
            let mut stream = self.client.scan(pattern, Some(200), None);
            while let Some(page) = stream.try_next().await.map_err(|e| MeshError::Backend(e.to_string()))? {
                if let Some(page_keys) = page.results() {
                    keys.extend(page_keys.iter().filter_map(|k| k.as_str().map(str::to_string)));
                }
            }
            Ok(keys)
        }
    }
}
