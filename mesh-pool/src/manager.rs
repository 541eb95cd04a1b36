//! Owns one [`ConnectionPool`] per peer service, refreshed periodically
//! from the registry (spec §4.2 "pool manager").

use crate::pool::ConnectionPool;
use common_config::MeshConfig;
use mesh_core::{MeshError, MeshResult, PeerInstance, TransportFactory};
use mesh_registry::RegistryReader;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct PoolManager {
    self_service_name: String,
    reader: Arc<RegistryReader>,
    factory: Arc<dyn TransportFactory>,
    config: MeshConfig,
    pools: RwLock<HashMap<String, Arc<ConnectionPool>>>,
    running: AtomicBool,
    refresh_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PoolManager {
    pub fn new(
        self_service_name: impl Into<String>,
        reader: Arc<RegistryReader>,
        factory: Arc<dyn TransportFactory>,
        config: MeshConfig,
    ) -> Self {
        Self {
            self_service_name: self_service_name.into(),
            reader,
            factory,
            config,
            pools: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            refresh_task: std::sync::Mutex::new(None),
        }
    }

    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.refresh().await;
        let this = Arc::clone(self);
        let interval = this.config.pool_manager_refresh_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.refresh().await;
            }
        });
        *self.refresh_task.lock().unwrap() = Some(handle);
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.refresh_task.lock().unwrap().take() {
            handle.abort();
        }
        let mut pools = self.pools.write().await;
        for (_, pool) in pools.drain() {
            pool.stop().await;
        }
    }

    /// Lists every service via the registry reader, creates pools for new
    /// peers with at least one healthy instance (stable tie-break: first
    /// returned), and tears down pools for peers no longer present.
    async fn refresh(&self) {
        let all = match self.reader.list_all().await {
            Ok(all) => all,
            Err(e) => {
                tracing::warn!(error = %e, "pool manager refresh: registry list-all failed");
                return;
            }
        };

        let mut pools = self.pools.write().await;

        for (service_name, instances) in &all {
            if service_name == &self.self_service_name {
                continue;
            }
            let Some(target) = first_healthy(instances) else { continue };
            if !pools.contains_key(service_name) {
                let pool = self.create_pool(service_name, &target.grpc_address());
                pools.insert(service_name.clone(), pool);
                info!(service = %service_name, "pool manager created new pool");
            }
        }

        let present: std::collections::HashSet<&String> = all.keys().collect();
        let stale: Vec<String> = pools.keys().filter(|name| !present.contains(name)).cloned().collect();
        for name in stale {
            if let Some(pool) = pools.remove(&name) {
                pool.stop().await;
                info!(service = %name, "pool manager removed pool for vanished service");
            }
        }
    }

    fn create_pool(&self, service_name: &str, target_address: &str) -> Arc<ConnectionPool> {
        let pool = Arc::new(ConnectionPool::new(service_name, target_address, self.factory.clone(), &self.config));
        let spawned = pool.clone();
        tokio::spawn(async move { spawned.start().await });
        pool
    }

    /// Delegates to the existing pool for `service_name`, lazily creating
    /// one from the registry if none exists yet.
    pub async fn get_connection(&self, service_name: &str) -> MeshResult<Arc<crate::connection::PooledConnection>> {
        if let Some(pool) = self.pools.read().await.get(service_name) {
            return pool.get_connection().await;
        }

        let instances = self.reader.discover(service_name).await?;
        let Some(target) = first_healthy(&instances) else {
            return Err(MeshError::PeerUnavailable { service: service_name.to_string() });
        };
        let pool = self.create_pool(service_name, &target.grpc_address());
        let conn = pool.get_connection().await;
        self.pools.write().await.insert(service_name.to_string(), pool);
        conn
    }

    /// Forwards a call outcome to the named pool's metrics. No-op if the
    /// pool has since been torn down.
    pub async fn record_result(&self, service_name: &str, success: bool, latency: std::time::Duration) {
        if let Some(pool) = self.pools.read().await.get(service_name) {
            pool.record_result(success, latency);
        }
    }
}

fn first_healthy(instances: &[PeerInstance]) -> Option<&PeerInstance> {
    instances.iter().find(|i| i.status == mesh_core::PeerStatus::Healthy)
}
