//! Per-peer connection pool: round-robin selection among healthy
//! connections, health-check eviction, and snapshot-readable metrics
//! (spec §4.2).

use crate::connection::PooledConnection;
use common_config::MeshConfig;
use mesh_core::{MeshError, MeshResult, TransportFactory};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub total_connections: usize,
    pub healthy_connections: usize,
    pub unhealthy_connections: usize,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub average_latency: Duration,
}

struct Counters {
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    latency_sum_micros: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self { total_requests: AtomicU64::new(0), failed_requests: AtomicU64::new(0), latency_sum_micros: AtomicU64::new(0) }
    }
}

pub struct ConnectionPool {
    pub target_service: String,
    target_address: String,
    min_connections: usize,
    max_connections: usize,
    health_interval: Duration,
    factory: Arc<dyn TransportFactory>,
    connections: RwLock<Vec<Arc<PooledConnection>>>,
    round_robin: AtomicUsize,
    counters: Counters,
    health_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ConnectionPool {
    pub fn new(
        target_service: impl Into<String>,
        target_address: impl Into<String>,
        factory: Arc<dyn TransportFactory>,
        config: &MeshConfig,
    ) -> Self {
        let min_connections = config.min_connections;
        let max_connections = config.max_connections.max(min_connections);
        Self {
            target_service: target_service.into(),
            target_address: target_address.into(),
            min_connections,
            max_connections,
            health_interval: config.health_interval,
            factory,
            connections: RwLock::new(Vec::new()),
            round_robin: AtomicUsize::new(0),
            counters: Counters::default(),
            health_task: std::sync::Mutex::new(None),
        }
    }

    async fn open_one(&self) -> MeshResult<Arc<PooledConnection>> {
        let transport = self.factory.connect(&self.target_address).await?;
        Ok(Arc::new(PooledConnection::new(self.target_address.clone(), transport)))
    }

    /// Opens `min_connections` concurrently; an individual failure is
    /// logged and skipped rather than aborting startup (spec §4.2 "if an
    /// open fails, log and continue").
    pub async fn start(self: &Arc<Self>) {
        let mut opens = Vec::new();
        for _ in 0..self.min_connections {
            opens.push(self.open_one());
        }
        let results = futures::future::join_all(opens).await;
        let mut connections = self.connections.write().await;
        for result in results {
            match result {
                Ok(conn) => connections.push(conn),
                Err(e) => warn!(service = %self.target_service, error = %e, "failed to open initial pool connection, continuing"),
            }
        }
        drop(connections);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.health_check_loop().await });
        *self.health_task.lock().unwrap() = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.health_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    async fn health_check_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.health_interval);
        loop {
            ticker.tick().await;
            self.run_health_check().await;
        }
    }

    async fn run_health_check(&self) {
        let snapshot: Vec<Arc<PooledConnection>> = self.connections.read().await.clone();
        let mut evicted = 0usize;
        for conn in &snapshot {
            let acceptable = conn.transport.connectivity_state().await.is_acceptable();
            if !conn.is_healthy() || !acceptable {
                conn.set_healthy(false);
                evicted += 1;
            }
        }
        if evicted > 0 {
            let mut connections = self.connections.write().await;
            connections.retain(|c| c.is_healthy());
            let current = connections.len();
            drop(connections);
            warn!(service = %self.target_service, evicted, "evicted unhealthy connections from pool");
            if current < self.min_connections {
                self.replenish(self.min_connections - current).await;
            }
        }
    }

    async fn replenish(&self, count: usize) {
        for _ in 0..count {
            match self.open_one().await {
                Ok(conn) => {
                    self.connections.write().await.push(conn);
                    info!(service = %self.target_service, "opened replacement connection");
                }
                Err(e) => warn!(service = %self.target_service, error = %e, "failed to open replacement connection"),
            }
        }
    }

    /// Round-robin among healthy connections (spec §4.2: "atomic counter
    /// modulo healthy_count"). If none are healthy and there's room under
    /// `max_connections`, opens one and retries exactly once.
    pub async fn get_connection(&self) -> MeshResult<Arc<PooledConnection>> {
        if let Some(conn) = self.pick_healthy().await {
            conn.mark_used();
            return Ok(conn);
        }

        let current_count = self.connections.read().await.len();
        if current_count < self.max_connections {
            match self.open_one().await {
                Ok(conn) => {
                    self.connections.write().await.push(conn.clone());
                    conn.mark_used();
                    return Ok(conn);
                }
                Err(e) => warn!(service = %self.target_service, error = %e, "failed to open connection on demand"),
            }
        }

        Err(MeshError::NoHealthyConnection { service: self.target_service.clone() })
    }

    async fn pick_healthy(&self) -> Option<Arc<PooledConnection>> {
        let connections = self.connections.read().await;
        let healthy: Vec<&Arc<PooledConnection>> = connections.iter().filter(|c| c.is_healthy()).collect();
        if healthy.is_empty() {
            return None;
        }
        let index = self.round_robin.fetch_add(1, Ordering::SeqCst) % healthy.len();
        Some(healthy[index].clone())
    }

    /// Callers record the outcome and latency of the call they made over
    /// the connection returned by [`Self::get_connection`]; the pool itself
    /// never issues calls (that's the breaker's job).
    pub fn record_result(&self, success: bool, latency: Duration) {
        self.counters.total_requests.fetch_add(1, Ordering::SeqCst);
        if !success {
            self.counters.failed_requests.fetch_add(1, Ordering::SeqCst);
        }
        self.counters.latency_sum_micros.fetch_add(latency.as_micros() as u64, Ordering::SeqCst);
    }

    pub async fn metrics(&self) -> PoolMetrics {
        let connections = self.connections.read().await;
        let healthy = connections.iter().filter(|c| c.is_healthy()).count();
        let total_requests = self.counters.total_requests.load(Ordering::SeqCst);
        let average_latency = if total_requests > 0 {
            Duration::from_micros(self.counters.latency_sum_micros.load(Ordering::SeqCst) / total_requests)
        } else {
            Duration::ZERO
        };
        PoolMetrics {
            total_connections: connections.len(),
            healthy_connections: healthy,
            unhealthy_connections: connections.len() - healthy,
            total_requests,
            failed_requests: self.counters.failed_requests.load(Ordering::SeqCst),
            average_latency,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::mock::MockTransportFactory;
    use std::collections::HashMap;

    fn test_config() -> MeshConfig {
        let mut cfg = MeshConfig::for_tests();
        cfg.min_connections = 2;
        cfg.max_connections = 3;
        cfg.health_interval = Duration::from_millis(20);
        cfg
    }

    #[tokio::test]
    async fn start_opens_min_connections() {
        let factory = Arc::new(MockTransportFactory::default());
        let pool = Arc::new(ConnectionPool::new("identity", "127.0.0.1:7000", factory, &test_config()));
        pool.start().await;
        assert_eq!(pool.connection_count().await, 2);
        pool.stop().await;
    }

    #[tokio::test]
    async fn round_robin_visits_each_healthy_connection_evenly() {
        let factory = Arc::new(MockTransportFactory::default());
        let pool = Arc::new(ConnectionPool::new("identity", "127.0.0.1:7000", factory, &test_config()));
        pool.start().await;

        let mut visits: HashMap<uuid::Uuid, u32> = HashMap::new();
        for _ in 0..10 {
            let conn = pool.get_connection().await.unwrap();
            *visits.entry(conn.id).or_default() += 1;
        }
        assert_eq!(visits.len(), 2);
        for count in visits.values() {
            assert!((5..=5).contains(count), "expected even 5/5 split, got {visits:?}");
        }
        pool.stop().await;
    }

    #[tokio::test]
    async fn no_healthy_connection_opens_new_one_under_max() {
        let factory = Arc::new(MockTransportFactory::default());
        let cfg = {
            let mut c = test_config();
            c.min_connections = 0;
            c.max_connections = 2;
            c
        };
        let pool = Arc::new(ConnectionPool::new("identity", "127.0.0.1:7000", factory, &cfg));
        pool.start().await;
        assert_eq!(pool.connection_count().await, 0);

        let conn = pool.get_connection().await.unwrap();
        assert!(conn.is_healthy());
        assert_eq!(pool.connection_count().await, 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn fails_with_no_healthy_connection_when_at_max() {
        let factory = Arc::new(MockTransportFactory::default());
        let cfg = {
            let mut c = test_config();
            c.min_connections = 0;
            c.max_connections = 0;
            c
        };
        let pool = Arc::new(ConnectionPool::new("identity", "127.0.0.1:7000", factory, &cfg));
        pool.start().await;
        let err = pool.get_connection().await.unwrap_err();
        assert!(matches!(err, MeshError::NoHealthyConnection { .. }));
    }

    #[tokio::test]
    async fn health_check_evicts_unhealthy_and_replenishes() {
        let factory = Arc::new(MockTransportFactory::default());
        let pool = Arc::new(ConnectionPool::new("identity", "127.0.0.1:7000", factory, &test_config()));
        pool.start().await;

        let first = pool.get_connection().await.unwrap();
        first.set_healthy(false);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pool.connection_count().await, 2);
        let remaining = pool.connections.read().await;
        assert!(remaining.iter().all(|c| c.is_healthy()));
        pool.stop().await;
    }

    /// Spec S4: two healthy connections split 10 calls {5,5}; evicting one
    /// sends the next 4 calls all to the survivor; once a replacement is
    /// healthy again the following 6 calls split {3,3}.
    #[tokio::test]
    async fn s4_round_robin_with_eviction_scenario() {
        let factory = Arc::new(MockTransportFactory::default());
        let cfg = test_config();
        let pool = Arc::new(ConnectionPool::new("identity", "127.0.0.1:7000", factory, &cfg));
        pool.start().await;
        assert_eq!(pool.connection_count().await, 2);

        let mut visits: HashMap<uuid::Uuid, u32> = HashMap::new();
        for _ in 0..10 {
            let conn = pool.get_connection().await.unwrap();
            *visits.entry(conn.id).or_default() += 1;
        }
        assert_eq!(visits.values().copied().collect::<Vec<_>>(), vec![5, 5]);

        let evicted_id = {
            let connections = pool.connections.read().await;
            let c1 = connections[0].clone();
            c1.set_healthy(false);
            c1.id
        };

        let mut post_eviction_visits: HashMap<uuid::Uuid, u32> = HashMap::new();
        for _ in 0..4 {
            let conn = pool.get_connection().await.unwrap();
            assert_ne!(conn.id, evicted_id);
            *post_eviction_visits.entry(conn.id).or_default() += 1;
        }
        assert_eq!(post_eviction_visits.len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(pool.connection_count().await, 2, "replacement should have been opened asynchronously");

        let mut final_visits: HashMap<uuid::Uuid, u32> = HashMap::new();
        for _ in 0..6 {
            let conn = pool.get_connection().await.unwrap();
            *final_visits.entry(conn.id).or_default() += 1;
        }
        assert_eq!(final_visits.len(), 2);
        for count in final_visits.values() {
            assert_eq!(*count, 3);
        }
        pool.stop().await;
    }

    proptest::proptest! {
        /// Spec P5: over N get-connection calls with k healthy connections,
        /// every connection is visited between floor(N/k) and ceil(N/k) times.
        #[test]
        fn p5_round_robin_fairness(k in 1usize..6, n in 1usize..60) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async move {
                let factory = Arc::new(MockTransportFactory::default());
                let mut cfg = test_config();
                cfg.min_connections = k;
                cfg.max_connections = k;
                let pool = Arc::new(ConnectionPool::new("identity", "127.0.0.1:7000", factory, &cfg));
                pool.start().await;

                let mut visits: HashMap<uuid::Uuid, u32> = HashMap::new();
                for _ in 0..n {
                    let conn = pool.get_connection().await.unwrap();
                    *visits.entry(conn.id).or_default() += 1;
                }
                let floor = n / k;
                let ceil = n.div_ceil(k);
                for count in visits.values() {
                    assert!(*count as usize >= floor && *count as usize <= ceil);
                }
                pool.stop().await;
            });
        }
    }
}
