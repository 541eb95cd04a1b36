//! A single pooled transport plus the bookkeeping the pool and health
//! checker need (spec §3 `PooledConnection`).

use chrono::{DateTime, Utc};
use mesh_core::Transport;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub struct PooledConnection {
    pub id: Uuid,
    pub peer_address: String,
    pub created_at: DateTime<Utc>,
    last_used_at: Mutex<DateTime<Utc>>,
    request_count: AtomicU64,
    healthy: AtomicBool,
    pub transport: Box<dyn Transport>,
}

impl PooledConnection {
    pub fn new(peer_address: String, transport: Box<dyn Transport>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            peer_address,
            created_at: now,
            last_used_at: Mutex::new(now),
            request_count: AtomicU64::new(0),
            healthy: AtomicBool::new(true),
            transport,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn mark_used(&self) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        *self.last_used_at.lock().unwrap() = Utc::now();
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn last_used_at(&self) -> DateTime<Utc> {
        *self.last_used_at.lock().unwrap()
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("peer_address", &self.peer_address)
            .field("healthy", &self.is_healthy())
            .field("request_count", &self.request_count())
            .finish()
    }
}
