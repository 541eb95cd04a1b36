//! Per-peer circuit breaker (spec §4.2): Closed → Open → HalfOpen → Closed,
//! a request timeout enforced on every call, and snapshot-readable metrics.
//! All transitions and counters live behind one mutex, matching spec §5
//! "Circuit-breaker state: single mutex".

use chrono::{DateTime, Utc};
use common_config::MeshConfig;
use mesh_core::{MeshError, MeshResult};
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerMetrics {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub rejected: u64,
    pub current_state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure_instant: Option<Instant>,
    last_failure_wall: Option<DateTime<Utc>>,
    half_open_probe_in_flight: bool,
    total: u64,
    successful: u64,
    failed: u64,
    rejected: u64,
}

pub struct CircuitBreaker {
    peer: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    request_timeout: Duration,
    inner: Mutex<Inner>,
}

/// What the caller should do with the (timed) outcome of its call: advance
/// the state machine toward Open on failure, or reset it on success.
enum Disposition {
    Proceed,
    Rejected,
}

impl CircuitBreaker {
    pub fn new(peer: impl Into<String>, config: &MeshConfig) -> Self {
        Self {
            peer: peer.into(),
            failure_threshold: config.circuit_failure_threshold,
            recovery_timeout: config.circuit_recovery_timeout,
            request_timeout: config.circuit_request_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_instant: None,
                last_failure_wall: None,
                half_open_probe_in_flight: false,
                total: 0,
                successful: 0,
                failed: 0,
                rejected: 0,
            }),
        }
    }

    /// Decides, under the lock, whether this call may proceed and performs
    /// the Open→HalfOpen transition if the recovery timeout has elapsed.
    fn admit(&self) -> Disposition {
        let mut inner = self.inner.lock().unwrap();
        inner.total += 1;
        match inner.state {
            CircuitState::Closed => Disposition::Proceed,
            CircuitState::Open => {
                let elapsed = inner.last_failure_instant.is_none_or(|t| t.elapsed() >= self.recovery_timeout);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_probe_in_flight = true;
                    info!(peer = %self.peer, "circuit recovery timeout elapsed, admitting HalfOpen probe");
                    Disposition::Proceed
                } else {
                    inner.rejected += 1;
                    Disposition::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_probe_in_flight {
                    inner.rejected += 1;
                    Disposition::Rejected
                } else {
                    inner.half_open_probe_in_flight = true;
                    Disposition::Proceed
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.successful += 1;
        inner.failure_count = 0;
        inner.half_open_probe_in_flight = false;
        if inner.state != CircuitState::Closed {
            info!(peer = %self.peer, "circuit closing after successful probe");
        }
        inner.state = CircuitState::Closed;
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failed += 1;
        inner.half_open_probe_in_flight = false;
        inner.failure_count += 1;
        inner.last_failure_instant = Some(Instant::now());
        inner.last_failure_wall = Some(Utc::now());

        let was_closed_or_halfopen_tripping = inner.state == CircuitState::HalfOpen || inner.failure_count >= self.failure_threshold;
        if was_closed_or_halfopen_tripping && inner.state != CircuitState::Open {
            warn!(peer = %self.peer, failure_count = inner.failure_count, "circuit opening");
            inner.state = CircuitState::Open;
        }
    }

    /// Runs `f`, enforcing `request_timeout` as the floor for every call
    /// (spec §5 "circuit-breaker timeout is the floor"). A timeout counts as
    /// a failure, same as the inner call returning `Err`.
    pub async fn call<F, Fut, T>(&self, f: F) -> MeshResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = MeshResult<T>>,
    {
        match self.admit() {
            Disposition::Rejected => return Err(MeshError::CircuitOpen { peer: self.peer.clone() }),
            Disposition::Proceed => {}
        }

        let outcome = tokio::time::timeout(self.request_timeout, f()).await;
        match outcome {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.record_failure();
                Err(e)
            }
            Err(_) => {
                self.record_failure();
                Err(MeshError::Timeout { peer: self.peer.clone() })
            }
        }
    }

    pub fn metrics(&self) -> BreakerMetrics {
        let inner = self.inner.lock().unwrap();
        BreakerMetrics {
            total: inner.total,
            successful: inner.successful,
            failed: inner.failed,
            rejected: inner.rejected,
            current_state: inner.state,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_wall,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::MeshError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn test_config() -> MeshConfig {
        let mut cfg = MeshConfig::for_tests();
        cfg.circuit_failure_threshold = 3;
        cfg.circuit_recovery_timeout = StdDuration::from_millis(50);
        cfg.circuit_request_timeout = StdDuration::from_millis(20);
        cfg
    }

    async fn always_fail() -> MeshResult<()> {
        Err(MeshError::Backend("boom".to_string()))
    }

    async fn slow_call() -> MeshResult<()> {
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        Ok(())
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("peer-a", &test_config());
        for _ in 0..3 {
            let _ = breaker.call(always_fail).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_invoking_inner_fn() {
        let breaker = CircuitBreaker::new("peer-a", &test_config());
        for _ in 0..3 {
            let _ = breaker.call(always_fail).await;
        }
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = breaker
            .call(move || {
                let calls = calls2.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), MeshError>(())
                }
            })
            .await;
        assert!(matches!(result, Err(MeshError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn timeout_counts_as_failure_and_trips_the_breaker() {
        let breaker = CircuitBreaker::new("peer-a", &test_config());
        for _ in 0..3 {
            let result = breaker.call(slow_call).await;
            assert!(matches!(result, Err(MeshError::Timeout { .. })));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_circuit() {
        let breaker = CircuitBreaker::new("peer-a", &test_config());
        for _ in 0..3 {
            let _ = breaker.call(always_fail).await;
        }
        tokio::time::sleep(StdDuration::from_millis(60)).await;
        let result = breaker.call(|| async { Ok::<(), MeshError>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens_circuit() {
        let breaker = CircuitBreaker::new("peer-a", &test_config());
        for _ in 0..3 {
            let _ = breaker.call(always_fail).await;
        }
        tokio::time::sleep(StdDuration::from_millis(60)).await;
        let _ = breaker.call(always_fail).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn metrics_snapshot_tracks_all_counters() {
        let breaker = CircuitBreaker::new("peer-a", &test_config());
        let _ = breaker.call(|| async { Ok::<(), MeshError>(()) }).await;
        let _ = breaker.call(always_fail).await;
        let metrics = breaker.metrics();
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.successful, 1);
        assert_eq!(metrics.failed, 1);
        assert!(metrics.last_failure_time.is_some());
    }
}
