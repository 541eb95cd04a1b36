//! The tick coordinator itself (spec §4.3): a single producer fanning out
//! monotonically increasing tick numbers to every registered component's
//! bounded mailbox, one worker task per component.

use crate::component::{Component, ComponentHealth, QueueDepths};
use crate::error::{SimError, SimResult};
use common_config::SimConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Snapshot of coordinator-wide metrics (spec §4.3 "Metrics").
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorMetrics {
    pub total_ticks: u64,
    pub simulation_time: Duration,
    pub real_time_elapsed: Duration,
    pub ticks_per_second: f64,
    pub average_tick_time: Duration,
    pub efficiency_ratio: f64,
}

/// Snapshot of one component's worker metrics (spec §4.3 "Each component
/// exposes").
#[derive(Debug, Clone, Copy)]
pub struct ComponentMetrics {
    pub processed_count: u64,
    pub last_processed_tick: Option<u64>,
    pub queue_depths: QueueDepths,
    pub running: bool,
    pub mailbox_depth: usize,
    pub health: ComponentHealth,
}

struct ComponentEntry {
    component: Arc<dyn Component>,
    mailbox_tx: AsyncMutex<Option<mpsc::Sender<u64>>>,
    mailbox_capacity: usize,
    worker_handle: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    running: AtomicBool,
    mailbox_unhealthy: AtomicBool,
}

/// A single in-process subsystem producing ticks and coordinating
/// per-component workers (spec §4.3). Owned by whatever process hosts the
/// simulation; no ambient globals (spec §9 "Global mutable state").
pub struct Coordinator {
    config: SimConfig,
    components: RwLock<HashMap<String, Arc<ComponentEntry>>>,
    running: AtomicBool,
    current_tick: AtomicU64,
    started_at: AsyncMutex<Option<Instant>>,
    producer_handle: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    cancel: CancellationToken,
    total_tick_nanos: AtomicU64,
}

impl Coordinator {
    pub fn new(config: SimConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            components: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            current_tick: AtomicU64::new(0),
            started_at: AsyncMutex::new(None),
            producer_handle: AsyncMutex::new(None),
            cancel: CancellationToken::new(),
            total_tick_nanos: AtomicU64::new(0),
        })
    }

    /// Allocates a bounded mailbox for `component` and starts its worker.
    /// Safe to call before or after [`Coordinator::start`] (spec §4.3
    /// "Registration before Start is buffered; registration during Start
    /// must be thread-safe").
    pub async fn register(self: &Arc<Self>, component: Arc<dyn Component>) -> SimResult<()> {
        let id = component.id().to_string();
        let mut components = self.components.write().await;
        if components.contains_key(&id) {
            return Err(SimError::AlreadyRegistered { id });
        }

        let (tx, rx) = mpsc::channel(self.config.mailbox_capacity);
        let entry = Arc::new(ComponentEntry {
            component: component.clone(),
            mailbox_tx: AsyncMutex::new(Some(tx)),
            mailbox_capacity: self.config.mailbox_capacity,
            worker_handle: AsyncMutex::new(None),
            running: AtomicBool::new(true),
            mailbox_unhealthy: AtomicBool::new(false),
        });

        let handle = self.spawn_worker(component, rx, entry.clone());
        *entry.worker_handle.lock().await = Some(handle);
        components.insert(id, entry);
        Ok(())
    }

    fn spawn_worker(
        self: &Arc<Self>,
        component: Arc<dyn Component>,
        mut rx: mpsc::Receiver<u64>,
        entry: Arc<ComponentEntry>,
    ) -> tokio::task::JoinHandle<()> {
        let cancel = self.cancel.clone();
        let tick_duration = self.config.tick_duration;
        let id = component.id().to_string();

        tokio::spawn(async move {
            let mut last_delivered: Option<u64> = None;
            loop {
                let tick = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        match rx.try_recv() {
                            Ok(tick) => tick,
                            Err(_) => break,
                        }
                    }
                    maybe_tick = rx.recv() => {
                        match maybe_tick {
                            Some(tick) => tick,
                            None => break,
                        }
                    }
                };

                if let Some(last) = last_delivered {
                    if tick != last + 1 {
                        error!(component = %id, expected = last + 1, actual = tick, "tick coordinator: gap in delivered ticks");
                        entry.running.store(false, Ordering::SeqCst);
                        break;
                    }
                }

                // Atomic tick: stages 1-3 run to completion before the
                // worker checks cancellation again (spec §5 "Workers
                // stopped mid-tick must still complete the currently-
                // dispatched tick's three stages before exiting").
                let started = Instant::now();
                component.process_tick(tick);
                let elapsed = started.elapsed();
                if elapsed > tick_duration / 2 {
                    warn!(component = %id, tick, ?elapsed, "tick coordinator: component processing exceeded half the tick budget");
                }

                last_delivered = Some(tick);
            }
            entry.running.store(false, Ordering::SeqCst);
        })
    }

    /// Spawns the tick producer. Idempotent (spec §9 Open Question (b)).
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.started_at.lock().await = Some(Instant::now());

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.produce().await });
        *self.producer_handle.lock().await = Some(handle);
    }

    async fn produce(self: &Arc<Self>) {
        let mut ticker = (!self.config.as_fast_as_possible).then(|| tokio::time::interval(self.config.tick_duration));

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Some(ticker) = ticker.as_mut() {
                ticker.tick().await;
            }

            let iteration_start = Instant::now();
            let tick = self.current_tick.fetch_add(1, Ordering::SeqCst) + 1;

            let components: Vec<Arc<ComponentEntry>> = self.components.read().await.values().cloned().collect();
            for entry in &components {
                self.deliver(entry, tick).await;
            }

            let elapsed = iteration_start.elapsed();
            self.total_tick_nanos.fetch_add(elapsed.as_nanos() as u64, Ordering::SeqCst);

            if self.config.as_fast_as_possible {
                tokio::task::yield_now().await;
            }
        }
    }

    async fn deliver(&self, entry: &Arc<ComponentEntry>, tick: u64) {
        let tx = {
            let guard = entry.mailbox_tx.lock().await;
            match guard.as_ref() {
                Some(tx) => tx.clone(),
                None => return,
            }
        };

        match tokio::time::timeout(self.config.mailbox_full_grace, tx.send(tick)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                // Receiver gone (worker already exited); nothing more to do.
            }
            Err(_) => {
                warn!(
                    mailbox_full_grace = ?self.config.mailbox_full_grace,
                    "tick coordinator: component mailbox has been full past the grace window, marking unhealthy"
                );
                entry.mailbox_unhealthy.store(true, Ordering::SeqCst);
                // Still must not silently drop the tick: keep blocking until
                // there is room.
                if tx.send(tick).await.is_ok() {
                    entry.mailbox_unhealthy.store(false, Ordering::SeqCst);
                }
            }
        }
    }

    /// Cancels the producer and every worker's mailbox, then waits (bounded)
    /// for all workers to exit. Idempotent.
    pub async fn stop(self: &Arc<Self>) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        if let Some(handle) = self.producer_handle.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        }

        let components = self.components.read().await;
        for entry in components.values() {
            entry.mailbox_tx.lock().await.take();
        }
        for entry in components.values() {
            if let Some(handle) = entry.worker_handle.lock().await.take() {
                if tokio::time::timeout(Duration::from_secs(2), handle).await.is_err() {
                    warn!("tick coordinator: worker did not exit within the stop grace window, abandoning");
                }
            }
        }
        info!("tick coordinator stopped");
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::SeqCst)
    }

    pub async fn metrics(&self) -> CoordinatorMetrics {
        let total_ticks = self.current_tick.load(Ordering::SeqCst);
        let real_time_elapsed = match *self.started_at.lock().await {
            Some(start) => start.elapsed(),
            None => Duration::ZERO,
        };
        let simulation_time = Duration::from_nanos(self.config.tick_duration.as_nanos() as u64 * total_ticks);
        let ticks_per_second = if real_time_elapsed.as_secs_f64() > 0.0 {
            total_ticks as f64 / real_time_elapsed.as_secs_f64()
        } else {
            0.0
        };
        let average_tick_time = if total_ticks > 0 {
            Duration::from_nanos(self.total_tick_nanos.load(Ordering::SeqCst) / total_ticks)
        } else {
            Duration::ZERO
        };
        let efficiency_ratio = if real_time_elapsed.as_secs_f64() > 0.0 {
            simulation_time.as_secs_f64() / real_time_elapsed.as_secs_f64()
        } else {
            0.0
        };

        CoordinatorMetrics { total_ticks, simulation_time, real_time_elapsed, ticks_per_second, average_tick_time, efficiency_ratio }
    }

    pub async fn component_metrics(&self, id: &str) -> Option<ComponentMetrics> {
        let components = self.components.read().await;
        let entry = components.get(id)?;
        let mailbox_depth = match entry.mailbox_tx.lock().await.as_ref() {
            Some(tx) => entry.mailbox_capacity.saturating_sub(tx.capacity()),
            None => 0,
        };
        let health = if entry.mailbox_unhealthy.load(Ordering::SeqCst) {
            ComponentHealth::Unhealthy
        } else {
            entry.component.health()
        };
        Some(ComponentMetrics {
            processed_count: entry.component.processed_count(),
            last_processed_tick: entry.component.last_processed_tick(),
            queue_depths: entry.component.queue_depths(),
            running: entry.running.load(Ordering::SeqCst),
            mailbox_depth,
            health,
        })
    }

    pub async fn component_ids(&self) -> Vec<String> {
        self.components.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::DefaultComponent;
    use crate::operation::Operation;
    use serde_json::json;

    fn test_config() -> SimConfig {
        let mut cfg = SimConfig::for_tests();
        cfg.as_fast_as_possible = true;
        cfg
    }

    #[tokio::test]
    async fn register_before_start_is_buffered() {
        let cfg = test_config();
        let coordinator = Coordinator::new(cfg.clone());
        let component = Arc::new(DefaultComponent::new("c1", cfg.tick_duration, cfg.startup_batch_size));
        coordinator.register(component.clone()).await.unwrap();
        coordinator.start().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(coordinator.current_tick() > 0);
        coordinator.stop().await;
    }

    #[tokio::test]
    async fn registering_duplicate_id_fails() {
        let cfg = test_config();
        let coordinator = Coordinator::new(cfg.clone());
        let c1 = Arc::new(DefaultComponent::new("c1", cfg.tick_duration, cfg.startup_batch_size));
        let c2 = Arc::new(DefaultComponent::new("c1", cfg.tick_duration, cfg.startup_batch_size));
        coordinator.register(c1).await.unwrap();
        let err = coordinator.register(c2).await.unwrap_err();
        assert!(matches!(err, SimError::AlreadyRegistered { .. }));
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let cfg = test_config();
        let coordinator = Coordinator::new(cfg);
        coordinator.start().await;
        coordinator.start().await;
        coordinator.stop().await;
        coordinator.stop().await;
    }

    #[tokio::test]
    async fn ten_operations_complete_within_nine_ticks_scenario_s6() {
        let mut cfg = test_config();
        cfg.tick_duration = Duration::from_micros(500);
        cfg.startup_batch_size = 3;
        let coordinator = Coordinator::new(cfg.clone());
        let component = Arc::new(DefaultComponent::new("sim", cfg.tick_duration, cfg.startup_batch_size));
        for _ in 0..10 {
            component.enqueue(Operation::new("work", json!({}), cfg.tick_duration * 5));
        }
        coordinator.register(component.clone()).await.unwrap();
        coordinator.start().await;

        // Poll until all ten results have landed, bounded so a regression
        // fails the test instead of hanging.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut collected = 0;
        while collected < 10 && Instant::now() < deadline {
            collected += component.drain_results().len();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        coordinator.stop().await;
        assert_eq!(collected, 10);
    }
}
