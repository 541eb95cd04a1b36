//! The "small capability set" the coordinator dispatches through (spec §9:
//! "the tick coordinator treats components behind a small capability set
//! (process-tick, start, stop, id, health, mailbox handle)"), plus
//! `DefaultComponent`, the reference worker-loop implementation that owns
//! an input/processing/output queue triple (spec §4.3 worker loop).

use crate::operation::{duration_to_ticks, Operation, OperationResult, ProcessingOperation};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    Healthy,
    Unhealthy,
}

/// Depths of the three queues a [`DefaultComponent`] owns. Dynamic-dispatch
/// components with no queues of their own (spec §9 "dynamic dispatch ...
/// prefer tagged variants over open inheritance") just report zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepths {
    pub input: usize,
    pub processing: usize,
    pub output: usize,
}

/// Dispatched by the coordinator's per-component worker once per delivered
/// tick. Implementations must treat the three stages of a tick as atomic:
/// no other call to `process_tick` for the same component may interleave
/// (spec §4.3 "Atomicity") — the coordinator's worker loop already
/// guarantees this by calling it from a single task per component, so
/// implementations only need interior mutability, not external locking.
pub trait Component: Send + Sync {
    fn id(&self) -> &str;

    /// Advance this component by exactly one tick.
    fn process_tick(&self, tick: u64);

    fn health(&self) -> ComponentHealth;

    /// Optional, for components with queues of their own (spec
    /// `ProcessedCount, LastProcessedTick, queue lengths, Running` metrics).
    fn queue_depths(&self) -> QueueDepths {
        QueueDepths::default()
    }

    fn processed_count(&self) -> u64 {
        0
    }

    fn last_processed_tick(&self) -> Option<u64> {
        None
    }
}

/// Component-local bookkeeping hook (spec §4.3 stage 3,
/// "updateComponentState: optional component-local bookkeeping (e.g., a
/// stochastic health model)"). Runs after the start/complete stages, with
/// the tick just processed and the component's own queue depths.
pub trait HealthModel: Send + Sync {
    fn evaluate(&self, tick: u64, depths: QueueDepths) -> ComponentHealth;
}

/// The default model: always healthy. Most components don't need anything
/// fancier than "did the worker keep up" (already tracked by the
/// coordinator via mailbox backlog), so this is what `DefaultComponent`
/// uses unless given an explicit model.
pub struct AlwaysHealthy;

impl HealthModel for AlwaysHealthy {
    fn evaluate(&self, _tick: u64, _depths: QueueDepths) -> ComponentHealth {
        ComponentHealth::Healthy
    }
}

/// The reference worker-loop component (spec §4.3): an input queue fed by
/// external producers, a processing set of in-flight operations keyed by
/// completion tick, and an output queue of results ready for collection.
pub struct DefaultComponent {
    id: String,
    tick_duration: Duration,
    startup_batch_size: usize,
    input: Mutex<VecDeque<Operation>>,
    processing: Mutex<Vec<ProcessingOperation>>,
    output: Mutex<VecDeque<OperationResult>>,
    health_model: Box<dyn HealthModel>,
    health: AtomicBool, // true = healthy
    processed_count: AtomicU64,
    last_processed_tick: AtomicU64,
    has_processed: AtomicBool,
}

impl DefaultComponent {
    pub fn new(id: impl Into<String>, tick_duration: Duration, startup_batch_size: usize) -> Self {
        Self::with_health_model(id, tick_duration, startup_batch_size, Box::new(AlwaysHealthy))
    }

    pub fn with_health_model(
        id: impl Into<String>,
        tick_duration: Duration,
        startup_batch_size: usize,
        health_model: Box<dyn HealthModel>,
    ) -> Self {
        Self {
            id: id.into(),
            tick_duration,
            startup_batch_size: startup_batch_size.max(1),
            input: Mutex::new(VecDeque::new()),
            processing: Mutex::new(Vec::new()),
            output: Mutex::new(VecDeque::new()),
            health_model,
            health: AtomicBool::new(true),
            processed_count: AtomicU64::new(0),
            last_processed_tick: AtomicU64::new(0),
            has_processed: AtomicBool::new(false),
        }
    }

    /// Thread-safe input method external producers use to feed this
    /// component (spec §5 "external producers enqueue via a thread-safe
    /// input method").
    pub fn enqueue(&self, op: Operation) {
        self.input.lock().unwrap().push_back(op);
    }

    /// Drains every completed result currently sitting in the output queue.
    pub fn drain_results(&self) -> Vec<OperationResult> {
        let mut output = self.output.lock().unwrap();
        output.drain(..).collect()
    }

    pub fn output_len(&self) -> usize {
        self.output.lock().unwrap().len()
    }
}

impl Component for DefaultComponent {
    fn id(&self) -> &str {
        &self.id
    }

    fn process_tick(&self, tick: u64) {
        // Stage 1: startNewOperations — drain up to K items from the input
        // queue, compute each completion tick, and move it into the
        // processing set.
        let started: Vec<Operation> = {
            let mut input = self.input.lock().unwrap();
            let mut started = Vec::with_capacity(self.startup_batch_size);
            for _ in 0..self.startup_batch_size {
                match input.pop_front() {
                    Some(op) => started.push(op),
                    None => break,
                }
            }
            started
        };
        if !started.is_empty() {
            let mut processing = self.processing.lock().unwrap();
            for op in started {
                let completion_tick = tick + duration_to_ticks(op.process_time, self.tick_duration);
                processing.push(ProcessingOperation { op, start_tick: tick, completion_tick });
            }
        }

        // Stage 2: completeFinishedOperations — anything whose completion
        // tick has arrived moves to the output queue.
        let finished: Vec<ProcessingOperation> = {
            let mut processing = self.processing.lock().unwrap();
            let mut remaining = Vec::with_capacity(processing.len());
            let mut finished = Vec::new();
            for entry in processing.drain(..) {
                if entry.completion_tick <= tick {
                    finished.push(entry);
                } else {
                    remaining.push(entry);
                }
            }
            *processing = remaining;
            finished
        };
        if !finished.is_empty() {
            let mut output = self.output.lock().unwrap();
            for entry in finished {
                output.push_back(OperationResult {
                    op_id: entry.op.id,
                    completed_tick: tick,
                    process_time: entry.op.process_time,
                    success: true,
                    payload: entry.op.payload,
                });
            }
        }

        // Stage 3: updateComponentState.
        let depths = self.queue_depths();
        let healthy = self.health_model.evaluate(tick, depths) == ComponentHealth::Healthy;
        self.health.store(healthy, Ordering::SeqCst);

        self.processed_count.fetch_add(1, Ordering::SeqCst);
        self.last_processed_tick.store(tick, Ordering::SeqCst);
        self.has_processed.store(true, Ordering::SeqCst);
    }

    fn health(&self) -> ComponentHealth {
        if self.health.load(Ordering::SeqCst) {
            ComponentHealth::Healthy
        } else {
            ComponentHealth::Unhealthy
        }
    }

    fn queue_depths(&self) -> QueueDepths {
        QueueDepths {
            input: self.input.lock().unwrap().len(),
            processing: self.processing.lock().unwrap().len(),
            output: self.output.lock().unwrap().len(),
        }
    }

    fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::SeqCst)
    }

    fn last_processed_tick(&self) -> Option<u64> {
        self.has_processed.load(Ordering::SeqCst).then(|| self.last_processed_tick.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn component() -> DefaultComponent {
        DefaultComponent::new("c1", Duration::from_micros(1000), 3)
    }

    #[test]
    fn operations_complete_after_their_process_time_in_ticks() {
        let c = component();
        c.enqueue(Operation::new("work", json!({}), Duration::from_micros(5000)));
        for tick in 1..=5 {
            c.process_tick(tick);
            assert!(c.drain_results().is_empty(), "should not complete before tick 6");
        }
        c.process_tick(6);
        let results = c.drain_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].completed_tick, 6);
    }

    #[test]
    fn startup_batch_size_limits_operations_started_per_tick() {
        let c = component();
        for _ in 0..5 {
            c.enqueue(Operation::new("work", json!({}), Duration::from_micros(1000)));
        }
        c.process_tick(1);
        assert_eq!(c.queue_depths().processing, 3);
        assert_eq!(c.queue_depths().input, 2);
    }

    #[test]
    fn ten_operations_with_five_tick_duration_complete_by_nine_ticks() {
        let c = component();
        for _ in 0..10 {
            c.enqueue(Operation::new("work", json!({}), Duration::from_micros(5000)));
        }
        let mut total_results = 0;
        for tick in 1..=9u64 {
            c.process_tick(tick);
            total_results += c.drain_results().len();
        }
        assert_eq!(total_results, 10);
    }

    proptest::proptest! {
        /// Spec P8: for every completed operation O,
        /// `O.completed_tick == O.start_tick + duration_to_ticks(O.process_time)`,
        /// for arbitrary enqueue counts and process times.
        #[test]
        fn p8_completion_tick_matches_start_plus_duration(
            count in 1usize..20,
            process_micros in 1u64..10_000,
            batch_size in 1usize..6,
        ) {
            let tick_duration = Duration::from_micros(1000);
            let c = DefaultComponent::new("p8", tick_duration, batch_size);
            let process_time = Duration::from_micros(process_micros);
            for _ in 0..count {
                c.enqueue(Operation::new("work", json!({}), process_time));
            }

            let expected_ticks_to_complete = duration_to_ticks(process_time, tick_duration);
            let max_start_tick = count.div_ceil(batch_size) as u64;
            let mut seen = 0usize;

            for tick in 1..=(max_start_tick + expected_ticks_to_complete + 1) {
                c.process_tick(tick);
                for result in c.drain_results() {
                    // start_tick isn't carried on OperationResult, but every
                    // operation enqueued here shares the same process_time,
                    // so completed_tick must be exactly start_tick +
                    // expected_ticks_to_complete for *some* start_tick no
                    // later than max_start_tick and no earlier than 1.
                    let implied_start = result.completed_tick - expected_ticks_to_complete;
                    assert!(implied_start >= 1 && implied_start <= max_start_tick);
                    seen += 1;
                }
            }
            assert_eq!(seen, count);
        }
    }
}
