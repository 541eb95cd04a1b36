//! The simulation data model (spec §3): `Operation`, `ProcessingOperation`,
//! `OperationResult`, and the tick-quantization helper every component's
//! worker loop uses to schedule completions.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A unit of work a component's worker loop will start processing once
/// dequeued from its input queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub op_type: String,
    pub payload: serde_json::Value,
    pub process_time: Duration,
}

impl Operation {
    pub fn new(op_type: impl Into<String>, payload: serde_json::Value, process_time: Duration) -> Self {
        Self { id: Uuid::new_v4(), op_type: op_type.into(), payload, process_time }
    }
}

/// An operation that has been dequeued and is now occupying a slot in a
/// component's processing set, with its completion tick already computed.
#[derive(Debug, Clone)]
pub struct ProcessingOperation {
    pub op: Operation,
    pub start_tick: u64,
    pub completion_tick: u64,
}

/// What a component's output queue holds once an operation finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub op_id: Uuid,
    pub completed_tick: u64,
    pub process_time: Duration,
    pub success: bool,
    pub payload: serde_json::Value,
}

/// `completion_tick = start_tick + duration_to_ticks(process_time)` (spec
/// §3). Quantizes up: an operation whose `process_time` falls short of a
/// whole tick still occupies at least one tick, and any remainder rounds
/// up rather than being silently dropped.
pub fn duration_to_ticks(process_time: Duration, tick_duration: Duration) -> u64 {
    let tick_nanos = tick_duration.as_nanos().max(1);
    let process_nanos = process_time.as_nanos();
    let ticks = process_nanos.div_ceil(tick_nanos);
    ticks.max(1) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_to_ticks_rounds_up() {
        let tick = Duration::from_micros(1000);
        assert_eq!(duration_to_ticks(Duration::from_micros(1000), tick), 1);
        assert_eq!(duration_to_ticks(Duration::from_micros(1001), tick), 2);
        assert_eq!(duration_to_ticks(Duration::from_micros(5000), tick), 5);
    }

    #[test]
    fn duration_to_ticks_never_returns_zero() {
        let tick = Duration::from_micros(1000);
        assert_eq!(duration_to_ticks(Duration::ZERO, tick), 1);
    }
}
