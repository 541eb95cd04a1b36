//! Deterministic tick coordinator (spec §4.3, C3): a global discrete-time
//! clock that fans out tick notifications to per-component workers, each
//! advancing its own queued operations atomically.

mod component;
mod coordinator;
mod error;
mod operation;

pub use component::{AlwaysHealthy, Component, ComponentHealth, DefaultComponent, HealthModel, QueueDepths};
pub use coordinator::{ComponentMetrics, Coordinator, CoordinatorMetrics};
pub use error::{SimError, SimResult};
pub use operation::{duration_to_ticks, Operation, OperationResult, ProcessingOperation};
