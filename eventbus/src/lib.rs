//! Topic-addressed, best-effort event bus shared by the credential authority
//! and its async collaborators (email dispatch, announcements). Structured
//! the way the teacher structures its services: a small trait for the
//! seam, an in-memory implementation used everywhere in tests, and a
//! process-wide singleton left to the caller to own.

pub mod bus;
pub mod envelopes;
pub mod topics;

pub use bus::{null_bus, EventBus, EventBusError, InMemoryEventBus, NullEventBus};
pub use envelopes::{EmailKind, EmailTask, SystemAnnouncement};
