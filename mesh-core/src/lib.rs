//! Shared vocabulary for the service-mesh substrate (spec §4.2): the
//! `PeerInstance` registry record, the error taxonomy mesh operations
//! return, and the `Transport` capability pools/breakers program against.

mod error;
mod peer;
pub mod transport;

pub use error::{MeshError, MeshResult};
pub use peer::{PeerInstance, PeerStatus};
pub use transport::{mock, ConnState, Transport, TransportFactory};
