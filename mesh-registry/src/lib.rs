//! Redis-backed service registry: a per-instance heartbeating client and a
//! read side that discovers peers and self-heals around expired entries
//! (spec §4.2).

mod client;
mod keys;
mod reader;
pub mod store;

pub use client::RegistryClient;
pub use keys::{instance_key, instances_set_key, instances_set_pattern, service_name_from_set_key};
pub use reader::RegistryReader;
pub use store::EphemeralStore;
