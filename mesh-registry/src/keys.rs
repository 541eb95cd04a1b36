//! Registry key/set layout (spec §6, binding): `services:<name>:instance:<id>`
//! and `services:<name>:instances`.

pub fn instance_key(service_name: &str, instance_id: &str) -> String {
    format!("services:{service_name}:instance:{instance_id}")
}

pub fn instances_set_key(service_name: &str) -> String {
    format!("services:{service_name}:instances")
}

pub fn instances_set_pattern() -> &'static str {
    "services:*:instances"
}

/// Recovers the service name from a `services:<name>:instances` set key, the
/// way `list_all` maps scanned keys back to per-service lists.
pub fn service_name_from_set_key(key: &str) -> Option<&str> {
    key.strip_prefix("services:")?.strip_suffix(":instances")
}
