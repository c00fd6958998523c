//! Deterministic identifiers

use uuid::Uuid;

/// Name-based UUID for `value` inside a DNS-derived namespace.
///
/// `make_uuid(v, ns) = uuid5(uuid5(DNS, ns), v)`, so re-ingesting the same
/// source record always lands on the same catalog document.
pub fn make_uuid(value: &str, namespace: &str) -> Uuid {
    let namespace = Uuid::new_v5(&Uuid::NAMESPACE_DNS, namespace.as_bytes());
    Uuid::new_v5(&namespace, value.as_bytes())
}
