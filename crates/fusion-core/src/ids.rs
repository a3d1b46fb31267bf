// Stable record identifiers

use uuid::Uuid;

/// Namespace every portal dn is hashed under.
pub const ID_NAMESPACE: Uuid = Uuid::NAMESPACE_DNS;

/// Deterministic UUID v5 for a portal dn. Empty input yields an empty id.
pub fn stable_id(dn: &str) -> String {
    if dn.is_empty() {
        return String::new();
    }
    Uuid::new_v5(&ID_NAMESPACE, dn.as_bytes()).to_string()
}
