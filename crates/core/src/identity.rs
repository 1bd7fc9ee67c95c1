//! Identifiers for exported groups and elements.
//!
//! Groups get name-derived (UUIDv5) identifiers so a re-export under the same
//! group name lands on the same group in the importer. Elements get random
//! (UUIDv4) identifiers. Both are plain [`Uuid`] values.

use uuid::Uuid;

/// Fixed namespace under which group identifiers are derived.
pub const ELEMENTS_NAMESPACE: Uuid = Uuid::from_u128(0x12345678_1234_5678_1234_123456789abc);

/// Deterministic identifier for `seed` in [`ELEMENTS_NAMESPACE`].
pub fn reproducible_id(seed: &str) -> Uuid {
    Uuid::new_v5(&ELEMENTS_NAMESPACE, seed.as_bytes())
}

/// Deterministic identifier for `seed` under a caller-named namespace.
///
/// The namespace itself is derived from its name in the DNS namespace, so the
/// same `(namespace, seed)` pair always yields the same identifier.
pub fn reproducible_id_in(namespace: &str, seed: &str) -> Uuid {
    let namespace_id = Uuid::new_v5(&Uuid::NAMESPACE_DNS, namespace.as_bytes());
    Uuid::new_v5(&namespace_id, seed.as_bytes())
}

/// Fresh random identifier.
pub fn unique_id() -> Uuid {
    Uuid::new_v4()
}

/// Whether `text` parses as an identifier.
pub fn is_valid_id(text: &str) -> bool {
    Uuid::parse_str(text).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_reproducible_id_is_stable() {
        assert_eq!(reproducible_id("Demo"), reproducible_id("Demo"));
        assert_eq!(reproducible_id(""), reproducible_id(""));
    }

    #[test]
    fn test_reproducible_id_differs_by_seed() {
        assert_ne!(reproducible_id("Demo"), reproducible_id("demo"));
        assert_ne!(reproducible_id("Demo"), reproducible_id("Demo "));
    }

    #[test]
    fn test_reproducible_id_is_version_5() {
        assert_eq!(reproducible_id("Demo").get_version_num(), 5);
    }

    #[test]
    fn test_reproducible_id_in_namespace() {
        let a = reproducible_id_in("my-efficient-elements", "Demo");
        let b = reproducible_id_in("my-efficient-elements", "Demo");
        let c = reproducible_id_in("other-namespace", "Demo");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, reproducible_id("Demo"));
    }

    #[test]
    fn test_unique_ids_do_not_repeat() {
        let ids: HashSet<Uuid> = (0..1000).map(|_| unique_id()).collect();
        assert_eq!(ids.len(), 1000);
        assert_eq!(unique_id().get_version_num(), 4);
    }

    #[test]
    fn test_ids_share_one_textual_format() {
        let a = reproducible_id("Demo").to_string();
        let b = unique_id().to_string();
        assert_eq!(a.len(), b.len());
        assert!(is_valid_id(&a));
        assert!(is_valid_id(&b));
    }

    #[test]
    fn test_is_valid_id_rejects_garbage() {
        assert!(!is_valid_id("not-a-uuid"));
        assert!(!is_valid_id(""));
        assert!(is_valid_id("12345678-1234-5678-1234-123456789abc"));
    }
}
