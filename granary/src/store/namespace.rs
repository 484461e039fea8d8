//! Namespace validation and wire encoding.
//!
//! Namespaces are tuples of labels (e.g. `["users", "u1", "memories"]`).
//! On disk they are `.`-joined into the `prefix` column and split back on
//! read, so labels must never contain a `.`.

use crate::error::StoreError;

/// Namespace for the store: e.g. `["user_id", "memories"]`. Each element is
/// one level in the hierarchy.
pub type Namespace = Vec<String>;

/// Root label reserved for framework-internal state.
pub const RESERVED_ROOT: &str = "langgraph";

/// Checks that a namespace is storable: non-empty, no empty labels, no `.`
/// in any label, and the root label is not [`RESERVED_ROOT`].
pub fn validate_namespace(namespace: &[String]) -> Result<(), StoreError> {
    if namespace.is_empty() {
        return Err(StoreError::InvalidNamespace(
            "namespace cannot be empty".to_string(),
        ));
    }
    for label in namespace {
        if label.is_empty() {
            return Err(StoreError::InvalidNamespace(format!(
                "namespace labels cannot be empty strings, got {:?}",
                namespace
            )));
        }
        if label.contains('.') {
            return Err(StoreError::InvalidNamespace(format!(
                "namespace label {:?} cannot contain periods ('.')",
                label
            )));
        }
    }
    if namespace[0] == RESERVED_ROOT {
        return Err(StoreError::InvalidNamespace(format!(
            "root label for namespace cannot be {:?}, got {:?}",
            RESERVED_ROOT, namespace
        )));
    }
    Ok(())
}

/// Joins a namespace into its stored `prefix` form.
pub(crate) fn encode_namespace(namespace: &[String]) -> String {
    namespace.join(".")
}

/// Splits a stored `prefix` back into a namespace. Empty labels mean the
/// column was written outside this crate's validation and are rejected.
pub(crate) fn decode_namespace(prefix: &str) -> Result<Namespace, StoreError> {
    let labels: Namespace = prefix.split('.').map(str::to_string).collect();
    if labels.iter().any(|l| l.is_empty()) {
        return Err(StoreError::Serialization(format!(
            "stored namespace prefix {:?} contains an empty label",
            prefix
        )));
    }
    Ok(labels)
}

/// Convenience for building a [`Namespace`] from string slices.
pub fn namespace(labels: &[&str]) -> Namespace {
    labels.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(labels: &[&str]) -> Namespace {
        namespace(labels)
    }

    #[test]
    fn valid_namespaces_pass() {
        validate_namespace(&ns(&["docs"])).unwrap();
        validate_namespace(&ns(&["docs", "user123", "memories"])).unwrap();
    }

    /// **Scenario**: empty tuple, empty label, dotted label, and the
    /// reserved root are each rejected.
    #[test]
    fn invalid_namespaces_fail() {
        for bad in [
            ns(&[]),
            ns(&["docs", ""]),
            ns(&["a.b"]),
            ns(&[RESERVED_ROOT, "x"]),
        ] {
            match validate_namespace(&bad) {
                Err(StoreError::InvalidNamespace(_)) => {}
                other => panic!("expected InvalidNamespace for {:?}, got {:?}", bad, other),
            }
        }
    }

    #[test]
    fn reserved_root_allowed_below_top_level() {
        validate_namespace(&ns(&["users", RESERVED_ROOT])).unwrap();
    }

    #[test]
    fn encode_decode_round_trip() {
        let namespace = ns(&["a", "b", "c"]);
        let prefix = encode_namespace(&namespace);
        assert_eq!(prefix, "a.b.c");
        assert_eq!(decode_namespace(&prefix).unwrap(), namespace);
    }

    #[test]
    fn decode_rejects_empty_labels() {
        assert!(matches!(
            decode_namespace("a..b"),
            Err(StoreError::Serialization(_))
        ));
    }
}
