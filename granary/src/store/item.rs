//! Stored records: [`Item`] and [`SearchItem`].

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::namespace::Namespace;

/// Represents a stored item with metadata.
///
/// Equality is structural; hashing covers only `(namespace, key)` so items
/// can act as identity keys in sets and maps.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Item {
    /// Hierarchical path defining the collection in which this item resides.
    pub namespace: Namespace,
    /// Unique identifier within the namespace.
    pub key: String,
    /// The stored data as a JSON value. Keys are filterable.
    pub value: serde_json::Value,
    /// Timestamp of item creation.
    pub created_at: DateTime<Utc>,
    /// Timestamp of last update.
    pub updated_at: DateTime<Utc>,
}

impl Hash for Item {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace.hash(state);
        self.key.hash(state);
    }
}

/// An item returned from a search operation.
///
/// `score` is present for ranked (semantic) search and `None` for plain
/// filtered scans.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchItem {
    /// The base item data.
    pub item: Item,
    /// Relevance score when the result came from a ranked operation.
    pub score: Option<f64>,
}

impl SearchItem {
    /// Wraps an item without a score (non-ranked search).
    pub fn from_item(item: Item) -> Self {
        Self { item, score: None }
    }

    /// Wraps an item with a relevance score.
    pub fn with_score(item: Item, score: f64) -> Self {
        Self {
            item,
            score: Some(score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::hash_map::DefaultHasher;

    fn item(ns: &[&str], key: &str, value: serde_json::Value) -> Item {
        let now = Utc::now();
        Item {
            namespace: ns.iter().map(|s| s.to_string()).collect(),
            key: key.to_string(),
            value,
            created_at: now,
            updated_at: now,
        }
    }

    fn hash_of(item: &Item) -> u64 {
        let mut h = DefaultHasher::new();
        item.hash(&mut h);
        h.finish()
    }

    /// **Scenario**: two items with the same identity but different values
    /// hash alike while comparing unequal.
    #[test]
    fn hash_is_identity_only() {
        let a = item(&["docs"], "r1", json!({"n": 1}));
        let mut b = a.clone();
        b.value = json!({"n": 2});
        assert_ne!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn search_item_constructors() {
        let base = item(&["docs"], "r1", json!({}));
        assert!(SearchItem::from_item(base.clone()).score.is_none());
        assert_eq!(SearchItem::with_score(base, 0.93).score, Some(0.93));
    }
}
