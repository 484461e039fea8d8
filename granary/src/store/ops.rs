//! Operation model for batch execution.
//!
//! Every store interaction is one of four operations. The batch executor
//! receives a mixed sequence, groups it by kind with [`group_ops`], and
//! answers each operation at its original position.

use std::collections::HashMap;

use serde_json::Value;

use crate::store::item::{Item, SearchItem};
use crate::store::namespace::Namespace;

/// Operation to retrieve an item by namespace and key.
#[derive(Debug, Clone)]
pub struct GetOp {
    /// Hierarchical path for the item.
    pub namespace: Namespace,
    /// Unique identifier within the namespace.
    pub key: String,
}

impl GetOp {
    pub fn new(namespace: Namespace, key: impl Into<String>) -> Self {
        Self {
            namespace,
            key: key.into(),
        }
    }
}

/// Controls how a put's value is indexed for semantic search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IndexPolicy {
    /// Use the store's default index configuration (if any).
    #[default]
    Default,
    /// Keep the item out of the vector index; existing vectors are removed.
    Disabled,
    /// Index exactly these JSON paths.
    Paths(Vec<String>),
}

/// Operation to store, update, or delete an item.
///
/// `value: None` marks the item for deletion. The same `(namespace, key)`
/// appearing more than once in a batch resolves to the last occurrence.
#[derive(Debug, Clone)]
pub struct PutOp {
    /// Hierarchical path that identifies the location of the item.
    pub namespace: Namespace,
    /// Unique identifier for the item within its namespace.
    pub key: String,
    /// The data to store, or `None` to delete.
    pub value: Option<Value>,
    /// Index policy for this put.
    pub index: IndexPolicy,
}

impl PutOp {
    pub fn new(namespace: Namespace, key: impl Into<String>, value: Value) -> Self {
        Self {
            namespace,
            key: key.into(),
            value: Some(value),
            index: IndexPolicy::Default,
        }
    }

    /// A deletion for `(namespace, key)`.
    pub fn delete(namespace: Namespace, key: impl Into<String>) -> Self {
        Self {
            namespace,
            key: key.into(),
            value: None,
            index: IndexPolicy::Default,
        }
    }

    /// Index exactly these JSON paths instead of the store default.
    pub fn with_index(mut self, paths: Vec<String>) -> Self {
        self.index = IndexPolicy::Paths(paths);
        self
    }

    /// Keep this item out of the vector index.
    pub fn without_index(mut self) -> Self {
        self.index = IndexPolicy::Disabled;
        self
    }
}

/// Filter operators for search operations.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Equal to (JSON containment on the field).
    Eq(Value),
    /// Not equal to.
    Ne(Value),
    /// Greater than (numeric).
    Gt(Value),
    /// Greater than or equal to (numeric).
    Gte(Value),
    /// Less than (numeric).
    Lt(Value),
    /// Less than or equal to (numeric).
    Lte(Value),
}

/// Options for search operations.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Natural language query for semantic search.
    pub query: Option<String>,
    /// Field filters applied to the stored value.
    pub filter: Option<HashMap<String, FilterOp>>,
    /// Maximum number of items to return. Default: 10.
    pub limit: usize,
    /// Number of matching items to skip for pagination. Default: 0.
    pub offset: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchOptions {
    pub fn new() -> Self {
        Self {
            query: None,
            filter: None,
            limit: 10,
            offset: 0,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_filter(mut self, filter: HashMap<String, FilterOp>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Operation to search for items within a namespace prefix.
#[derive(Debug, Clone)]
pub struct SearchOp {
    /// Hierarchical path prefix to search within.
    pub namespace_prefix: Namespace,
    /// Query, filters, and pagination.
    pub options: SearchOptions,
}

impl SearchOp {
    pub fn new(namespace_prefix: Namespace, options: SearchOptions) -> Self {
        Self {
            namespace_prefix,
            options,
        }
    }
}

/// Match type for namespace filtering in list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceMatchType {
    /// Match from the start of the namespace.
    Prefix,
    /// Match from the end of the namespace.
    Suffix,
}

/// Condition for matching namespaces in list operations. `"*"` in the path
/// matches exactly one label.
#[derive(Debug, Clone)]
pub struct MatchCondition {
    pub match_type: NamespaceMatchType,
    pub path: Vec<String>,
}

impl MatchCondition {
    pub fn prefix(path: Vec<String>) -> Self {
        Self {
            match_type: NamespaceMatchType::Prefix,
            path,
        }
    }

    pub fn suffix(path: Vec<String>) -> Self {
        Self {
            match_type: NamespaceMatchType::Suffix,
            path,
        }
    }
}

/// Options for listing namespaces.
#[derive(Debug, Clone)]
pub struct ListNamespacesOptions {
    /// Conditions a namespace must satisfy (all of them).
    pub match_conditions: Vec<MatchCondition>,
    /// Truncate returned namespaces to this depth.
    pub max_depth: Option<usize>,
    /// Maximum number of namespaces to return. Default: 100.
    pub limit: usize,
    /// Number of namespaces to skip for pagination. Default: 0.
    pub offset: usize,
}

impl Default for ListNamespacesOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ListNamespacesOptions {
    pub fn new() -> Self {
        Self {
            match_conditions: Vec::new(),
            max_depth: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_prefix(mut self, prefix: Vec<String>) -> Self {
        self.match_conditions.push(MatchCondition::prefix(prefix));
        self
    }

    pub fn with_suffix(mut self, suffix: Vec<String>) -> Self {
        self.match_conditions.push(MatchCondition::suffix(suffix));
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Operation to list namespaces with optional match conditions.
#[derive(Debug, Clone, Default)]
pub struct ListNamespacesOp {
    pub options: ListNamespacesOptions,
}

impl ListNamespacesOp {
    pub fn new(options: ListNamespacesOptions) -> Self {
        Self { options }
    }
}

/// A single operation in a batch.
#[derive(Debug, Clone)]
pub enum Op {
    Get(GetOp),
    Put(PutOp),
    Search(SearchOp),
    ListNamespaces(ListNamespacesOp),
}

/// Result slot for one operation. The executor writes the variant matching
/// the operation kind at the operation's input position.
#[derive(Debug, Clone)]
pub enum OpResult {
    /// Result of a Put (including deletions).
    Unit,
    /// Result of a Get: the item if found.
    Item(Option<Item>),
    /// Result of a Search.
    Search(Vec<SearchItem>),
    /// Result of a ListNamespaces.
    Namespaces(Vec<Namespace>),
}

/// Operations of one kind paired with their input positions.
#[derive(Debug, Default)]
pub(crate) struct GroupedOps {
    pub gets: Vec<(usize, GetOp)>,
    pub searches: Vec<(usize, SearchOp)>,
    pub lists: Vec<(usize, ListNamespacesOp)>,
    pub puts: Vec<(usize, PutOp)>,
}

/// Groups a mixed operation sequence by kind, preserving input positions so
/// the executor can fill the caller-visible result slots.
pub(crate) fn group_ops(ops: Vec<Op>) -> (GroupedOps, usize) {
    let total = ops.len();
    let mut grouped = GroupedOps::default();
    for (idx, op) in ops.into_iter().enumerate() {
        match op {
            Op::Get(op) => grouped.gets.push((idx, op)),
            Op::Search(op) => grouped.searches.push((idx, op)),
            Op::ListNamespaces(op) => grouped.lists.push((idx, op)),
            Op::Put(op) => grouped.puts.push((idx, op)),
        }
    }
    (grouped, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::namespace::namespace;
    use serde_json::json;

    /// **Scenario**: grouping a mixed batch keeps each op's input position
    /// and reports the total count.
    #[test]
    fn group_ops_preserves_positions() {
        let ns = namespace(&["docs"]);
        let ops = vec![
            Op::Put(PutOp::new(ns.clone(), "k1", json!({"n": 1}))),
            Op::Get(GetOp::new(ns.clone(), "k1")),
            Op::Search(SearchOp::new(ns.clone(), SearchOptions::new())),
            Op::Get(GetOp::new(ns.clone(), "k2")),
            Op::ListNamespaces(ListNamespacesOp::default()),
        ];
        let (grouped, total) = group_ops(ops);
        assert_eq!(total, 5);
        assert_eq!(
            grouped.gets.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(grouped.searches[0].0, 2);
        assert_eq!(grouped.lists[0].0, 4);
        assert_eq!(grouped.puts[0].0, 0);
    }

    #[test]
    fn put_op_builders() {
        let ns = namespace(&["docs"]);
        let put = PutOp::new(ns.clone(), "k", json!({}));
        assert_eq!(put.index, IndexPolicy::Default);
        let put = put.with_index(vec!["title".into()]);
        assert_eq!(put.index, IndexPolicy::Paths(vec!["title".into()]));
        let put = PutOp::new(ns.clone(), "k", json!({})).without_index();
        assert_eq!(put.index, IndexPolicy::Disabled);
        assert!(PutOp::delete(ns, "k").value.is_none());
    }

    #[test]
    fn search_options_builder() {
        let opts = SearchOptions::new()
            .with_query("q")
            .with_limit(20)
            .with_offset(5);
        assert_eq!(opts.query.as_deref(), Some("q"));
        assert_eq!(opts.limit, 20);
        assert_eq!(opts.offset, 5);
    }

    #[test]
    fn list_namespaces_options_builder() {
        let opts = ListNamespacesOptions::new()
            .with_prefix(vec!["users".into()])
            .with_suffix(vec!["v1".into()])
            .with_max_depth(3)
            .with_limit(50);
        assert_eq!(opts.match_conditions.len(), 2);
        assert_eq!(
            opts.match_conditions[0].match_type,
            NamespaceMatchType::Prefix
        );
        assert_eq!(
            opts.match_conditions[1].match_type,
            NamespaceMatchType::Suffix
        );
        assert_eq!(opts.max_depth, Some(3));
        assert_eq!(opts.limit, 50);
        assert_eq!(opts.offset, 0);
    }
}
