//! Store surface: records, operations, namespaces, paths, and the [`Store`]
//! trait.
//!
//! The trait is batch-first: `batch` is the one required method, and every
//! convenience helper (`get`, `put`, `delete`, `search`, `list_namespaces`)
//! is a provided method that runs a one-element batch and unwraps
//! `results[0]`. Backends only ever implement the batch engine.

pub mod item;
pub mod namespace;
pub mod ops;
pub mod path;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

pub use item::{Item, SearchItem};
pub use namespace::{namespace, validate_namespace, Namespace, RESERVED_ROOT};
pub use ops::{
    FilterOp, GetOp, IndexPolicy, ListNamespacesOp, ListNamespacesOptions, MatchCondition,
    NamespaceMatchType, Op, OpResult, PutOp, SearchOp, SearchOptions,
};
pub use path::{get_text_at_path, tokenize_path, PathSegment};

fn single_result(mut results: Vec<OpResult>, kind: &str) -> Result<OpResult, StoreError> {
    match results.pop() {
        Some(result) if results.is_empty() => Ok(result),
        _ => Err(StoreError::Internal(format!(
            "expected exactly one result for a {} operation",
            kind
        ))),
    }
}

/// Persistent key-value store with hierarchical namespaces and optional
/// semantic search.
///
/// Long-term memory shared across threads and sessions, isolated by
/// [`Namespace`] (e.g. `["user_id", "memories"]`). All operations are
/// suspension points; batches of mixed operations answer each op at its
/// input position.
#[async_trait]
pub trait Store: Send + Sync {
    /// Executes multiple operations in a single batch.
    ///
    /// The result list has one entry per input operation, in input order.
    /// Within a batch, reads observe the state before the batch's writes.
    /// A failed batch returns no result list.
    async fn batch(&self, ops: Vec<Op>) -> Result<Vec<OpResult>, StoreError>;

    /// Retrieves a single item, or `None` if absent.
    async fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Item>, StoreError> {
        let results = self
            .batch(vec![Op::Get(GetOp::new(namespace.clone(), key))])
            .await?;
        match single_result(results, "get")? {
            OpResult::Item(item) => Ok(item),
            _ => Err(StoreError::Internal(
                "get operation answered with a non-item result".to_string(),
            )),
        }
    }

    /// Stores or replaces an item under the store's default index policy.
    ///
    /// The namespace is validated before anything is enqueued.
    async fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        self.put_indexed(namespace, key, value, IndexPolicy::Default)
            .await
    }

    /// Stores or replaces an item with an explicit index policy.
    async fn put_indexed(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        index: IndexPolicy,
    ) -> Result<(), StoreError> {
        validate_namespace(namespace)?;
        let mut op = PutOp::new(namespace.clone(), key, value);
        op.index = index;
        self.batch(vec![Op::Put(op)]).await?;
        Ok(())
    }

    /// Deletes an item. Deleting an absent item is a no-op.
    async fn delete(&self, namespace: &Namespace, key: &str) -> Result<(), StoreError> {
        self.batch(vec![Op::Put(PutOp::delete(namespace.clone(), key))])
            .await?;
        Ok(())
    }

    /// Searches for items within a namespace prefix.
    async fn search(
        &self,
        namespace_prefix: &Namespace,
        options: SearchOptions,
    ) -> Result<Vec<SearchItem>, StoreError> {
        let results = self
            .batch(vec![Op::Search(SearchOp::new(
                namespace_prefix.clone(),
                options,
            ))])
            .await?;
        match single_result(results, "search")? {
            OpResult::Search(items) => Ok(items),
            _ => Err(StoreError::Internal(
                "search operation answered with a non-search result".to_string(),
            )),
        }
    }

    /// Lists distinct namespaces matching the given options, sorted
    /// lexicographically.
    async fn list_namespaces(
        &self,
        options: ListNamespacesOptions,
    ) -> Result<Vec<Namespace>, StoreError> {
        let results = self
            .batch(vec![Op::ListNamespaces(ListNamespacesOp::new(options))])
            .await?;
        match single_result(results, "list_namespaces")? {
            OpResult::Namespaces(namespaces) => Ok(namespaces),
            _ => Err(StoreError::Internal(
                "list_namespaces operation answered with a non-namespace result".to_string(),
            )),
        }
    }
}
