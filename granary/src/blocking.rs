//! Thin blocking facade over the cooperative store.
//!
//! The async form is authoritative; every method here posts the equivalent
//! future onto the store's runtime and waits for the reply on a channel.
//! Call these from threads outside that runtime (a worker inside it would
//! block one of its own threads while waiting).

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::StoreError;
use crate::store::{
    IndexPolicy, Item, ListNamespacesOptions, Namespace, Op, OpResult, SearchItem, SearchOptions,
    Store,
};

/// Blocking wrapper around any [`Store`].
pub struct BlockingStore<S: Store + 'static> {
    inner: Arc<S>,
    handle: Handle,
}

impl<S: Store + 'static> BlockingStore<S> {
    /// Binds `inner` to the runtime behind `handle`; all work runs there.
    pub fn new(inner: Arc<S>, handle: Handle) -> Self {
        Self { inner, handle }
    }

    /// Returns the wrapped cooperative store.
    pub fn into_inner(self) -> Arc<S> {
        self.inner
    }

    fn wait<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let (tx, rx) = std::sync::mpsc::channel();
        self.handle.spawn(async move {
            let _ = tx.send(fut.await);
        });
        rx.recv().map_err(|_| {
            StoreError::Connection("store scheduler dropped before replying".to_string())
        })?
    }

    pub fn batch(&self, ops: Vec<Op>) -> Result<Vec<OpResult>, StoreError> {
        let store = Arc::clone(&self.inner);
        self.wait(async move { store.batch(ops).await })
    }

    pub fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Item>, StoreError> {
        let store = Arc::clone(&self.inner);
        let namespace = namespace.clone();
        let key = key.to_string();
        self.wait(async move { store.get(&namespace, &key).await })
    }

    pub fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        let store = Arc::clone(&self.inner);
        let namespace = namespace.clone();
        let key = key.to_string();
        self.wait(async move { store.put(&namespace, &key, value).await })
    }

    pub fn put_indexed(
        &self,
        namespace: &Namespace,
        key: &str,
        value: serde_json::Value,
        index: IndexPolicy,
    ) -> Result<(), StoreError> {
        let store = Arc::clone(&self.inner);
        let namespace = namespace.clone();
        let key = key.to_string();
        self.wait(async move { store.put_indexed(&namespace, &key, value, index).await })
    }

    pub fn delete(&self, namespace: &Namespace, key: &str) -> Result<(), StoreError> {
        let store = Arc::clone(&self.inner);
        let namespace = namespace.clone();
        let key = key.to_string();
        self.wait(async move { store.delete(&namespace, &key).await })
    }

    pub fn search(
        &self,
        namespace_prefix: &Namespace,
        options: SearchOptions,
    ) -> Result<Vec<SearchItem>, StoreError> {
        let store = Arc::clone(&self.inner);
        let namespace_prefix = namespace_prefix.clone();
        self.wait(async move { store.search(&namespace_prefix, options).await })
    }

    pub fn list_namespaces(
        &self,
        options: ListNamespacesOptions,
    ) -> Result<Vec<Namespace>, StoreError> {
        let store = Arc::clone(&self.inner);
        self.wait(async move { store.list_namespaces(options).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::namespace::{namespace, validate_namespace};
    use crate::store::{GetOp, PutOp, SearchOp};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Minimal in-memory [`Store`]: enough batch semantics to exercise the
    /// facade and the trait's provided methods off-runtime.
    #[derive(Default)]
    struct MemoryStore {
        items: Mutex<HashMap<(Namespace, String), Item>>,
    }

    #[async_trait]
    impl Store for MemoryStore {
        async fn batch(&self, ops: Vec<Op>) -> Result<Vec<OpResult>, StoreError> {
            let mut items = self.items.lock().await;
            let mut results = Vec::with_capacity(ops.len());
            for op in ops {
                results.push(match op {
                    Op::Get(GetOp { namespace, key }) => {
                        OpResult::Item(items.get(&(namespace, key)).cloned())
                    }
                    Op::Put(PutOp {
                        namespace,
                        key,
                        value,
                        ..
                    }) => {
                        match value {
                            Some(value) => {
                                let now = Utc::now();
                                items.insert(
                                    (namespace.clone(), key.clone()),
                                    Item {
                                        namespace,
                                        key,
                                        value,
                                        created_at: now,
                                        updated_at: now,
                                    },
                                );
                            }
                            None => {
                                items.remove(&(namespace, key));
                            }
                        }
                        OpResult::Unit
                    }
                    Op::Search(SearchOp {
                        namespace_prefix, ..
                    }) => OpResult::Search(
                        items
                            .values()
                            .filter(|item| item.namespace.starts_with(&namespace_prefix))
                            .cloned()
                            .map(SearchItem::from_item)
                            .collect(),
                    ),
                    Op::ListNamespaces(_) => {
                        let mut namespaces: Vec<Namespace> =
                            items.values().map(|item| item.namespace.clone()).collect();
                        namespaces.sort();
                        namespaces.dedup();
                        OpResult::Namespaces(namespaces)
                    }
                });
            }
            Ok(results)
        }
    }

    /// **Scenario**: the blocking facade round-trips put/get/delete from a
    /// plain thread while the work runs on the store's runtime.
    #[test]
    fn blocking_facade_round_trip() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store = BlockingStore::new(Arc::new(MemoryStore::default()), runtime.handle().clone());
        let ns = namespace(&["docs", "u1"]);

        store.put(&ns, "r1", json!({"title": "Q4"})).unwrap();
        let item = store.get(&ns, "r1").unwrap().unwrap();
        assert_eq!(item.value, json!({"title": "Q4"}));

        let hits = store.search(&ns, SearchOptions::new()).unwrap();
        assert_eq!(hits.len(), 1);

        store.delete(&ns, "r1").unwrap();
        assert!(store.get(&ns, "r1").unwrap().is_none());
    }

    /// **Scenario**: the provided `put` validates namespaces before any
    /// work is scheduled.
    #[test]
    fn blocking_put_rejects_invalid_namespace() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store = BlockingStore::new(Arc::new(MemoryStore::default()), runtime.handle().clone());
        for bad in [namespace(&["a.b"]), namespace(&["langgraph", "x"]), vec![]] {
            assert!(validate_namespace(&bad).is_err());
            assert!(matches!(
                store.put(&bad, "k", json!({})),
                Err(StoreError::InvalidNamespace(_))
            ));
        }
    }

    #[test]
    fn blocking_batch_preserves_order() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let store = BlockingStore::new(Arc::new(MemoryStore::default()), runtime.handle().clone());
        let ns = namespace(&["docs"]);
        let results = store
            .batch(vec![
                Op::Put(PutOp::new(ns.clone(), "k", json!({"n": 1}))),
                Op::Get(GetOp::new(ns.clone(), "k")),
            ])
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], OpResult::Unit));
        assert!(matches!(results[1], OpResult::Item(Some(_))));
    }
}
