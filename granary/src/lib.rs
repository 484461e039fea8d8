//! # Granary
//!
//! A persistent, hierarchically-namespaced key-value store with optional
//! semantic (vector) search over JSON documents, built for long-term agent
//! memory. Items live under a tuple namespace (e.g. `["user123",
//! "memories"]`) plus a string key, carry a JSON value, and keep creation
//! and update timestamps.
//!
//! ## Design principles
//!
//! - **Batch-first**: every interaction is an [`Op`]; [`Store::batch`]
//!   groups a mixed sequence by kind, plans a minimal set of SQL statements
//!   per group, satisfies embedding needs with one embedder call, and
//!   answers each operation at its input position. The convenience helpers
//!   ([`Store::get`], [`Store::put`], ...) are one-element batches.
//! - **Reads before writes**: within a batch, groups execute Get → Search →
//!   ListNamespaces → Put, so reads observe the pre-batch snapshot.
//! - **Planner/executor split**: planning is pure (`(statement, params)`
//!   data, unit-testable without a database); only the executor touches the
//!   connection.
//! - **Cooperative core, thin blocking shell**: the async form is
//!   authoritative; [`BlockingStore`] posts work onto the store's runtime
//!   and waits.
//!
//! ## Main modules
//!
//! - [`store`]: [`Item`], [`SearchItem`], operations and options, namespace
//!   validation, JSON-path extraction, and the [`Store`] trait.
//! - [`postgres`]: [`PostgresStore`] over tokio-postgres with pgvector,
//!   pooled or single-connection, plus schema migrations via
//!   [`PostgresStore::setup`].
//! - [`embed`]: the [`Embedder`] capability, callable adapters, and
//!   [`IndexConfig`].
//! - [`blocking`]: [`BlockingStore`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use granary::{
//!     namespace, FnEmbedder, IndexConfig, PostgresStore, SearchOptions, Store, StoreOptions,
//! };
//!
//! # async fn demo() -> Result<(), granary::StoreError> {
//! let embedder = Arc::new(FnEmbedder::new(|texts: &[String]| {
//!     texts.iter().map(|_| vec![0.0; 1536]).collect()
//! }));
//! let store = PostgresStore::from_conn_string(
//!     "host=localhost user=postgres dbname=memory",
//!     StoreOptions::new().with_index(IndexConfig::new(1536, embedder)),
//! )
//! .await?;
//! store.setup().await?;
//!
//! let ns = namespace(&["docs", "user123"]);
//! store
//!     .put(&ns, "r1", serde_json::json!({"title": "Q4 Report"}))
//!     .await?;
//! let hits = store
//!     .search(&ns, SearchOptions::new().with_query("quarterly results"))
//!     .await?;
//! # let _ = hits;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod embed;
pub mod error;
pub mod postgres;
pub mod store;

pub use blocking::BlockingStore;
pub use embed::{Embedder, FnEmbedder, IndexConfig, TryFnEmbedder};
pub use error::StoreError;
pub use postgres::{ConnSource, PoolConfig, PostgresStore, StoreOptions};
pub use store::{
    get_text_at_path, namespace, tokenize_path, validate_namespace, FilterOp, GetOp, IndexPolicy,
    Item, ListNamespacesOp, ListNamespacesOptions, MatchCondition, Namespace, NamespaceMatchType,
    Op, OpResult, PathSegment, PutOp, SearchItem, SearchOp, SearchOptions, Store, RESERVED_ROOT,
};
