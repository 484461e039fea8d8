//! Postgres-backed store: construction, schema setup, and the batched
//! operation executor.
//!
//! A batch acquires one connection, processes operation groups in a fixed
//! order (Get, then Search, then ListNamespaces, then Put, so reads observe
//! the pre-batch snapshot), satisfies each group's embedding needs with a
//! single embedder call, and fills the result slot at every operation's
//! input position. Errors abort the batch; no partial result list escapes.

mod conn;
mod migrations;
mod planner;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pgvector::Vector;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};

use crate::embed::{IndexConfig, StoreIndex};
use crate::error::StoreError;
use crate::store::item::{Item, SearchItem};
use crate::store::namespace::{decode_namespace, Namespace};
use crate::store::ops::{
    group_ops, GetOp, GroupedOps, ListNamespacesOp, Op, OpResult, PutOp, SearchOp,
};
use crate::store::Store;

pub use conn::{ConnSource, PoolConfig};

use conn::build_pool;
use migrations::{run_migrations, MigrationContext};
use planner::{
    plan_get_ops, plan_list_namespaces_ops, plan_put_ops, plan_search_ops, plan_vector_scrub,
    plan_vector_upsert, SqlParam,
};

/// Construction options for [`PostgresStore`].
#[derive(Default)]
pub struct StoreOptions {
    /// Dispatch a read group's statements concurrently so the driver
    /// pipelines them on the wire. Single-connection stores only.
    pub pipeline: bool,
    /// Use a connection pool instead of a single connection. Overrides
    /// `pipeline`, which a pool source rejects.
    pub pool: Option<PoolConfig>,
    /// Enable semantic indexing.
    pub index: Option<IndexConfig>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pipeline(mut self) -> Self {
        self.pipeline = true;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = Some(index);
        self
    }
}

/// Postgres-backed [`Store`] with batched operations and optional vector
/// search through the pgvector extension.
///
/// Call [`PostgresStore::setup`] once against a fresh database before the
/// first batch.
#[derive(Debug)]
pub struct PostgresStore {
    conn: ConnSource,
    pipeline: bool,
    /// Serializes batches on a single connection when pipelining is off.
    lock: tokio::sync::Mutex<()>,
    index: Option<StoreIndex>,
}

impl PostgresStore {
    /// Wraps an existing connection source.
    ///
    /// Rejects `pipeline` with a pool source: pipelining assumes one shared
    /// connection that the driver multiplexes.
    pub fn new(
        conn: ConnSource,
        pipeline: bool,
        index: Option<IndexConfig>,
    ) -> Result<Self, StoreError> {
        if pipeline && conn.is_pool() {
            return Err(StoreError::Config(
                "pipeline mode requires a single connection, not a pool".to_string(),
            ));
        }
        let index = index.map(StoreIndex::ensure).transpose()?;
        Ok(Self {
            conn,
            pipeline,
            lock: tokio::sync::Mutex::new(()),
            index,
        })
    }

    /// Connects to `dsn` and builds a store from [`StoreOptions`].
    ///
    /// With a pool config, a deadpool pool is built (and pre-warmed to
    /// `min_size`); otherwise a single connection is opened and its driver
    /// task spawned onto the current runtime.
    pub async fn from_conn_string(dsn: &str, options: StoreOptions) -> Result<Self, StoreError> {
        if let Some(pool_config) = &options.pool {
            if options.pipeline {
                return Err(StoreError::Config(
                    "pipeline mode requires a single connection, not a pool".to_string(),
                ));
            }
            let pool = build_pool(dsn, pool_config).await?;
            Self::new(ConnSource::Pool(pool), false, options.index)
        } else {
            let (client, connection) = tokio_postgres::connect(dsn, NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::warn!(error = %e, "postgres connection task ended");
                }
            });
            Self::new(
                ConnSource::Client(Arc::new(client)),
                options.pipeline,
                options.index,
            )
        }
    }

    /// Creates tables and runs pending migrations, including the vector
    /// schema when indexing is configured. Idempotent.
    pub async fn setup(&self) -> Result<(), StoreError> {
        let guard = self.conn.acquire().await?;
        let ctx = MigrationContext {
            dims: self.index.as_ref().map(|index| index.config.dims),
        };
        run_migrations(guard.client(), &ctx).await
    }

    fn serializes_batches(&self) -> bool {
        matches!(self.conn, ConnSource::Client(_)) && !self.pipeline
    }

    async fn execute_batch(
        &self,
        grouped: &GroupedOps,
        results: &mut [OpResult],
        client: &Client,
    ) -> Result<(), StoreError> {
        if !grouped.gets.is_empty() {
            self.batch_get_ops(&grouped.gets, results, client).await?;
        }
        if !grouped.searches.is_empty() {
            self.batch_search_ops(&grouped.searches, results, client)
                .await?;
        }
        if !grouped.lists.is_empty() {
            self.batch_list_namespaces_ops(&grouped.lists, results, client)
                .await?;
        }
        if !grouped.puts.is_empty() {
            self.batch_put_ops(&grouped.puts, client).await?;
        }
        Ok(())
    }

    /// Runs read statements, concurrently when pipelining is on (the driver
    /// coalesces concurrent queries on one connection).
    async fn run_queries(
        &self,
        client: &Client,
        statements: Vec<(&str, &[SqlParam])>,
    ) -> Result<Vec<Vec<Row>>, StoreError> {
        if self.pipeline {
            futures::future::try_join_all(statements.into_iter().map(|(sql, params)| async move {
                let refs = param_refs(params)?;
                client.query(sql, &refs).await.map_err(StoreError::from)
            }))
            .await
        } else {
            let mut row_sets = Vec::with_capacity(statements.len());
            for (sql, params) in statements {
                let refs = param_refs(params)?;
                row_sets.push(client.query(sql, &refs).await?);
            }
            Ok(row_sets)
        }
    }

    async fn batch_get_ops(
        &self,
        ops: &[(usize, GetOp)],
        results: &mut [OpResult],
        client: &Client,
    ) -> Result<(), StoreError> {
        let plans = plan_get_ops(ops);
        let statements = plans
            .iter()
            .map(|plan| (plan.sql.as_str(), plan.params.as_slice()))
            .collect();
        let row_sets = self.run_queries(client, statements).await?;
        for (plan, rows) in plans.iter().zip(row_sets) {
            let mut by_key: HashMap<String, Row> = HashMap::with_capacity(rows.len());
            for row in rows {
                by_key.insert(row.try_get("key")?, row);
            }
            for (idx, key) in &plan.requests {
                let item = match by_key.get(key) {
                    Some(row) => Some(row_to_item(plan.namespace.clone(), row)?),
                    None => None,
                };
                results[*idx] = OpResult::Item(item);
            }
        }
        Ok(())
    }

    async fn batch_search_ops(
        &self,
        ops: &[(usize, SearchOp)],
        results: &mut [OpResult],
        client: &Client,
    ) -> Result<(), StoreError> {
        let mut plans = plan_search_ops(ops, self.index.as_ref())?;

        // One embedder call covers every query in the batch.
        let pending: Vec<usize> = plans
            .iter()
            .enumerate()
            .filter(|(_, plan)| plan.needs_query_vector)
            .map(|(position, _)| position)
            .collect();
        if !pending.is_empty() {
            let index = self.index.as_ref().ok_or_else(|| {
                StoreError::MissingEmbedder(
                    "search query requires an index configuration".to_string(),
                )
            })?;
            let texts: Vec<String> = pending
                .iter()
                .map(|&position| {
                    ops[position]
                        .1
                        .options
                        .query
                        .clone()
                        .unwrap_or_default()
                })
                .collect();
            let vectors = index.config.embedder.embed_documents(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(StoreError::Embedding(format!(
                    "embedder returned {} vectors for {} queries",
                    vectors.len(),
                    texts.len()
                )));
            }
            for (&position, vector) in pending.iter().zip(vectors) {
                if vector.len() != index.config.dims {
                    return Err(StoreError::Embedding(format!(
                        "embedder returned a {}-dimensional query vector, expected {}",
                        vector.len(),
                        index.config.dims
                    )));
                }
                plans[position].params[0] = SqlParam::Vector(Vector::from(vector));
            }
        }

        let statements = plans
            .iter()
            .map(|plan| (plan.sql.as_str(), plan.params.as_slice()))
            .collect();
        let row_sets = self.run_queries(client, statements).await?;
        for (((idx, _), plan), rows) in ops.iter().zip(&plans).zip(row_sets) {
            let mut items = Vec::with_capacity(rows.len());
            for row in &rows {
                items.push(row_to_search_item(row, plan.needs_query_vector)?);
            }
            results[*idx] = OpResult::Search(items);
        }
        Ok(())
    }

    async fn batch_list_namespaces_ops(
        &self,
        ops: &[(usize, ListNamespacesOp)],
        results: &mut [OpResult],
        client: &Client,
    ) -> Result<(), StoreError> {
        let plans = plan_list_namespaces_ops(ops);
        let statements = plans
            .iter()
            .map(|(sql, params)| (sql.as_str(), params.as_slice()))
            .collect();
        let row_sets = self.run_queries(client, statements).await?;
        for ((idx, _), rows) in ops.iter().zip(row_sets) {
            let mut namespaces = Vec::with_capacity(rows.len());
            for row in &rows {
                let prefix: String = row.try_get("truncated_prefix")?;
                namespaces.push(decode_namespace(&prefix)?);
            }
            results[*idx] = OpResult::Namespaces(namespaces);
        }
        Ok(())
    }

    async fn batch_put_ops(
        &self,
        ops: &[(usize, PutOp)],
        client: &Client,
    ) -> Result<(), StoreError> {
        let plan = plan_put_ops(ops, self.index.as_ref())?;
        let mut statements = plan.statements;
        if !plan.scrub_keys.is_empty() {
            statements.push(plan_vector_scrub(&plan.scrub_keys));
        }
        if !plan.embedding_rows.is_empty() {
            let index = self.index.as_ref().ok_or_else(|| {
                StoreError::MissingEmbedder(
                    "indexed put requires an index configuration".to_string(),
                )
            })?;
            let texts: Vec<String> = plan
                .embedding_rows
                .iter()
                .map(|row| row.text.clone())
                .collect();
            let vectors = index.config.embedder.embed_documents(&texts).await?;
            statements.push(plan_vector_upsert(
                &plan.embedding_rows,
                vectors,
                index.config.dims,
            )?);
        }
        // Writes stay sequential: the vector statements depend on the item
        // upsert, and deletes must land before re-inserts of the same key.
        for (sql, params) in &statements {
            let refs = param_refs(params)?;
            client.execute(sql.as_str(), &refs).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn batch(&self, ops: Vec<Op>) -> Result<Vec<OpResult>, StoreError> {
        let (grouped, total) = group_ops(ops);
        tracing::debug!(
            total,
            gets = grouped.gets.len(),
            searches = grouped.searches.len(),
            lists = grouped.lists.len(),
            puts = grouped.puts.len(),
            "executing batch"
        );
        let mut results = vec![OpResult::Unit; total];
        let guard = self.conn.acquire().await?;
        let client = guard.client();
        if self.serializes_batches() {
            let _serial = self.lock.lock().await;
            self.execute_batch(&grouped, &mut results, client).await?;
        } else {
            self.execute_batch(&grouped, &mut results, client).await?;
        }
        Ok(results)
    }
}

fn param_refs(params: &[SqlParam]) -> Result<Vec<&(dyn ToSql + Sync)>, StoreError> {
    params.iter().map(SqlParam::as_sql).collect()
}

fn row_to_item(namespace: Namespace, row: &Row) -> Result<Item, StoreError> {
    Ok(Item {
        namespace,
        key: row.try_get("key")?,
        value: row.try_get("value")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_search_item(row: &Row, scored: bool) -> Result<SearchItem, StoreError> {
    let prefix: String = row.try_get("prefix")?;
    let item = row_to_item(decode_namespace(&prefix)?, row)?;
    let score = if scored {
        Some(row.try_get::<_, f64>("score")?)
    } else {
        None
    };
    Ok(SearchItem { item, score })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::FnEmbedder;

    fn unit_index(dims: usize) -> IndexConfig {
        IndexConfig::new(
            dims,
            Arc::new(FnEmbedder::new(move |texts: &[String]| {
                texts.iter().map(|_| vec![0.0; dims]).collect()
            })),
        )
    }

    /// **Scenario**: constructing with pipeline over a pool source is a
    /// configuration error, and a zero-dims index is rejected up front.
    #[tokio::test]
    async fn new_rejects_bad_configurations() {
        let err = PostgresStore::from_conn_string(
            "host=localhost user=postgres",
            StoreOptions::new()
                .with_pool(PoolConfig::default())
                .with_pipeline(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)), "{:?}", err);

        // Pool building is lazy, so index validation is reachable without a
        // live server.
        let err = PostgresStore::from_conn_string(
            "host=localhost user=postgres",
            StoreOptions::new()
                .with_pool(PoolConfig {
                    min_size: 0,
                    max_size: Some(1),
                })
                .with_index(unit_index(0)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)), "{:?}", err);
    }
}
