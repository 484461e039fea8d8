//! Connection sources: something a batch can borrow a connection from.
//!
//! Two shapes exist: a deadpool pool (one checkout per batch) and a single
//! shared `tokio_postgres::Client`. Release is drop-based: a pooled guard
//! returns its connection when it goes out of scope.

use std::sync::Arc;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{Client, NoTls};

use crate::error::StoreError;

/// Pool sizing forwarded to the pool builder.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections created up front. Default: 1.
    pub min_size: usize,
    /// Upper bound on pool size; the builder's default when `None`.
    pub max_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: None,
        }
    }
}

/// Where batches get their connection from.
#[derive(Debug)]
pub enum ConnSource {
    /// Connection pool; each batch checks out one connection for its
    /// lifetime.
    Pool(Pool),
    /// One shared connection handle, multiplexed by the driver.
    Client(Arc<Client>),
}

impl ConnSource {
    pub(crate) fn is_pool(&self) -> bool {
        matches!(self, ConnSource::Pool(_))
    }

    pub(crate) async fn acquire(&self) -> Result<ConnGuard<'_>, StoreError> {
        match self {
            ConnSource::Pool(pool) => {
                let object = pool
                    .get()
                    .await
                    .map_err(|e| StoreError::Connection(e.to_string()))?;
                Ok(ConnGuard::Pooled(object))
            }
            ConnSource::Client(client) => Ok(ConnGuard::Direct(client)),
        }
    }
}

/// A connection held for the duration of one batch.
pub(crate) enum ConnGuard<'a> {
    Pooled(deadpool_postgres::Object),
    Direct(&'a Client),
}

impl ConnGuard<'_> {
    pub(crate) fn client(&self) -> &Client {
        match self {
            ConnGuard::Pooled(object) => object,
            ConnGuard::Direct(client) => client,
        }
    }
}

/// Builds a pool over `dsn` and pre-warms it to `min_size` connections.
pub(crate) async fn build_pool(dsn: &str, config: &PoolConfig) -> Result<Pool, StoreError> {
    let pg_config: tokio_postgres::Config = dsn
        .parse()
        .map_err(|e: tokio_postgres::Error| {
            StoreError::Config(format!("invalid connection string: {}", e))
        })?;
    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let mut builder = Pool::builder(manager);
    if let Some(max_size) = config.max_size {
        builder = builder.max_size(max_size);
    }
    let pool = builder
        .build()
        .map_err(|e| StoreError::Config(e.to_string()))?;
    if config.min_size > 0 {
        // deadpool creates lazily; checking out min_size guards at once
        // forces that many connections into existence.
        let warm = futures::future::try_join_all((0..config.min_size).map(|_| pool.get()))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        drop(warm);
    }
    Ok(pool)
}
