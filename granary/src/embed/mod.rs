//! Embedding interface and index configuration.
//!
//! The store never talks to an embedding model directly; it calls
//! [`Embedder::embed_documents`] with every text a batch needs and splices
//! the returned vectors into the planned statements. Implementations can
//! wrap hosted APIs or local models; tests use deterministic mocks.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::path::{tokenize_path, PathSegment};

/// Produces one fixed-size float vector per input text.
///
/// The contract is strict: the output has exactly as many vectors as there
/// are input texts, in the same order. The executor checks lengths and
/// dimensions against [`IndexConfig::dims`] and fails the batch otherwise.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;
}

/// Adapter over a plain synchronous embedding function.
///
/// Useful when the embedding model is an in-process callable rather than an
/// async client; async implementations implement [`Embedder`] directly.
pub struct FnEmbedder {
    f: Box<dyn Fn(&[String]) -> Vec<Vec<f32>> + Send + Sync>,
}

impl FnEmbedder {
    pub fn new(f: impl Fn(&[String]) -> Vec<Vec<f32>> + Send + Sync + 'static) -> Self {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl Embedder for FnEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        Ok((self.f)(texts))
    }
}

/// Adapter over a fallible synchronous embedding function. Failures surface
/// as [`StoreError::Embedding`].
pub struct TryFnEmbedder {
    f: Box<dyn Fn(&[String]) -> Result<Vec<Vec<f32>>, String> + Send + Sync>,
}

impl TryFnEmbedder {
    pub fn new(
        f: impl Fn(&[String]) -> Result<Vec<Vec<f32>>, String> + Send + Sync + 'static,
    ) -> Self {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl Embedder for TryFnEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        (self.f)(texts).map_err(StoreError::Embedding)
    }
}

/// Configuration for indexing documents for semantic search.
#[derive(Clone)]
pub struct IndexConfig {
    /// Number of dimensions in the embedding vectors.
    pub dims: usize,
    /// Embedder used for document and query text.
    pub embedder: Arc<dyn Embedder>,
    /// Default JSON paths to extract text from. `["$"]` embeds the whole
    /// value.
    pub fields: Vec<String>,
}

impl IndexConfig {
    /// Index the whole value (`fields = ["$"]`).
    pub fn new(dims: usize, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            dims,
            embedder,
            fields: vec!["$".to_string()],
        }
    }

    /// Replace the default fields with explicit JSON paths.
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }
}

impl std::fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexConfig")
            .field("dims", &self.dims)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// A validated [`IndexConfig`] with its default fields pre-tokenized.
///
/// Built once at store construction so malformed configuration fails there
/// instead of inside a batch.
#[derive(Clone, Debug)]
pub(crate) struct StoreIndex {
    pub config: IndexConfig,
    /// `(path string, tokenized segments)` for each default field.
    pub default_fields: Vec<(String, Vec<PathSegment>)>,
}

impl StoreIndex {
    pub fn ensure(config: IndexConfig) -> Result<Self, StoreError> {
        if config.dims == 0 {
            return Err(StoreError::Config(
                "index config requires dims > 0".to_string(),
            ));
        }
        if config.fields.is_empty() {
            return Err(StoreError::Config(
                "index config requires at least one field path".to_string(),
            ));
        }
        let default_fields = config
            .fields
            .iter()
            .map(|path| Ok((path.clone(), tokenize_path(path)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(Self {
            config,
            default_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_embedder(dims: usize) -> Arc<dyn Embedder> {
        Arc::new(FnEmbedder::new(move |texts| {
            texts.iter().map(|_| vec![0.0; dims]).collect()
        }))
    }

    /// **Scenario**: the adapter keeps input/output alignment for any batch
    /// size, including the empty one.
    #[tokio::test]
    async fn fn_embedder_aligns_output() {
        let embedder = FnEmbedder::new(|texts: &[String]| {
            texts.iter().map(|t| vec![t.len() as f32]).collect()
        });
        let out = embedder
            .embed_documents(&["a".into(), "bcd".into()])
            .await
            .unwrap();
        assert_eq!(out, vec![vec![1.0], vec![3.0]]);
        assert!(embedder.embed_documents(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn try_fn_embedder_propagates_failure() {
        let embedder = TryFnEmbedder::new(|_: &[String]| Err("model offline".to_string()));
        match embedder.embed_documents(&["x".into()]).await {
            Err(StoreError::Embedding(msg)) => assert!(msg.contains("model offline")),
            other => panic!("expected Embedding error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn ensure_rejects_zero_dims_and_bad_paths() {
        let err = StoreIndex::ensure(IndexConfig::new(0, unit_embedder(4))).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));

        let config = IndexConfig::new(4, unit_embedder(4)).with_fields(vec!["a..b".into()]);
        assert!(matches!(
            StoreIndex::ensure(config),
            Err(StoreError::Config(_))
        ));

        let config = IndexConfig::new(4, unit_embedder(4)).with_fields(vec![]);
        assert!(matches!(
            StoreIndex::ensure(config),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn ensure_tokenizes_default_fields() {
        let config =
            IndexConfig::new(4, unit_embedder(4)).with_fields(vec!["$".into(), "a.b".into()]);
        let index = StoreIndex::ensure(config).unwrap();
        assert_eq!(index.default_fields.len(), 2);
        assert!(index.default_fields[0].1.is_empty());
        assert_eq!(index.default_fields[1].1.len(), 2);
    }
}
