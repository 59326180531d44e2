//! Vector store contract and in-memory reference implementation.
//!
//! Vectors are unit-norm; distance is cosine distance in [0, 2]. The
//! in-memory store computes similarity by dot product (valid for
//! unit-norm vectors) and is intended for tests and single-process
//! deployments — a real ANN index implements the same trait.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::{CostwiseError, Result};

/// One search result: entry id, cosine distance, and the metadata stored
/// at insert time.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub distance: f64,
    pub metadata: serde_json::Value,
}

/// ANN index contract used by the semantic cache.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&self, id: &str, vector: Vec<f32>, metadata: serde_json::Value) -> Result<()>;

    /// Nearest neighbors of `query` within `max_distance`, closest first,
    /// at most `top_k` results.
    async fn search(&self, query: &[f32], top_k: usize, max_distance: f64)
        -> Result<Vec<SearchHit>>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Brute-force in-memory vector store.
pub struct InMemoryVectorStore {
    dimension: usize,
    inner: RwLock<HashMap<String, (Vec<f32>, serde_json::Value)>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("vector store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&self, id: &str, vector: Vec<f32>, metadata: serde_json::Value) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(CostwiseError::Cache(format!(
                "vector dimension {} does not match store dimension {}",
                vector.len(),
                self.dimension
            )));
        }
        self.inner
            .write()
            .expect("vector store lock poisoned")
            .insert(id.to_string(), (vector, metadata));
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        max_distance: f64,
    ) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(CostwiseError::Cache(format!(
                "query dimension {} does not match store dimension {}",
                query.len(),
                self.dimension
            )));
        }
        let inner = self.inner.read().expect("vector store lock poisoned");
        let mut hits: Vec<SearchHit> = inner
            .iter()
            .map(|(id, (vector, metadata))| {
                // Unit-norm vectors: cosine similarity is the dot product.
                let dot: f64 = query
                    .iter()
                    .zip(vector.iter())
                    .map(|(a, b)| f64::from(*a) * f64::from(*b))
                    .sum();
                SearchHit {
                    id: id.clone(),
                    distance: 1.0 - dot,
                    metadata: metadata.clone(),
                }
            })
            .filter(|hit| hit.distance <= max_distance)
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner
            .write()
            .expect("vector store lock poisoned")
            .remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.inner
            .write()
            .expect("vector store lock poisoned")
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn search_orders_by_distance() {
        let store = InMemoryVectorStore::new(2);
        store.add("a", vec![1.0, 0.0], json!({})).await.unwrap();
        store
            .add("b", vec![0.707, 0.707], json!({}))
            .await
            .unwrap();
        store.add("c", vec![0.0, 1.0], json!({})).await.unwrap();

        let hits = store.search(&[1.0, 0.0], 10, 2.0).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[1].id, "b");
    }

    #[tokio::test]
    async fn max_distance_filters() {
        let store = InMemoryVectorStore::new(2);
        store.add("near", vec![1.0, 0.0], json!({})).await.unwrap();
        store.add("far", vec![0.0, 1.0], json!({})).await.unwrap();

        let hits = store.search(&[1.0, 0.0], 10, 0.15).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "near");
    }

    #[tokio::test]
    async fn dimension_mismatch_is_an_error() {
        let store = InMemoryVectorStore::new(3);
        assert!(store.add("x", vec![1.0], json!({})).await.is_err());
        assert!(store.search(&[1.0], 5, 1.0).await.is_err());
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let store = InMemoryVectorStore::new(2);
        store.add("a", vec![1.0, 0.0], json!({})).await.unwrap();
        store.add("b", vec![0.0, 1.0], json!({})).await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.len(), 1);
        store.clear().await.unwrap();
        assert!(store.is_empty());
    }
}
