//! In-memory knowledge store.
//!
//! Suited to tests and single-process pipelines. All mutation happens under
//! one write lock with validate-then-commit ordering, so a failed batch
//! leaves nothing behind and readers always observe a consistent snapshot.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::types::{Chunk, QuerysmithError, ScoredChunk};

use super::{StoredChunk, VectorStore, rank_entries};

#[derive(Debug, Default)]
struct Inner {
    dimension: Option<usize>,
    entries: Vec<StoredChunk>,
    keys: HashSet<(String, u64)>,
}

/// Process-local [`VectorStore`] backed by a `parking_lot::RwLock`.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    inner: RwLock<Inner>,
}

impl MemoryVectorStore {
    /// Creates a store whose dimension is pinned by the first insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a pre-established dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                dimension: Some(dimension),
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn put_batch(
        &self,
        document_id: &str,
        batch_id: Uuid,
        entries: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<(), QuerysmithError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut inner = self.inner.write();

        // Validate the whole batch before touching state.
        let dimension = inner.dimension.unwrap_or(entries[0].1.len());
        let mut batch_keys = HashSet::new();
        for (chunk, embedding) in &entries {
            if embedding.len() != dimension {
                return Err(QuerysmithError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            let key = (document_id.to_string(), chunk.id);
            if inner.keys.contains(&key) || !batch_keys.insert(key) {
                return Err(QuerysmithError::DuplicateChunkId {
                    document_id: document_id.to_string(),
                    chunk_id: chunk.id,
                });
            }
        }

        let ingested_at = Utc::now();
        inner.dimension = Some(dimension);
        for (chunk, embedding) in entries {
            inner.keys.insert((document_id.to_string(), chunk.id));
            inner.entries.push(StoredChunk {
                document_id: document_id.to_string(),
                chunk,
                embedding,
                batch_id,
                ingested_at,
            });
        }
        Ok(())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, QuerysmithError> {
        if k == 0 {
            return Err(QuerysmithError::InvalidConfig(
                "nearest() requires k > 0".into(),
            ));
        }

        let inner = self.inner.read();
        if inner.entries.is_empty() {
            return Err(QuerysmithError::EmptyStore);
        }
        let dimension = inner.dimension.unwrap_or_default();
        if query.len() != dimension {
            return Err(QuerysmithError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        Ok(rank_entries(&inner.entries, query, k))
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, QuerysmithError> {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        inner.entries.retain(|entry| entry.document_id != document_id);
        inner.keys.retain(|(doc, _)| doc != document_id);
        Ok(before - inner.entries.len())
    }

    async fn count(&self) -> Result<usize, QuerysmithError> {
        Ok(self.inner.read().entries.len())
    }
}
