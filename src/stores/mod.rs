//! Knowledge-store backends for chunks and their embeddings.
//!
//! The [`VectorStore`] trait abstracts over storage implementations so the
//! ingestion pipeline and the planner can work against any backend:
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │ VectorStore trait│
//!                  │  (async CRUD +   │
//!                  │   nearest())     │
//!                  └────────┬─────────┘
//!                           │
//!               ┌───────────┴───────────┐
//!               ▼                       ▼
//!       ┌──────────────┐       ┌───────────────┐
//!       │   Memory     │       │    SQLite     │
//!       │ (snapshot    │       │ (tokio-       │
//!       │  reads)      │       │  rusqlite)    │
//!       └──────────────┘       └───────────────┘
//! ```
//!
//! Both backends enforce the same invariants: every stored embedding has the
//! store's fixed dimension, `(document_id, chunk_id)` is unique, writes are
//! all-or-nothing, and `nearest` ranks by descending cosine similarity with
//! ascending `(document_id, chunk_id)` tie-breaks for determinism.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Chunk, QuerysmithError, ScoredChunk};

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// A persisted (chunk, embedding) pair with its ingestion metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredChunk {
    pub document_id: String,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub batch_id: Uuid,
    pub ingested_at: DateTime<Utc>,
}

/// Unified interface for knowledge-store backends.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Stores one chunk with its embedding under a fresh batch id.
    ///
    /// Fails with `DimensionMismatch` when the vector's length differs from
    /// the store's established dimension and with `DuplicateChunkId` when
    /// `(document_id, chunk_id)` already exists. Failure leaves the store
    /// unchanged.
    async fn put(
        &self,
        document_id: &str,
        chunk: Chunk,
        embedding: Vec<f32>,
    ) -> Result<(), QuerysmithError> {
        self.put_batch(document_id, Uuid::new_v4(), vec![(chunk, embedding)])
            .await
    }

    /// Stores a batch of chunks atomically: either every entry becomes
    /// visible or none does.
    async fn put_batch(
        &self,
        document_id: &str,
        batch_id: Uuid,
        entries: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<(), QuerysmithError>;

    /// Returns up to `k` chunks ranked by descending cosine similarity to
    /// `query`, ties broken by ascending `(document_id, chunk_id)`.
    ///
    /// Fails with `EmptyStore` when no entries exist, `InvalidConfig` when
    /// `k == 0`, and `DimensionMismatch` for a wrong-length probe. Returns
    /// fewer than `k` results only when the store holds fewer entries.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, QuerysmithError>;

    /// Removes all chunks for a document, returning how many were deleted.
    /// Idempotent: deleting an absent document succeeds with 0.
    async fn delete_document(&self, document_id: &str) -> Result<usize, QuerysmithError>;

    /// Total number of stored chunks.
    async fn count(&self) -> Result<usize, QuerysmithError>;
}

/// Cosine similarity with f64 accumulation. Zero-norm vectors score 0.0 so
/// degenerate embeddings rank last deterministically instead of erroring.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x = f64::from(x);
        let y = f64::from(y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        (dot / denom) as f32
    }
}

/// Scores and ranks stored entries against a probe vector.
pub(crate) fn rank_entries(
    entries: &[StoredChunk],
    query: &[f32],
    k: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<(f32, &StoredChunk)> = entries
        .iter()
        .map(|entry| (cosine_similarity(&entry.embedding, query), entry))
        .collect();

    scored.sort_by(|(score_a, entry_a), (score_b, entry_b)| {
        score_b
            .total_cmp(score_a)
            .then_with(|| entry_a.document_id.cmp(&entry_b.document_id))
            .then_with(|| entry_a.chunk.id.cmp(&entry_b.chunk.id))
    });

    scored
        .into_iter()
        .take(k)
        .map(|(score, entry)| ScoredChunk {
            document_id: entry.document_id.clone(),
            chunk: entry.chunk.clone(),
            score,
        })
        .collect()
}
