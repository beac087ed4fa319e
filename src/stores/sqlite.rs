//! Durable knowledge store on SQLite.
//!
//! Every batch insert runs inside a single transaction so a failed
//! validation or constraint rolls the whole batch back; readers never see a
//! partially written document. The store dimension is persisted in a meta
//! table and enforced on every write and probe. Retrieval loads the stored
//! vectors and ranks them in process, which is a deliberate linear scan:
//! semantic-model corpora are small enough that an index structure would be
//! overhead, and ranking in one place keeps the tie-break rules identical
//! across backends.

use std::convert::Infallible;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::types::{Chunk, QuerysmithError, ScoredChunk};

use super::{StoredChunk, VectorStore, rank_entries};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    document_id   TEXT    NOT NULL,
    chunk_id      INTEGER NOT NULL,
    text_chunk    TEXT    NOT NULL,
    source_offset INTEGER NOT NULL,
    embedding     TEXT    NOT NULL,
    batch_id      TEXT    NOT NULL,
    ingested_at   TEXT    NOT NULL,
    PRIMARY KEY (document_id, chunk_id)
);
CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
CREATE TABLE IF NOT EXISTS store_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// SQLite-backed [`VectorStore`] on `tokio-rusqlite`.
#[derive(Clone, Debug)]
pub struct SqliteVectorStore {
    conn: Connection,
}

impl SqliteVectorStore {
    /// Opens (or creates) a store at `path`.
    ///
    /// With `Some(dimension)` the store's dimension is established up front
    /// and checked against any previously persisted value; with `None` it is
    /// pinned by the first insert.
    pub async fn open(
        path: impl AsRef<Path>,
        dimension: Option<usize>,
    ) -> Result<Self, QuerysmithError> {
        let conn = Connection::open(path).await.map_err(storage)?;

        let init: Result<(), QuerysmithError> = conn
            .call(move |conn| {
                Ok::<_, Infallible>((|| {
                    conn.execute_batch(SCHEMA).map_err(storage)?;
                    let Some(dimension) = dimension else {
                        return Ok(());
                    };
                    let persisted: Option<String> = conn
                        .query_row(
                            "SELECT value FROM store_meta WHERE key = 'dimension'",
                            [],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(storage)?;
                    let persisted = persisted
                        .map(|raw| raw.parse::<usize>().map_err(storage))
                        .transpose()?;
                    match persisted {
                        Some(existing) if existing != dimension => {
                            Err(QuerysmithError::DimensionMismatch {
                                expected: existing,
                                actual: dimension,
                            })
                        }
                        Some(_) => Ok(()),
                        None => {
                            conn.execute(
                                "INSERT INTO store_meta (key, value) VALUES ('dimension', ?1)",
                                (dimension.to_string(),),
                            )
                            .map_err(storage)?;
                            Ok(())
                        }
                    }
                })())
            })
            .await
            .map_err(storage)?;
        init?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn put_batch(
        &self,
        document_id: &str,
        batch_id: Uuid,
        entries: Vec<(Chunk, Vec<f32>)>,
    ) -> Result<(), QuerysmithError> {
        if entries.is_empty() {
            return Ok(());
        }

        let document_id = document_id.to_string();
        let batch_id = batch_id.to_string();
        let ingested_at = Utc::now().to_rfc3339();

        let result: Result<(), QuerysmithError> = self
            .conn
            .call(move |conn| {
                Ok::<_, Infallible>((|| {
                    let tx = conn.transaction().map_err(storage)?;

                    let established: Option<String> = tx
                        .query_row(
                            "SELECT value FROM store_meta WHERE key = 'dimension'",
                            [],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(storage)?;
                    let established = established
                        .map(|raw| raw.parse::<usize>().map_err(storage))
                        .transpose()?;
                    let dimension = established.unwrap_or(entries[0].1.len());

                    for (chunk, embedding) in &entries {
                        if embedding.len() != dimension {
                            return Err(QuerysmithError::DimensionMismatch {
                                expected: dimension,
                                actual: embedding.len(),
                            });
                        }

                        // Earlier inserts in this transaction are visible
                        // here, so intra-batch duplicates are caught too.
                        let duplicate: Option<i64> = tx
                            .query_row(
                                "SELECT 1 FROM chunks WHERE document_id = ?1 AND chunk_id = ?2",
                                (&document_id, chunk.id as i64),
                                |row| row.get(0),
                            )
                            .optional()
                            .map_err(storage)?;
                        if duplicate.is_some() {
                            return Err(QuerysmithError::DuplicateChunkId {
                                document_id: document_id.clone(),
                                chunk_id: chunk.id,
                            });
                        }

                        let embedding_json =
                            serde_json::to_string(embedding).map_err(storage)?;
                        tx.execute(
                            "INSERT INTO chunks \
                             (document_id, chunk_id, text_chunk, source_offset, \
                              embedding, batch_id, ingested_at) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                            (
                                &document_id,
                                chunk.id as i64,
                                &chunk.text,
                                chunk.source_offset as i64,
                                &embedding_json,
                                &batch_id,
                                &ingested_at,
                            ),
                        )
                        .map_err(storage)?;
                    }

                    if established.is_none() {
                        tx.execute(
                            "INSERT INTO store_meta (key, value) VALUES ('dimension', ?1)",
                            (dimension.to_string(),),
                        )
                        .map_err(storage)?;
                    }

                    tx.commit().map_err(storage)?;
                    Ok(())
                })())
            })
            .await
            .map_err(storage)?;
        result
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, QuerysmithError> {
        if k == 0 {
            return Err(QuerysmithError::InvalidConfig(
                "nearest() requires k > 0".into(),
            ));
        }

        let loaded: Result<(Option<usize>, Vec<StoredChunk>), QuerysmithError> = self
            .conn
            .call(move |conn| {
                Ok::<_, Infallible>((|| {
                    let dimension: Option<String> = conn
                        .query_row(
                            "SELECT value FROM store_meta WHERE key = 'dimension'",
                            [],
                            |row| row.get(0),
                        )
                        .optional()
                        .map_err(storage)?;
                    let dimension = dimension
                        .map(|raw| raw.parse::<usize>().map_err(storage))
                        .transpose()?;

                    let mut stmt = conn
                        .prepare(
                            "SELECT document_id, chunk_id, text_chunk, source_offset, \
                             embedding, batch_id, ingested_at FROM chunks",
                        )
                        .map_err(storage)?;
                    let mut rows = stmt.query([]).map_err(storage)?;

                    let mut entries = Vec::new();
                    while let Some(row) = rows.next().map_err(storage)? {
                        let chunk_id: i64 = row.get(1).map_err(storage)?;
                        let source_offset: i64 = row.get(3).map_err(storage)?;
                        let embedding_json: String = row.get(4).map_err(storage)?;
                        let batch_raw: String = row.get(5).map_err(storage)?;
                        let ingested_raw: String = row.get(6).map_err(storage)?;

                        entries.push(StoredChunk {
                            document_id: row.get(0).map_err(storage)?,
                            chunk: Chunk::new(
                                chunk_id as u64,
                                row.get::<_, String>(2).map_err(storage)?,
                                source_offset as usize,
                            ),
                            embedding: serde_json::from_str(&embedding_json)
                                .map_err(storage)?,
                            batch_id: Uuid::parse_str(&batch_raw).map_err(storage)?,
                            ingested_at: DateTime::parse_from_rfc3339(&ingested_raw)
                                .map_err(storage)?
                                .with_timezone(&Utc),
                        });
                    }
                    Ok((dimension, entries))
                })())
            })
            .await
            .map_err(storage)?;
        let (dimension, entries) = loaded?;

        if entries.is_empty() {
            return Err(QuerysmithError::EmptyStore);
        }
        let dimension = dimension.unwrap_or_default();
        if query.len() != dimension {
            return Err(QuerysmithError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        Ok(rank_entries(&entries, query, k))
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize, QuerysmithError> {
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| {
                Ok::<_, Infallible>(conn
                    .execute("DELETE FROM chunks WHERE document_id = ?1", (&document_id,))
                    .map_err(storage))
            })
            .await
            .map_err(storage)?
    }

    async fn count(&self) -> Result<usize, QuerysmithError> {
        let count: Result<i64, QuerysmithError> = self
            .conn
            .call(|conn| {
                Ok::<_, Infallible>(conn
                    .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                    .map_err(storage))
            })
            .await
            .map_err(storage)?;
        Ok(count? as usize)
    }
}

fn storage(err: impl std::fmt::Display) -> QuerysmithError {
    QuerysmithError::Storage(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(id: u64, text: &str) -> Chunk {
        Chunk::new(id, text, 0)
    }

    #[tokio::test]
    async fn round_trips_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.sqlite");

        {
            let store = SqliteVectorStore::open(&path, None).await.unwrap();
            store
                .put("model", chunk(0, "payments table"), vec![0.0, 1.0])
                .await
                .unwrap();
        }

        let store = SqliteVectorStore::open(&path, None).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        let hits = store.nearest(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].chunk.text, "payments table");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn failed_batch_rolls_back_completely() {
        let dir = tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("store.sqlite"), None)
            .await
            .unwrap();

        let err = store
            .put_batch(
                "model",
                Uuid::new_v4(),
                vec![
                    (chunk(0, "fits"), vec![1.0, 0.0]),
                    (chunk(1, "wrong width"), vec![1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, QuerysmithError::DimensionMismatch { .. }));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_ids_rejected_across_and_within_batches() {
        let dir = tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("store.sqlite"), None)
            .await
            .unwrap();

        store
            .put("model", chunk(0, "first"), vec![1.0, 0.0])
            .await
            .unwrap();

        let err = store
            .put("model", chunk(0, "again"), vec![0.0, 1.0])
            .await
            .unwrap_err();
        assert!(matches!(err, QuerysmithError::DuplicateChunkId { .. }));

        let err = store
            .put_batch(
                "other",
                Uuid::new_v4(),
                vec![
                    (chunk(7, "a"), vec![1.0, 0.0]),
                    (chunk(7, "b"), vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QuerysmithError::DuplicateChunkId { .. }));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn configured_dimension_is_enforced_and_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.sqlite");

        let store = SqliteVectorStore::open(&path, Some(3)).await.unwrap();
        let err = store
            .put("model", chunk(0, "narrow"), vec![1.0])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QuerysmithError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));

        // Reopening with a conflicting dimension is rejected.
        drop(store);
        let err = SqliteVectorStore::open(&path, Some(4)).await.unwrap_err();
        assert!(matches!(err, QuerysmithError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn nearest_is_ranked_and_tie_broken() {
        let dir = tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("store.sqlite"), None)
            .await
            .unwrap();

        store
            .put_batch(
                "model",
                Uuid::new_v4(),
                vec![
                    (chunk(3, "tie b"), vec![1.0, 0.0]),
                    (chunk(1, "tie a"), vec![1.0, 0.0]),
                    (chunk(2, "far"), vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.nearest(&[1.0, 0.0], 3).await.unwrap();
        let ids: Vec<u64> = hits.iter().map(|hit| hit.chunk.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[tokio::test]
    async fn empty_store_and_delete_idempotence() {
        let dir = tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("store.sqlite"), None)
            .await
            .unwrap();

        let err = store.nearest(&[1.0], 1).await.unwrap_err();
        assert!(matches!(err, QuerysmithError::EmptyStore));

        assert_eq!(store.delete_document("missing").await.unwrap(), 0);

        store
            .put("model", chunk(0, "a"), vec![1.0, 0.0])
            .await
            .unwrap();
        assert_eq!(store.delete_document("model").await.unwrap(), 1);
        assert_eq!(store.delete_document("model").await.unwrap(), 0);
    }
}
