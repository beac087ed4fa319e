//! End-to-end ingestion: split, embed, persist.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::stores::VectorStore;
use crate::types::{IngestReport, QuerysmithError};
use crate::upstream::{EmbeddingProvider, RetryPolicy};

use super::semantic_model::SemanticModel;
use super::splitter::TextSplitter;

/// Drives a document through the ingestion path.
///
/// Whitespace-only windows are skipped before embedding (they carry no
/// retrievable signal) and counted in the report. The store write is a
/// single atomic batch: a failure anywhere leaves no chunk of the document
/// visible to readers, so a retried ingestion starts clean.
pub struct IngestionPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    splitter: TextSplitter,
    retry: RetryPolicy,
}

impl IngestionPipeline {
    pub fn new(
        config: &PipelineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Self, QuerysmithError> {
        config.validate()?;
        Ok(Self {
            embedder,
            store,
            splitter: TextSplitter::from_config(config)?,
            retry: RetryPolicy::from_config(config),
        })
    }

    /// Ingests raw text under the given document id.
    pub async fn ingest_text(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<IngestReport, QuerysmithError> {
        let chunks = self.splitter.split(text);
        let total = chunks.len();

        let (kept, skipped): (Vec<_>, Vec<_>) = chunks
            .into_iter()
            .partition(|chunk| !chunk.text.trim().is_empty());
        if !skipped.is_empty() {
            warn!(
                document_id,
                skipped = skipped.len(),
                "dropping whitespace-only chunks before embedding"
            );
        }

        let batch_id = Uuid::new_v4();
        if kept.is_empty() {
            info!(document_id, %batch_id, "document produced no embeddable chunks");
            return Ok(IngestReport {
                document_id: document_id.to_string(),
                batch_id,
                chunks_written: 0,
                skipped: skipped.len(),
                ingested_at: chrono::Utc::now(),
            });
        }

        let texts: Vec<String> = kept.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self
            .retry
            .run("embed_batch", || self.embedder.embed_batch(&texts))
            .await?;
        if vectors.len() != kept.len() {
            return Err(QuerysmithError::UpstreamError(format!(
                "embedding service returned {} vectors for {} chunks",
                vectors.len(),
                kept.len()
            )));
        }

        let entries: Vec<_> = kept.into_iter().zip(vectors).collect();
        let chunks_written = entries.len();
        self.store
            .put_batch(document_id, batch_id, entries)
            .await?;

        let report = IngestReport {
            document_id: document_id.to_string(),
            batch_id,
            chunks_written,
            skipped: total - chunks_written,
            ingested_at: chrono::Utc::now(),
        };
        info!(
            document_id,
            %batch_id,
            chunks_written,
            skipped = report.skipped,
            "document ingested"
        );
        Ok(report)
    }

    /// Ingests a semantic model via its canonical YAML rendering.
    pub async fn ingest_semantic_model(
        &self,
        model: &SemanticModel,
    ) -> Result<IngestReport, QuerysmithError> {
        let text = model.canonical_text()?;
        self.ingest_text(model.document_id(), &text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryVectorStore;
    use crate::upstream::MockEmbeddingProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_config() -> PipelineConfig {
        PipelineConfig::default()
            .with_chunking(40, 10)
            .with_embedding_dimension(MockEmbeddingProvider::DEFAULT_DIMENSION)
    }

    fn pipeline(store: Arc<MemoryVectorStore>) -> IngestionPipeline {
        IngestionPipeline::new(
            &test_config(),
            Arc::new(MockEmbeddingProvider::new()),
            store,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn ingests_and_makes_chunks_retrievable() {
        let store = Arc::new(MemoryVectorStore::new());
        let report = pipeline(store.clone())
            .ingest_text(
                "payments",
                "The payments table records one row per attempted charge, \
                 with status transitions from pending to settled or failed.",
            )
            .await
            .unwrap();

        assert!(report.chunks_written > 1);
        assert_eq!(report.document_id, "payments");
        assert_eq!(
            store.count().await.unwrap(),
            report.chunks_written
        );
    }

    #[tokio::test]
    async fn empty_document_reports_zero_chunks() {
        let store = Arc::new(MemoryVectorStore::new());
        let report = pipeline(store.clone())
            .ingest_text("empty", "")
            .await
            .unwrap();
        assert_eq!(report.chunks_written, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn whitespace_only_document_is_skipped_not_stored() {
        let store = Arc::new(MemoryVectorStore::new());
        let report = pipeline(store.clone())
            .ingest_text("blank", "   \n\n   \t  ")
            .await
            .unwrap();
        assert_eq!(report.chunks_written, 0);
        assert!(report.skipped > 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reingest_without_delete_is_rejected_and_clean() {
        let store = Arc::new(MemoryVectorStore::new());
        let pipeline = pipeline(store.clone());
        let text = "status is one of pending, settled, failed; amounts in minor units.";

        let report = pipeline.ingest_text("payments", text).await.unwrap();
        let written = report.chunks_written;

        let err = pipeline.ingest_text("payments", text).await.unwrap_err();
        assert!(matches!(err, QuerysmithError::DuplicateChunkId { .. }));
        assert_eq!(store.count().await.unwrap(), written);

        store.delete_document("payments").await.unwrap();
        pipeline.ingest_text("payments", text).await.unwrap();
        assert_eq!(store.count().await.unwrap(), written);
    }

    struct CountMismatchEmbedder;

    #[async_trait]
    impl crate::upstream::EmbeddingProvider for CountMismatchEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, QuerysmithError> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn embedding_count_mismatch_writes_nothing() {
        let store = Arc::new(MemoryVectorStore::new());
        let pipeline = IngestionPipeline::new(
            &test_config(),
            Arc::new(CountMismatchEmbedder),
            store.clone(),
        )
        .unwrap();

        let err = pipeline
            .ingest_text("payments", "enough text to produce at least two chunks here")
            .await
            .unwrap_err();
        assert!(matches!(err, QuerysmithError::UpstreamError(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    struct FlakyEmbedder {
        failures: AtomicU32,
        inner: MockEmbeddingProvider,
    }

    #[async_trait]
    impl crate::upstream::EmbeddingProvider for FlakyEmbedder {
        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<Vec<f32>>, QuerysmithError> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            }).is_ok()
            {
                return Err(QuerysmithError::UpstreamError("transient".into()));
            }
            self.inner.embed_batch(texts).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    #[tokio::test]
    async fn transient_embedding_failures_are_retried() {
        let store = Arc::new(MemoryVectorStore::new());
        let pipeline = IngestionPipeline::new(
            &test_config(),
            Arc::new(FlakyEmbedder {
                failures: AtomicU32::new(2),
                inner: MockEmbeddingProvider::new(),
            }),
            store.clone(),
        )
        .unwrap();

        let report = pipeline
            .ingest_text("payments", "short but non-empty document")
            .await
            .unwrap();
        assert!(report.chunks_written > 0);
    }

    #[tokio::test]
    async fn semantic_model_round_trip() {
        let model = SemanticModel::from_yaml_str(
            "payments",
            "tables:\n  - name: payments\n    columns: [payment_id, status, amount]\n",
        )
        .unwrap();

        let store = Arc::new(MemoryVectorStore::new());
        let report = pipeline(store.clone())
            .ingest_semantic_model(&model)
            .await
            .unwrap();
        assert_eq!(report.document_id, "payments");
        assert!(report.chunks_written > 0);
    }
}
