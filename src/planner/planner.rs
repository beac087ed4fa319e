//! Retrieval-augmented natural-language-to-SQL planning.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::stores::VectorStore;
use crate::types::{PlannedQuery, QueryStatus, QuerysmithError, ScoredChunk};
use crate::upstream::{CompletionProvider, EmbeddingProvider, RetryPolicy};

use super::prompt::PromptTemplate;

/// Plans SQL for natural-language questions by grounding an LLM call in
/// chunks retrieved from the knowledge store.
///
/// The planner holds no per-request state: each [`answer`](Self::answer)
/// call embeds the question, retrieves, prompts, and classifies the result.
/// It never executes the generated SQL; execution belongs to an external
/// warehouse collaborator.
pub struct QueryPlanner {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn CompletionProvider>,
    store: Arc<dyn VectorStore>,
    template: PromptTemplate,
    retry: RetryPolicy,
    context_max_chars: usize,
    max_completion_tokens: u32,
    sql_shape: Regex,
}

impl QueryPlanner {
    pub fn builder() -> QueryPlannerBuilder {
        QueryPlannerBuilder::default()
    }

    /// Answers a question with a planned (not executed) SQL query.
    ///
    /// Retrieval ranking is deterministic; the generated text is only as
    /// reproducible as the completion provider. Transient upstream failures
    /// are retried per the configured policy and surface as errors once the
    /// budget is exhausted; an implausible completion is not an error but a
    /// `Failed` status with the reason preserved.
    pub async fn answer(
        &self,
        question: &str,
        schema_description: &str,
        k: usize,
    ) -> Result<PlannedQuery, QuerysmithError> {
        if question.trim().is_empty() {
            return Err(QuerysmithError::InvalidConfig(
                "question must not be empty".into(),
            ));
        }
        if k == 0 {
            return Err(QuerysmithError::InvalidConfig(
                "retrieval k must be greater than zero".into(),
            ));
        }

        let question_vector = self
            .retry
            .run("embed_question", || self.embedder.embed(question))
            .await?;

        let retrieved = self.store.nearest(&question_vector, k).await?;
        let context = self.assemble_context(&retrieved);
        debug!(
            retrieved = retrieved.len(),
            context_chars = context.len(),
            template = self.template.version(),
            "assembled grounding context"
        );

        let prompt = self.template.render(question, schema_description, &context);
        let completion = self
            .retry
            .run("complete_sql", || {
                self.llm.complete(&prompt, self.max_completion_tokens)
            })
            .await?;

        let generated_sql = completion.trim().to_string();
        let status = self.classify(&generated_sql);
        info!(
            question,
            status = ?status,
            template = self.template.version(),
            "planned query"
        );

        Ok(PlannedQuery {
            natural_language: question.to_string(),
            retrieved,
            generated_sql,
            status,
        })
    }

    /// Concatenates retrieved chunk texts in ranked order, keeping whole
    /// chunks and dropping the lowest-ranked ones once the configured
    /// context budget is reached.
    fn assemble_context(&self, retrieved: &[ScoredChunk]) -> String {
        let mut context = String::new();
        for hit in retrieved {
            let text = hit.chunk.text.as_str();
            let needed = text.len() + if context.is_empty() { 0 } else { 2 };
            if context.len() + needed > self.context_max_chars {
                break;
            }
            if !context.is_empty() {
                context.push_str("\n\n");
            }
            context.push_str(text);
        }
        context
    }

    fn classify(&self, generated_sql: &str) -> QueryStatus {
        if generated_sql.is_empty() {
            return QueryStatus::Failed {
                reason: "completion provider returned an empty response".into(),
            };
        }
        if self.sql_shape.is_match(generated_sql) {
            QueryStatus::Succeeded
        } else {
            QueryStatus::Failed {
                reason: format!(
                    "completion does not look like SQL (expected a statement \
                     starting with SELECT or WITH): {}",
                    first_line(generated_sql)
                ),
            }
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Coarse plausibility grammar: after optional whitespace and `--` or
/// `/* */` comments, the statement must open with SELECT or WITH.
fn sql_shape_regex() -> Regex {
    Regex::new(r"(?is)^\s*(?:--[^\n]*\n\s*|/\*.*?\*/\s*)*(?:select|with)\b")
        .expect("sql shape pattern is valid")
}

/// Builder for [`QueryPlanner`] instances.
#[derive(Default)]
pub struct QueryPlannerBuilder {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    llm: Option<Arc<dyn CompletionProvider>>,
    store: Option<Arc<dyn VectorStore>>,
    template: Option<PromptTemplate>,
    config: Option<PipelineConfig>,
    max_completion_tokens: Option<u32>,
}

impl QueryPlannerBuilder {
    pub const DEFAULT_MAX_COMPLETION_TOKENS: u32 = 512;

    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    #[must_use]
    pub fn llm(mut self, llm: Arc<dyn CompletionProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the default [`PromptTemplate::v1`] template.
    #[must_use]
    pub fn template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn max_completion_tokens(mut self, max_tokens: u32) -> Self {
        self.max_completion_tokens = Some(max_tokens);
        self
    }

    /// Builds the planner.
    ///
    /// # Panics
    ///
    /// Panics when the embedder, llm, or store was not provided. Use
    /// [`try_build`](Self::try_build) for a fallible variant.
    pub fn build(self) -> QueryPlanner {
        self.try_build()
            .expect("QueryPlannerBuilder requires an embedder, an llm, and a store")
    }

    /// Builds the planner, returning `None` when a required part is missing.
    pub fn try_build(self) -> Option<QueryPlanner> {
        let config = self.config.unwrap_or_default();
        Some(QueryPlanner {
            embedder: self.embedder?,
            llm: self.llm?,
            store: self.store?,
            template: self.template.unwrap_or_default(),
            retry: RetryPolicy::from_config(&config),
            context_max_chars: config.context_max_chars,
            max_completion_tokens: self
                .max_completion_tokens
                .unwrap_or(Self::DEFAULT_MAX_COMPLETION_TOKENS),
            sql_shape: sql_shape_regex(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryVectorStore;
    use crate::types::Chunk;
    use crate::upstream::{CannedCompletionProvider, MockEmbeddingProvider};

    const SCHEMA: &str = "payments(payment_id, status, amount, created_at)";

    async fn seeded_store(embedder: &MockEmbeddingProvider) -> Arc<MemoryVectorStore> {
        let store = Arc::new(MemoryVectorStore::new());
        let texts = [
            "payments.status is one of pending, settled, failed",
            "payments.amount is the gross amount in minor units",
            "payments.created_at is the settlement timestamp in UTC",
        ];
        for (id, text) in texts.iter().enumerate() {
            let vector = embedder.embed(text).await.unwrap();
            store
                .put("payments", Chunk::new(id as u64, *text, 0), vector)
                .await
                .unwrap();
        }
        store
    }

    fn planner_with(
        embedder: MockEmbeddingProvider,
        store: Arc<MemoryVectorStore>,
        response: &str,
    ) -> QueryPlanner {
        QueryPlanner::builder()
            .embedder(Arc::new(embedder))
            .llm(Arc::new(CannedCompletionProvider::new(response)))
            .store(store)
            .build()
    }

    #[tokio::test]
    async fn canned_sql_answer_succeeds() {
        let embedder = MockEmbeddingProvider::new();
        let store = seeded_store(&embedder).await;
        let planner = planner_with(
            embedder,
            store,
            "SELECT COUNT(*) FROM payments WHERE status = 'failed'",
        );

        let planned = planner
            .answer("How many payments failed last month?", SCHEMA, 3)
            .await
            .unwrap();

        assert!(planned.status.is_succeeded());
        assert!(planned.generated_sql.starts_with("SELECT"));
        assert_eq!(planned.retrieved.len(), 3);
    }

    #[tokio::test]
    async fn non_sql_completion_fails_with_reason() {
        let embedder = MockEmbeddingProvider::new();
        let store = seeded_store(&embedder).await;
        let planner = planner_with(embedder, store, "UNANSWERABLE");

        let planned = planner.answer("What is love?", SCHEMA, 2).await.unwrap();
        match planned.status {
            QueryStatus::Failed { reason } => assert!(reason.contains("UNANSWERABLE")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_completion_fails() {
        let embedder = MockEmbeddingProvider::new();
        let store = seeded_store(&embedder).await;
        let planner = planner_with(embedder, store, "   ");

        let planned = planner.answer("anything", SCHEMA, 1).await.unwrap();
        assert!(matches!(planned.status, QueryStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn empty_store_surfaces_as_error() {
        let planner = planner_with(
            MockEmbeddingProvider::new(),
            Arc::new(MemoryVectorStore::new()),
            "SELECT 1",
        );
        let err = planner.answer("anything", SCHEMA, 2).await.unwrap_err();
        assert!(matches!(err, QuerysmithError::EmptyStore));
    }

    #[tokio::test]
    async fn zero_k_is_a_caller_error() {
        let embedder = MockEmbeddingProvider::new();
        let store = seeded_store(&embedder).await;
        let planner = planner_with(embedder, store, "SELECT 1");
        let err = planner.answer("anything", SCHEMA, 0).await.unwrap_err();
        assert!(matches!(err, QuerysmithError::InvalidConfig(_)));
    }

    #[test]
    fn sql_shape_accepts_comments_and_ctes() {
        let shape = sql_shape_regex();
        assert!(shape.is_match("SELECT 1"));
        assert!(shape.is_match("  select *\nfrom payments"));
        assert!(shape.is_match("-- monthly failures\nSELECT COUNT(*) FROM payments"));
        assert!(shape.is_match("/* cte */ WITH failed AS (SELECT 1) SELECT * FROM failed"));
        assert!(!shape.is_match("DROP TABLE payments"));
        assert!(!shape.is_match("Sure! Here is the SQL you asked for:"));
    }

    #[test]
    fn context_truncation_drops_lowest_ranked_first() {
        let planner = QueryPlanner::builder()
            .embedder(Arc::new(MockEmbeddingProvider::new()))
            .llm(Arc::new(CannedCompletionProvider::new("SELECT 1")))
            .store(Arc::new(MemoryVectorStore::new()))
            .config(PipelineConfig {
                context_max_chars: 25,
                ..Default::default()
            })
            .build();

        let hit = |id: u64, text: &str, score: f32| ScoredChunk {
            document_id: "payments".into(),
            chunk: Chunk::new(id, text, 0),
            score,
        };
        let retrieved = vec![
            hit(0, "ten chars!", 0.9),
            hit(1, "ten more!!", 0.5),
            hit(2, "does not fit anymore", 0.1),
        ];

        let context = planner.assemble_context(&retrieved);
        assert_eq!(context, "ten chars!\n\nten more!!");
    }

    #[test]
    fn builder_requires_collaborators() {
        assert!(QueryPlanner::builder().try_build().is_none());
    }
}
