//! ```text
//! YAML semantic model ──► ingestion::semantic_model ──► canonical text
//!                                                            │
//!                          ingestion::splitter ◄─────────────┘
//!                                 │
//!                                 ▼
//!            upstream::embeddings (EmbeddingProvider)
//!                                 │
//!                                 ▼
//!            stores::{memory, sqlite} (VectorStore)
//!
//! NL question ──► planner::QueryPlanner ──┬─► stores::nearest ──► context
//!                                         └─► upstream::llm ──► SQL
//!                                                               │
//!                               external warehouse executor ◄───┘
//! ```
//!
pub mod config;
pub mod ingestion;
pub mod planner;
pub mod stores;
pub mod types;
pub mod upstream;

pub use config::PipelineConfig;
pub use ingestion::{IngestionPipeline, SemanticModel, TextSplitter};
pub use planner::{PromptTemplate, QueryPlanner};
pub use stores::{MemoryVectorStore, SqliteVectorStore, VectorStore};
pub use types::{Chunk, IngestReport, PlannedQuery, QueryStatus, QuerysmithError, ScoredChunk};
pub use upstream::{CompletionProvider, EmbeddingProvider, RetryPolicy};
