//! Ingestion utilities for turning semantic-model documents into an
//! embedded knowledge base.
//!
//! * [`semantic_model`] — YAML loading and canonical rendering.
//! * [`splitter`] — deterministic overlapping-window chunking.
//! * [`pipeline`] — orchestration of split → embed → store.

pub mod pipeline;
pub mod semantic_model;
pub mod splitter;

pub use pipeline::IngestionPipeline;
pub use semantic_model::SemanticModel;
pub use splitter::TextSplitter;
