//! Core data types and the crate-wide error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unified error type for ingestion, storage, and planning.
///
/// Variants split into three classes:
///
/// * caller errors (`InvalidConfig`, `InvalidDocument`) — fatal to the call,
///   never retried;
/// * transient upstream failures (`UpstreamError`, `UpstreamTimeout`,
///   `RateLimited`) — eligible for bounded backoff via
///   [`is_retryable`](Self::is_retryable);
/// * data-integrity and execution failures — surfaced to the caller, never
///   silently dropped.
#[derive(Debug, thiserror::Error)]
pub enum QuerysmithError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("upstream service failure: {0}")]
    UpstreamError(String),

    #[error("upstream call '{operation}' timed out after {timeout_ms} ms")]
    UpstreamTimeout { operation: String, timeout_ms: u64 },

    #[error("upstream rate limit: {0}")]
    RateLimited(String),

    #[error("embedding dimension {actual} does not match store dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("chunk {chunk_id} already stored for document '{document_id}'")]
    DuplicateChunkId { document_id: String, chunk_id: u64 },

    #[error("knowledge store holds no entries")]
    EmptyStore,

    #[error("generated query rejected as syntactically invalid: {reason}\n--- query ---\n{query}")]
    QuerySyntax { reason: String, query: String },

    #[error("generated query failed during execution: {reason}\n--- query ---\n{query}")]
    Execution { reason: String, query: String },

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("io failure: {0}")]
    Io(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}

impl QuerysmithError {
    /// Returns `true` for transient upstream failures that a caller may
    /// retry with backoff. Everything else is fatal to the call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QuerysmithError::UpstreamError(_)
                | QuerysmithError::UpstreamTimeout { .. }
                | QuerysmithError::RateLimited(_)
        )
    }

    /// Wraps an executor syntax rejection, attaching the offending SQL.
    pub fn query_syntax(reason: impl Into<String>, query: impl Into<String>) -> Self {
        QuerysmithError::QuerySyntax {
            reason: reason.into(),
            query: query.into(),
        }
    }

    /// Wraps an executor runtime failure, attaching the offending SQL.
    pub fn execution(reason: impl Into<String>, query: impl Into<String>) -> Self {
        QuerysmithError::Execution {
            reason: reason.into(),
            query: query.into(),
        }
    }
}

impl From<std::io::Error> for QuerysmithError {
    fn from(err: std::io::Error) -> Self {
        QuerysmithError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for QuerysmithError {
    fn from(err: reqwest::Error) -> Self {
        QuerysmithError::UpstreamError(err.to_string())
    }
}

/// A bounded contiguous slice of a source document.
///
/// Immutable once created by the splitter: `id` is the zero-based sequence
/// order within one document's split, `source_offset` the byte offset of the
/// chunk's first character in the original document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u64,
    pub text: String,
    pub source_offset: usize,
}

impl Chunk {
    pub fn new(id: u64, text: impl Into<String>, source_offset: usize) -> Self {
        Self {
            id,
            text: text.into(),
            source_offset,
        }
    }
}

/// A retrieval hit: a stored chunk together with its similarity score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub document_id: String,
    pub chunk: Chunk,
    pub score: f32,
}

/// Lifecycle state of a planned query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    #[default]
    Pending,
    Succeeded,
    Failed { reason: String },
}

impl QueryStatus {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, QueryStatus::Succeeded)
    }
}

/// Outcome of one `QueryPlanner::answer` call. Created per request and
/// discarded after the response; never persisted by the planner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlannedQuery {
    pub natural_language: String,
    /// Retrieved grounding chunks, most relevant first.
    pub retrieved: Vec<ScoredChunk>,
    pub generated_sql: String,
    pub status: QueryStatus,
}

/// Summary of one ingestion run for a single document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestReport {
    pub document_id: String,
    pub batch_id: Uuid,
    pub chunks_written: usize,
    /// Chunks dropped before embedding (whitespace-only windows).
    pub skipped: usize,
    pub ingested_at: DateTime<Utc>,
}
