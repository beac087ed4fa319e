//! Pipeline configuration.
//!
//! All tunables live in one validated struct that gets passed to
//! constructors explicitly. There are no process-wide singletons; components
//! that need a subset of the options borrow the config at build time.

use serde::{Deserialize, Serialize};

use crate::types::QuerysmithError;

/// Recognized configuration surface for ingestion and planning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks. Must be < `chunk_size`.
    pub chunk_overlap: usize,
    /// Number of chunks retrieved per question.
    pub retrieval_k: usize,
    /// Upper bound on assembled grounding context, in characters.
    pub context_max_chars: usize,
    /// Fixed embedding dimension enforced by the knowledge store.
    pub embedding_dimension: usize,
    /// Per-call timeout for upstream embedding/LLM requests.
    pub request_timeout_ms: u64,
    /// Retry attempts for transient upstream failures, beyond the first try.
    pub max_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        // Chunk window defaults match the original semantic-model ingestion
        // job (1000-char windows, 200-char overlap).
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            retrieval_k: 4,
            context_max_chars: 6000,
            embedding_dimension: 1536,
            request_timeout_ms: 30_000,
            max_retries: 3,
        }
    }
}

impl PipelineConfig {
    /// Resolves the configuration from `QUERYSMITH_*` environment variables,
    /// falling back to defaults for anything unset. A set-but-unparsable
    /// variable is an `InvalidConfig` error rather than a silent fallback.
    pub fn from_env() -> Result<Self, QuerysmithError> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.chunk_size = env_usize("QUERYSMITH_CHUNK_SIZE", config.chunk_size)?;
        config.chunk_overlap = env_usize("QUERYSMITH_CHUNK_OVERLAP", config.chunk_overlap)?;
        config.retrieval_k = env_usize("QUERYSMITH_RETRIEVAL_K", config.retrieval_k)?;
        config.context_max_chars =
            env_usize("QUERYSMITH_CONTEXT_MAX_CHARS", config.context_max_chars)?;
        config.embedding_dimension =
            env_usize("QUERYSMITH_EMBEDDING_DIMENSION", config.embedding_dimension)?;
        config.request_timeout_ms = env_u64("QUERYSMITH_REQUEST_TIMEOUT_MS", config.request_timeout_ms)?;
        config.max_retries = env_u64("QUERYSMITH_MAX_RETRIES", u64::from(config.max_retries))? as u32;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants every component relies on.
    pub fn validate(&self) -> Result<(), QuerysmithError> {
        if self.chunk_size == 0 {
            return Err(QuerysmithError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(QuerysmithError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.retrieval_k == 0 {
            return Err(QuerysmithError::InvalidConfig(
                "retrieval_k must be greater than zero".into(),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(QuerysmithError::InvalidConfig(
                "embedding_dimension must be greater than zero".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(QuerysmithError::InvalidConfig(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_chunking(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    #[must_use]
    pub fn with_retrieval_k(mut self, k: usize) -> Self {
        self.retrieval_k = k;
        self
    }

    #[must_use]
    pub fn with_embedding_dimension(mut self, dimension: usize) -> Self {
        self.embedding_dimension = dimension;
        self
    }

    #[must_use]
    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize, QuerysmithError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<usize>().map_err(|err| {
            QuerysmithError::InvalidConfig(format!("unable to parse {name}='{raw}': {err}"))
        }),
        Err(_) => Ok(default),
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, QuerysmithError> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<u64>().map_err(|err| {
            QuerysmithError::InvalidConfig(format!("unable to parse {name}='{raw}': {err}"))
        }),
        Err(_) => Ok(default),
    }
}
