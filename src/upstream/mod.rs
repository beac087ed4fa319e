//! External service capabilities.
//!
//! * [`embeddings`] — the embedding capability (trait + HTTP + mock).
//! * [`llm`] — the completion capability (trait + HTTP + canned).
//! * [`retry`] — per-call timeouts and bounded exponential backoff.

pub mod embeddings;
pub mod llm;
pub mod retry;

pub use embeddings::{EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider};
pub use llm::{CannedCompletionProvider, CompletionProvider, HttpCompletionProvider};
pub use retry::RetryPolicy;
