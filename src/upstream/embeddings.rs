//! Embedding providers.
//!
//! The [`EmbeddingProvider`] trait is the seam between the pipeline and any
//! embedding service. Two implementations ship with the crate: an
//! OpenAI-compatible HTTP provider and a deterministic mock for tests and
//! offline runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::QuerysmithError;

/// Maps text to fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts, returning one vector per input in the same
    /// order. Fails with `UpstreamError` on service failure; callers wrap
    /// the call with [`RetryPolicy`](crate::upstream::retry::RetryPolicy)
    /// for timeout and backoff handling.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QuerysmithError>;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, QuerysmithError> {
        let mut vectors = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        vectors.pop().ok_or_else(|| {
            QuerysmithError::UpstreamError("embedding service returned no vector".into())
        })
    }

    /// Dimension of the vectors this provider produces.
    fn dimension(&self) -> usize;
}

/// Deterministic hash-seeded embeddings for tests and offline pipelines.
///
/// Identical text always yields an identical unit-length vector; different
/// texts yield different vectors with overwhelming probability.
#[derive(Clone, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub const DEFAULT_DIMENSION: usize = 8;

    pub fn new() -> Self {
        Self {
            dimension: Self::DEFAULT_DIMENSION,
        }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let seed = fnv1a(text.as_bytes());
        let mut values: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let bits = splitmix64(seed ^ (i as u64).wrapping_mul(0x9E3779B97F4A7C15));
                // Map to [-1, 1).
                ((bits >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0) as f32
            })
            .collect();

        let norm = values.iter().map(|v| f64::from(*v).powi(2)).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut values {
                *value = (f64::from(*value) / norm) as f32;
            }
        }
        values
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QuerysmithError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf29ce484222325u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E3779B97F4A7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// OpenAI-compatible `/embeddings` HTTP provider.
#[derive(Clone, Debug)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsItem>,
}

#[derive(Deserialize)]
struct EmbeddingsItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QuerysmithError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingsRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(QuerysmithError::RateLimited(format!(
                "embedding service returned 429 for {} inputs",
                texts.len()
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QuerysmithError::UpstreamError(format!(
                "embedding service returned {status}: {body}"
            )));
        }

        let mut payload: EmbeddingsResponse = response.json().await?;
        if payload.data.len() != texts.len() {
            return Err(QuerysmithError::UpstreamError(format!(
                "embedding service returned {} vectors for {} inputs",
                payload.data.len(),
                texts.len()
            )));
        }

        // The service is allowed to reorder; `index` restores input order.
        payload.data.sort_by_key(|item| item.index);
        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
