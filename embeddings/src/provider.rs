//! Embedding providers.
//!
//! An [`Embedder`] is the external embedding function the rest of simdex
//! consumes: a batch of texts in, one vector per text out, same order.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::normalize;

/// Trait for embedding providers.
pub trait Embedder: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Provider name plus the settings that shape its vectors.
    ///
    /// Two embedders with equal signatures place the same text at the same
    /// point, so an index built by one can be queried with the other.
    fn signature(&self) -> String {
        self.name().to_string()
    }

    /// Embed a batch of texts, returning one vector per text in input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.embed(&[text.to_string()])?;
        if vectors.len() != 1 {
            return Err(EmbeddingError::DimensionMismatch {
                expected: 1,
                actual: vectors.len(),
            });
        }
        Ok(vectors.remove(0))
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn signature(&self) -> String {
        (**self).signature()
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        (**self).embed(texts)
    }
}

/// Adapts a plain function or closure into an [`Embedder`].
pub struct FnEmbedder<F> {
    name: String,
    func: F,
}

impl<F> FnEmbedder<F>
where
    F: Fn(&[String]) -> Result<Vec<Embedding>> + Send + Sync,
{
    /// Wrap `func` under the given provider name.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Embedder for FnEmbedder<F>
where
    F: Fn(&[String]) -> Result<Vec<Embedding>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        (self.func)(texts)
    }
}

/// Deterministic bag-of-character-trigrams embedder.
///
/// Each whitespace-separated word is lowercased and bracketed with `#`, its
/// character trigrams are hashed with CRC32 into `dimension` buckets, and the
/// bucket counts form the vector. Needs no model or network.
#[derive(Debug, Clone)]
pub struct TrigramEmbedder {
    dimension: usize,
    normalize: bool,
}

impl TrigramEmbedder {
    /// Create a trigram embedder producing `dimension`-length unit vectors.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            normalize: true,
        }
    }

    /// Emit raw trigram counts instead of unit vectors.
    pub fn without_normalization(mut self) -> Self {
        self.normalize = false;
        self
    }

    /// Output dimensionality.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        let mut buf = [0u8; 12];

        for word in text.split_whitespace() {
            let chars: Vec<char> = std::iter::once('#')
                .chain(word.chars().flat_map(char::to_lowercase))
                .chain(std::iter::once('#'))
                .collect();

            for gram in chars.windows(3) {
                let mut len = 0;
                for c in gram {
                    len += c.encode_utf8(&mut buf[len..]).len();
                }
                let bucket = crc32fast::hash(&buf[..len]) as usize % self.dimension;
                vector[bucket] += 1.0;
            }
        }

        if self.normalize {
            normalize(&mut vector);
        }
        vector
    }
}

impl Default for TrigramEmbedder {
    fn default() -> Self {
        Self::new(crate::DEFAULT_DIMENSION)
    }
}

impl Embedder for TrigramEmbedder {
    fn name(&self) -> &str {
        "trigram"
    }

    fn signature(&self) -> String {
        let scaling = if self.normalize { "unit" } else { "raw" };
        format!("trigram/{}/{scaling}", self.dimension)
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// OpenAI-compatible embedding provider.
pub struct OpenAIEmbedder {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::blocking::Client,

    /// Model to request.
    model: String,

    /// Requested output dimensions, if the model supports shortening.
    dimensions: Option<usize>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI provider reading the key from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::blocking::Client::new(),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Request shortened output vectors.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Check if the provider has credentials.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_body(&self, texts: &[String]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "input": texts,
            "model": self.model,
        });
        if let Some(dims) = self.dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }
        body
    }
}

impl Default for OpenAIEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for OpenAIEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn signature(&self) -> String {
        match self.dimensions {
            Some(dims) => format!("openai/{}/{dims}", self.model),
            None => format!("openai/{}", self.model),
        }
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = self
            .api_key
            .as_ref()
            .ok_or(EmbeddingError::ProviderNotConfigured)?;

        debug!(
            "Generating batch embeddings for {} texts with model: {}",
            texts.len(),
            self.model
        );

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&self.request_body(texts))
            .send()?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        let result: OpenAIEmbeddingResponse = response.json()?;
        let vectors = result.into_vectors(texts.len())?;

        info!("Generated {} batch embeddings", vectors.len());
        Ok(vectors)
    }
}

/// OpenAI API response format.
#[derive(Debug, Serialize, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
    model: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAIEmbeddingResponse {
    /// Order items by their `index` field and check one came back per input.
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Embedding>> {
        if self.data.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: self.data.len(),
            });
        }

        self.data.sort_by_key(|item| item.index);
        if self.data.iter().enumerate().any(|(i, item)| item.index != i) {
            return Err(EmbeddingError::InvalidResponse(
                "embedding indices are not a permutation of the inputs".to_string(),
            ));
        }

        if self.data.iter().any(|item| item.embedding.is_empty()) {
            warn!("Model {} returned an empty embedding", self.model);
        }

        Ok(self.data.into_iter().map(|item| item.embedding).collect())
    }
}
