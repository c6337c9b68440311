//! Text embedders
//!
//! `OpenAiEmbedder` calls an OpenAI-compatible `/embeddings` endpoint.
//! `HashingEmbedder` is a deterministic local fallback: hashed words and
//! character trigrams folded into a fixed number of buckets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::similarity::normalize;
use crate::error::{CacheError, CacheResult};

/// Turns text into a fixed-dimensional vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> CacheResult<Vec<f32>>;

    /// Model identifier, for logs and metadata
    fn model(&self) -> &str;
}

/// Lowercase and collapse whitespace so trivial variations embed the same
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Local pseudo-embedding without any external call
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, feature: &str) -> usize {
        let hash = blake3::hash(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        (u64::from_le_bytes(bytes) % self.dimension as u64) as usize
    }

    /// Synchronous variant of [`Embedder::embed`]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let text = normalize_text(text);
        let mut embedding = vec![0.0f32; self.dimension];

        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            embedding[self.bucket(&format!("w:{word}"))] += 2.0;

            let chars: Vec<char> = format!(" {word} ").chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                embedding[self.bucket(&format!("g:{gram}"))] += 1.0;
            }
        }

        normalize(&mut embedding);
        embedding
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> CacheResult<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn model(&self) -> &str {
        "hashing"
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Remote embedder for OpenAI-compatible APIs
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout: Duration::from_secs(10),
            http_client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = client;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> CacheResult<Vec<f32>> {
        let input = normalize_text(text);
        let request = EmbeddingRequest {
            model: &self.model,
            input: &input,
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!(%status, body = %error_text, "Embedding request rejected");
            return Err(CacheError::Embedding(format!("embedding API returned {status}")));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CacheError::Embedding("empty embedding response".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
