//! OpenAI-compatible embedding adapter.
//!
//! Calls `POST {base_url}/embeddings`. Works with any server exposing the same
//! request and response shape (Azure OpenAI, local inference servers).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::EmbeddingConfig;
use crate::domain::ports::TrajectoryEmbedder;

const SERVICE: &str = "embedder";

/// Maximum texts per single API request.
const MAX_BATCH_SIZE: usize = 2048;

pub struct OpenAiEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    api_key: Option<String>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> PortResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PortError::unreachable(SERVICE, format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
            api_key: config.api_key.clone(),
        })
    }

    fn api_key(&self) -> PortResult<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| {
                PortError::unreachable(
                    SERVICE,
                    "API key not set. Set OPENAI_API_KEY or configure embedding.api_key",
                )
            })
    }

    async fn call_embeddings_api(&self, texts: Vec<String>) -> PortResult<Vec<Vec<f32>>> {
        let api_key = self.api_key()?;
        let expected = texts.len();
        let request_body = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| PortError::unreachable(SERVICE, format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            let reason = format!("embedding API returned {status}: {body}");
            return Err(if status.is_server_error() {
                PortError::unreachable(SERVICE, reason)
            } else {
                PortError::invalid_response(SERVICE, reason)
            });
        }

        let result: EmbeddingsResponse = response.json().await.map_err(|e| {
            PortError::invalid_response(SERVICE, format!("failed to parse embedding response: {e}"))
        })?;

        // Sort by index to maintain input order
        let mut data = result.data;
        data.sort_by_key(|d| d.index);
        if data.len() != expected {
            return Err(PortError::invalid_response(
                SERVICE,
                format!("expected {expected} embeddings, got {}", data.len()),
            ));
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl TrajectoryEmbedder for OpenAiEmbedder {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            vectors.extend(self.call_embeddings_api(chunk.to_vec()).await?);
        }
        Ok(vectors)
    }
}

// -- API request/response types --

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
