use super::{check_batch_len, Embeddings};
use crate::error::{CinephileError, Result};
use crate::providers::retry::retry_with_backoff;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub struct OpenAiEmbeddings {
    model: String,
    api_key: Option<String>,
    base_url: String,
    dimensions: Option<usize>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddings {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        dimensions: Option<usize>,
    ) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            dimensions,
            client: Client::new(),
        }
    }

    async fn request(&self, texts: &[String]) -> Result<EmbeddingResponse> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            CinephileError::Authentication("OPENAI_API_KEY not configured".to_string())
        })?;

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CinephileError::Embedding(format!(
                "OpenAI embeddings error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        Ok(response.json().await?)
    }
}

/// The API may return items out of order; `index` is authoritative.
fn into_ordered(mut response: EmbeddingResponse) -> Vec<Vec<f32>> {
    response.data.sort_by_key(|d| d.index);
    response.data.into_iter().map(|d| d.embedding).collect()
}

#[async_trait]
impl Embeddings for OpenAiEmbeddings {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = retry_with_backoff(3, Duration::from_secs(1), || self.request(texts)).await?;
        let vectors = into_ordered(response);
        check_batch_len(texts.len(), vectors.len())?;
        Ok(vectors)
    }
}
