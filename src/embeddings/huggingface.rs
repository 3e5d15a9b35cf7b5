use super::{check_batch_len, Embeddings};
use crate::error::{CinephileError, Result};
use crate::providers::retry::retry_with_backoff;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Hugging Face hosted inference, `feature-extraction` pipeline.
pub struct HuggingFaceEmbeddings {
    model: String,
    api_key: Option<String>,
    base_url: String,
    dimensions: Option<usize>,
    client: Client,
}

impl HuggingFaceEmbeddings {
    const DEFAULT_BASE_URL: &'static str = "https://router.huggingface.co/hf-inference";

    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        dimensions: Option<usize>,
    ) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| Self::DEFAULT_BASE_URL.to_string()),
            dimensions,
            client: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}/pipeline/feature-extraction",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn request(&self, texts: &[String]) -> Result<serde_json::Value> {
        let mut req = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&serde_json::json!({
                "inputs": texts,
                "options": { "wait_for_model": true },
            }));

        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CinephileError::Embedding(format!(
                "Hugging Face API error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        Ok(response.json().await?)
    }
}

/// Sentence-transformers return one pooled vector per input; plain encoders
/// return one vector per token, which are mean-pooled here.
fn parse_feature_extraction(value: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let invalid = || CinephileError::Embedding("Invalid feature-extraction response".to_string());

    let rows = value.as_array().ok_or_else(invalid)?;
    rows.iter()
        .map(|row| {
            let items = row.as_array().ok_or_else(invalid)?;
            if items.first().is_some_and(|v| v.is_array()) {
                let tokens = items
                    .iter()
                    .map(|t| to_vector(t).ok_or_else(invalid))
                    .collect::<Result<Vec<_>>>()?;
                Ok(mean_pool(&tokens))
            } else {
                to_vector(row).ok_or_else(invalid)
            }
        })
        .collect()
}

fn to_vector(value: &serde_json::Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn mean_pool(tokens: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = tokens.first() else {
        return Vec::new();
    };
    let mut pooled = vec![0.0f32; first.len()];
    for token in tokens {
        for (acc, v) in pooled.iter_mut().zip(token) {
            *acc += v;
        }
    }
    let n = tokens.len() as f32;
    pooled.iter_mut().for_each(|v| *v /= n);
    pooled
}

#[async_trait]
impl Embeddings for HuggingFaceEmbeddings {
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

        let value = retry_with_backoff(3, Duration::from_secs(1), || self.request(texts)).await?;
        let vectors = parse_feature_extraction(&value)?;
        check_batch_len(texts.len(), vectors.len())?;
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pooled_vectors() {
        let value = serde_json::json!([[0.1, 0.2], [0.3, 0.4]]);
        let vectors = parse_feature_extraction(&value).unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn test_parse_token_vectors_mean_pooled() {
        let value = serde_json::json!([[[1.0, 2.0], [3.0, 4.0]]]);
        let vectors = parse_feature_extraction(&value).unwrap();
        assert_eq!(vectors, vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn test_parse_rejects_error_payload() {
        let value = serde_json::json!({"error": "Model is loading"});
        assert!(parse_feature_extraction(&value).is_err());
    }

    #[test]
    fn test_endpoint_format() {
        let embeddings = HuggingFaceEmbeddings::new(
            "sentence-transformers/all-MiniLM-L6-v2".into(),
            None,
            Some("http://localhost:8080/".into()),
            Some(384),
        );
        assert_eq!(
            embeddings.endpoint(),
            "http://localhost:8080/models/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction"
        );
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let embeddings =
            HuggingFaceEmbeddings::new("m".into(), None, Some("http://127.0.0.1:9".into()), None);
        assert!(embeddings.embed_documents(&[]).await.unwrap().is_empty());
    }
}
