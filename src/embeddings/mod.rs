//! Text embedding providers
//!
//! - `huggingface`: hosted feature-extraction pipeline (default, sentence-transformers models)
//! - `openai`: any OpenAI-compatible `/embeddings` endpoint
//! - `hash`: deterministic bag-of-words hashing, offline and not semantic

use crate::config::{EmbeddingProviderKind, Settings};
use crate::error::{CinephileError, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub mod hash;
pub mod huggingface;
pub mod openai;

pub use hash::HashEmbeddings;

#[async_trait]
pub trait Embeddings: Send + Sync {
    /// Provider/model label for logging
    fn name(&self) -> &str;

    /// Vector length, when known without calling the service
    fn dimensions(&self) -> Option<usize>;

    /// Embed a batch; the output has one vector per input, in order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| CinephileError::Embedding("Empty embedding response".to_string()))
    }
}

/// Dimensions of commonly used models, so tables can be created up front.
pub fn known_dimensions(model: &str) -> Option<usize> {
    let bare = model.rsplit('/').next().unwrap_or(model);
    match bare {
        "all-MiniLM-L6-v2" | "all-MiniLM-L12-v2" | "paraphrase-MiniLM-L6-v2"
        | "multi-qa-MiniLM-L6-cos-v1" | "bge-small-en-v1.5" => Some(384),
        "all-mpnet-base-v2" | "multi-qa-mpnet-base-dot-v1" | "bge-base-en-v1.5"
        | "nomic-embed-text-v1.5" => Some(768),
        "bge-large-en-v1.5" => Some(1024),
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

pub(crate) fn check_batch_len(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(CinephileError::Embedding(format!(
            "Expected {} embeddings, received {}",
            expected, got
        )));
    }
    Ok(())
}

pub fn create_embeddings(settings: &Settings) -> Result<Arc<dyn Embeddings>> {
    let cfg = &settings.embedding;
    let dimensions = cfg.dimensions.or_else(|| known_dimensions(&cfg.model));

    let embeddings: Arc<dyn Embeddings> = match cfg.provider {
        EmbeddingProviderKind::Huggingface => Arc::new(huggingface::HuggingFaceEmbeddings::new(
            cfg.model.clone(),
            cfg.api_key.clone(),
            cfg.base_url.clone(),
            dimensions,
        )),
        EmbeddingProviderKind::Openai => Arc::new(openai::OpenAiEmbeddings::new(
            cfg.model.clone(),
            cfg.api_key.clone().or_else(|| settings.chat.openai_api_key.clone()),
            cfg.base_url.clone(),
            dimensions,
        )),
        EmbeddingProviderKind::Hash => {
            Arc::new(HashEmbeddings::new(cfg.dimensions.unwrap_or(hash::DEFAULT_DIMENSIONS)))
        }
    };

    tracing::info!(embeddings = embeddings.name(), "Embedding provider ready");
    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_dimensions() {
        assert_eq!(known_dimensions("sentence-transformers/all-MiniLM-L6-v2"), Some(384));
        assert_eq!(known_dimensions("text-embedding-3-large"), Some(3072));
        assert_eq!(known_dimensions("someone/custom-model"), None);
    }

    #[test]
    fn test_factory_respects_provider() {
        let mut settings = Settings::default();
        let hf = create_embeddings(&settings).unwrap();
        assert_eq!(hf.dimensions(), Some(384));

        settings.embedding.provider = EmbeddingProviderKind::Hash;
        settings.embedding.dimensions = Some(16);
        let hash = create_embeddings(&settings).unwrap();
        assert_eq!(hash.dimensions(), Some(16));
    }

    #[tokio::test]
    async fn test_embed_query_uses_batch_path() {
        let embeddings = HashEmbeddings::new(8);
        let query = embeddings.embed_query("space opera").await.unwrap();
        let batch = embeddings
            .embed_documents(&["space opera".to_string()])
            .await
            .unwrap();
        assert_eq!(query, batch[0]);
    }

    #[test]
    fn test_batch_len_check() {
        assert!(check_batch_len(2, 2).is_ok());
        assert!(matches!(
            check_batch_len(2, 1),
            Err(CinephileError::Embedding(_))
        ));
    }
}
