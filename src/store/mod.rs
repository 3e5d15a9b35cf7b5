//! Vector stores: documents in, nearest documents out.

use crate::config::{default_snapshot_path, Settings};
use crate::embeddings::Embeddings;
use crate::error::{CinephileError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryVectorStore;
pub use postgres::PgVectorStore;

pub const IN_MEMORY: &str = "in_memory";
pub const PGVECTORSTORE: &str = "pgvectorstore";

/// A text record plus arbitrary metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub page_content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            id: None,
            page_content: page_content.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A search hit. `score` is a similarity: higher is closer.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub document: Document,
    pub score: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Embed and store documents, returning their ids in input order.
    async fn add_documents(&self, documents: &[Document]) -> Result<Vec<String>>;

    async fn similarity_search_with_score(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;

    /// Make everything added so far durable. Stores that write through need no work here.
    async fn persist(&self) -> Result<()> {
        Ok(())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        Ok(self
            .similarity_search_with_score(query, k)
            .await?
            .into_iter()
            .map(|r| r.document)
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Start from an empty collection, dropping whatever was there
    pub initialize_table: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            initialize_table: true,
        }
    }
}

/// Build the store named `name` (`in_memory` or `pgvectorstore`).
pub async fn create_vector_store(
    name: &str,
    embeddings: Arc<dyn Embeddings>,
    settings: &Settings,
    options: StoreOptions,
) -> Result<Arc<dyn VectorStore>> {
    match name {
        IN_MEMORY => {
            let snapshot = match &settings.store.snapshot_path {
                Some(path) => path.clone(),
                None => default_snapshot_path()?,
            };
            let store = if options.initialize_table {
                InMemoryVectorStore::new(embeddings).with_snapshot(snapshot)
            } else {
                InMemoryVectorStore::load(embeddings, snapshot)?
            };
            Ok(Arc::new(store))
        }
        PGVECTORSTORE => {
            let table_name = settings.store.table_name.clone().ok_or_else(|| {
                CinephileError::Configuration(
                    "TABLE_NAME must be set for the pgvectorstore backend".to_string(),
                )
            })?;
            let store = PgVectorStore::connect(&settings.postgres, table_name, embeddings)?;

            if options.initialize_table {
                let vector_size = settings
                    .store
                    .vector_size
                    .or_else(|| store.embedding_dimensions())
                    .ok_or_else(|| {
                        CinephileError::Configuration(
                            "VECTOR_SIZE must be set to initialize the vector table".to_string(),
                        )
                    })?;
                store.init_table(vector_size, true).await?;
            }

            Ok(Arc::new(store))
        }
        other => Err(CinephileError::UnsupportedVectorStore(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddings;
    use tempfile::TempDir;

    fn settings_with_snapshot(dir: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.store.snapshot_path = Some(dir.path().join("store.json"));
        settings
    }

    #[tokio::test]
    async fn test_unsupported_store_name() {
        let embeddings = Arc::new(HashEmbeddings::new(8));
        let result =
            create_vector_store("chroma", embeddings, &Settings::default(), StoreOptions::default())
                .await;

        match result {
            Err(CinephileError::UnsupportedVectorStore(name)) => assert_eq!(name, "chroma"),
            _ => panic!("Expected UnsupportedVectorStore error"),
        }
    }

    #[tokio::test]
    async fn test_pgvectorstore_requires_table_name() {
        let embeddings = Arc::new(HashEmbeddings::new(8));
        let result = create_vector_store(
            PGVECTORSTORE,
            embeddings,
            &Settings::default(),
            StoreOptions { initialize_table: false },
        )
        .await;

        assert!(matches!(result, Err(CinephileError::Configuration(_))));
    }

    /// An embedder whose vector size is only known after a call
    struct UnsizedEmbeddings;

    #[async_trait]
    impl Embeddings for UnsizedEmbeddings {
        fn name(&self) -> &str {
            "unsized"
        }

        fn dimensions(&self) -> Option<usize> {
            None
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_pgvectorstore_init_needs_vector_size() {
        let mut settings = Settings::default();
        settings.store.table_name = Some("movies".to_string());

        let result = create_vector_store(
            PGVECTORSTORE,
            Arc::new(UnsizedEmbeddings),
            &settings,
            StoreOptions::default(),
        )
        .await;

        match result {
            Err(CinephileError::Configuration(msg)) => assert!(msg.contains("VECTOR_SIZE")),
            Err(e) => panic!("Expected Configuration error, got {}", e),
            Ok(_) => panic!("Expected Configuration error"),
        }
    }

    #[tokio::test]
    async fn test_in_memory_index_then_reopen() {
        let dir = TempDir::new().unwrap();
        let settings = settings_with_snapshot(&dir);
        let embeddings: Arc<dyn Embeddings> = Arc::new(HashEmbeddings::new(64));

        let store = create_vector_store(
            IN_MEMORY,
            embeddings.clone(),
            &settings,
            StoreOptions::default(),
        )
        .await
        .unwrap();
        store
            .add_documents(&[
                Document::new("astronauts travel through a wormhole in space")
                    .with_metadata("title", "Interstellar"),
                Document::new("a chef rat cooks in paris").with_metadata("title", "Ratatouille"),
            ])
            .await
            .unwrap();
        store.persist().await.unwrap();

        let reopened = create_vector_store(
            IN_MEMORY,
            embeddings,
            &settings,
            StoreOptions { initialize_table: false },
        )
        .await
        .unwrap();

        let docs = reopened
            .similarity_search("a movie about space travel", 1)
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata["title"], "Interstellar");
    }

    #[tokio::test]
    async fn test_initialize_discards_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let settings = settings_with_snapshot(&dir);
        let embeddings: Arc<dyn Embeddings> = Arc::new(HashEmbeddings::new(16));

        let first = create_vector_store(IN_MEMORY, embeddings.clone(), &settings, StoreOptions::default())
            .await
            .unwrap();
        first.add_documents(&[Document::new("old entry")]).await.unwrap();
        first.persist().await.unwrap();

        let second = create_vector_store(IN_MEMORY, embeddings.clone(), &settings, StoreOptions::default())
            .await
            .unwrap();
        second.add_documents(&[Document::new("new entry")]).await.unwrap();
        second.persist().await.unwrap();

        let reopened = create_vector_store(
            IN_MEMORY,
            embeddings,
            &settings,
            StoreOptions { initialize_table: false },
        )
        .await
        .unwrap();
        let docs = reopened.similarity_search("entry", 10).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "new entry");
    }
}
