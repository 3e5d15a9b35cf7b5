use super::{Document, SearchResult, VectorStore};
use crate::embeddings::Embeddings;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Brute-force cosine search over vectors held in memory, optionally
/// saved to a JSON snapshot so separate runs share the collection.
pub struct InMemoryVectorStore {
    embeddings: Arc<dyn Embeddings>,
    collection: RwLock<Collection>,
    snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    document: Document,
    embedding: Vec<f32>,
}

/// Entries plus an id → position index
#[derive(Default)]
struct Collection {
    entries: Vec<Entry>,
    positions: HashMap<String, usize>,
}

impl Collection {
    fn from_entries(entries: Vec<Entry>) -> Self {
        let positions = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.document.id.clone().map(|id| (id, i)))
            .collect();
        Self { entries, positions }
    }

    /// Append an entry whose id is known to be new
    fn push(&mut self, id: String, entry: Entry) {
        self.positions.insert(id, self.entries.len());
        self.entries.push(entry);
    }

    fn insert(&mut self, id: String, entry: Entry) {
        match self.positions.get(&id) {
            Some(&i) => self.entries[i] = entry,
            None => self.push(id, entry),
        }
    }
}

impl InMemoryVectorStore {
    pub fn new(embeddings: Arc<dyn Embeddings>) -> Self {
        Self {
            embeddings,
            collection: RwLock::new(Collection::default()),
            snapshot: None,
        }
    }

    /// Save to `path` on [`persist`](VectorStore::persist), replacing whatever the file held.
    pub fn with_snapshot(mut self, path: PathBuf) -> Self {
        self.snapshot = Some(path);
        self
    }

    /// Open the collection saved at `path`; a missing file is an empty store.
    pub fn load(embeddings: Arc<dyn Embeddings>, path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let entries: Vec<Entry> = serde_json::from_str(&content)?;
            info!(path = %path.display(), documents = entries.len(), "Loaded in-memory store snapshot");
            entries
        } else {
            warn!(path = %path.display(), "No in-memory store snapshot found; run `cinephile index` first");
            Vec::new()
        };

        Ok(Self {
            embeddings,
            collection: RwLock::new(Collection::from_entries(entries)),
            snapshot: Some(path),
        })
    }

    pub async fn len(&self) -> usize {
        self.collection.read().await.entries.len()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        super::IN_MEMORY
    }

    async fn add_documents(&self, documents: &[Document]) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let vectors = self.embeddings.embed_documents(&texts).await?;

        let mut collection = self.collection.write().await;
        let mut ids = Vec::with_capacity(documents.len());

        for (doc, embedding) in documents.iter().zip(vectors) {
            let mut document = doc.clone();
            let id = match &doc.id {
                // Re-adding an id replaces the earlier entry
                Some(id) => {
                    collection.insert(id.clone(), Entry { document, embedding });
                    id.clone()
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    document.id = Some(id.clone());
                    collection.push(id.clone(), Entry { document, embedding });
                    id
                }
            };
            ids.push(id);
        }

        Ok(ids)
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let (json, count) = {
            let collection = self.collection.read().await;
            (serde_json::to_string(&collection.entries)?, collection.entries.len())
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await?;
        debug!(path = %path.display(), documents = count, "Saved in-memory store snapshot");
        Ok(())
    }

    async fn similarity_search_with_score(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embeddings.embed_query(query).await?;
        let collection = self.collection.read().await;
        let entries = &collection.entries;

        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(&query_embedding, &e.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchResult {
                document: entries[i].document.clone(),
                score,
            })
            .collect())
    }
}

/// Calculate cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddings;
    use tempfile::TempDir;

    fn store() -> InMemoryVectorStore {
        InMemoryVectorStore::new(Arc::new(HashEmbeddings::new(64)))
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = store();
        store
            .add_documents(&[
                Document::new("pirates sail the caribbean sea"),
                Document::new("a crew explores deep space aboard a starship"),
                Document::new("detectives solve a murder in london"),
            ])
            .await
            .unwrap();

        let results = store
            .similarity_search_with_score("deep space starship", 3)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0].document.page_content,
            "a crew explores deep space aboard a starship"
        );
        assert!(results[0].score >= results[1].score);
        assert!(results[1].score >= results[2].score);
    }

    #[tokio::test]
    async fn test_k_limits_results_and_empty_store() {
        let store = store();
        assert!(store.similarity_search("anything", 4).await.unwrap().is_empty());

        let docs: Vec<Document> = (0..6).map(|i| Document::new(format!("movie number {}", i))).collect();
        let ids = store.add_documents(&docs).await.unwrap();
        assert_eq!(ids.len(), 6);
        assert_eq!(store.similarity_search("movie", 4).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_explicit_ids_are_kept_and_replaced() {
        let store = store();
        let mut doc = Document::new("first version");
        doc.id = Some("movie-1".to_string());

        let ids = store.add_documents(&[doc.clone()]).await.unwrap();
        assert_eq!(ids, vec!["movie-1".to_string()]);

        doc.page_content = "second version".to_string();
        store.add_documents(&[doc]).await.unwrap();

        assert_eq!(store.len().await, 1);
        let hits = store.similarity_search("version", 1).await.unwrap();
        assert_eq!(hits[0].page_content, "second version");
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("store.json");
        let embeddings: Arc<dyn Embeddings> = Arc::new(HashEmbeddings::new(32));

        let store = InMemoryVectorStore::new(embeddings.clone()).with_snapshot(path.clone());
        store
            .add_documents(&[Document::new("heist in las vegas").with_metadata("year", 2001)])
            .await
            .unwrap();
        assert!(!path.exists());

        store.persist().await.unwrap();
        assert!(path.exists());

        let loaded = InMemoryVectorStore::load(embeddings, path).unwrap();
        assert_eq!(loaded.len().await, 1);
        let hits = loaded.similarity_search("vegas heist", 1).await.unwrap();
        assert_eq!(hits[0].metadata["year"], 2001);
    }

    #[tokio::test]
    async fn test_persist_without_snapshot_is_noop() {
        let store = store();
        store.add_documents(&[Document::new("quiet film")]).await.unwrap();
        store.persist().await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_generated_ids_are_unique_and_loaded_ids_replace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        let embeddings: Arc<dyn Embeddings> = Arc::new(HashEmbeddings::new(16));

        let store = InMemoryVectorStore::new(embeddings.clone()).with_snapshot(path.clone());
        let docs: Vec<Document> = (0..50).map(|i| Document::new(format!("film {}", i))).collect();
        let ids = store.add_documents(&docs).await.unwrap();
        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), 50);
        store.persist().await.unwrap();

        let loaded = InMemoryVectorStore::load(embeddings, path).unwrap();
        let mut replacement = Document::new("remastered film");
        replacement.id = Some(ids[7].clone());
        loaded.add_documents(&[replacement]).await.unwrap();

        assert_eq!(loaded.len().await, 50);
        let hits = loaded.similarity_search("remastered", 1).await.unwrap();
        assert_eq!(hits[0].id.as_deref(), Some(ids[7].as_str()));
    }

    #[tokio::test]
    async fn test_load_missing_snapshot_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded =
            InMemoryVectorStore::load(Arc::new(HashEmbeddings::new(8)), dir.path().join("none.json"))
                .unwrap();
        assert_eq!(loaded.len().await, 0);
    }
}
