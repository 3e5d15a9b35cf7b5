use crate::error::Result;
use crate::store::{Document, VectorStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Anything that can produce the full set of documents to index
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<Document>>;
}

/// Loads movie documents and writes them into a vector store.
pub struct MovieIndexer {
    loader: Box<dyn DocumentLoader>,
    vector_store: Arc<dyn VectorStore>,
    batch_size: usize,
}

impl MovieIndexer {
    pub fn new(loader: Box<dyn DocumentLoader>, vector_store: Arc<dyn VectorStore>) -> Self {
        Self {
            loader,
            vector_store,
            batch_size: 32,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Index every document the loader yields. Returns how many were stored.
    pub async fn index(&self) -> Result<usize> {
        let start = Instant::now();
        let documents = self.loader.load().await?;

        if documents.is_empty() {
            warn!("Loader produced no documents, nothing to index");
            return Ok(0);
        }

        let total = documents.len();
        let batches = total.div_ceil(self.batch_size);
        info!(
            documents = total,
            batches,
            store = self.vector_store.name(),
            "Indexing movies"
        );

        let mut indexed = 0;
        for (i, batch) in documents.chunks(self.batch_size).enumerate() {
            let ids = self.vector_store.add_documents(batch).await?;
            indexed += ids.len();

            if (i + 1) % 10 == 0 || i + 1 == batches {
                info!(indexed, total, "Indexing progress");
            }
        }

        self.vector_store.persist().await?;

        info!(
            indexed,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Indexing complete"
        );
        Ok(indexed)
    }
}
