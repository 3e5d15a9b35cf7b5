//! Postgres + pgvector backed store.
//!
//! Uses the table layout of langchain-postgres `PGVectorStore`, so tables
//! written by either side can be read by the other:
//!
//! ```text
//! langchain_id UUID PRIMARY KEY, content TEXT NOT NULL,
//! embedding vector(N) NOT NULL, langchain_metadata JSON
//! ```

use super::{Document, SearchResult, VectorStore};
use crate::config::PostgresConfig;
use crate::embeddings::Embeddings;
use crate::error::{CinephileError, Result};
use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use std::sync::Arc;
use tokio_postgres::NoTls;
use tracing::{debug, info};

pub struct PgVectorStore {
    pool: Pool,
    table: String,
    embeddings: Arc<dyn Embeddings>,
}

impl PgVectorStore {
    /// Create the pool. No connection is made until the first query.
    pub fn connect(
        config: &PostgresConfig,
        table_name: String,
        embeddings: Arc<dyn Embeddings>,
    ) -> Result<Self> {
        let table = quote_table_name(&table_name)?;

        let mut cfg = Config::new();
        if let Some(url) = &config.url {
            cfg.url = Some(url.clone());
        } else {
            cfg.host = Some(config.host.clone());
            cfg.port = Some(config.port);
            cfg.user = config.user.clone();
            cfg.password = config.password.clone();
            cfg.dbname = Some(config.db.clone());
        }

        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        debug!(target_db = %connection_label(config), table = %table, "Postgres pool created");

        Ok(Self {
            pool,
            table,
            embeddings,
        })
    }

    pub fn embedding_dimensions(&self) -> Option<usize> {
        self.embeddings.dimensions()
    }

    /// Create the vector table, dropping an existing one when `overwrite_existing`.
    pub async fn init_table(&self, vector_size: usize, overwrite_existing: bool) -> Result<()> {
        let client = self.pool.get().await?;

        client
            .batch_execute("CREATE EXTENSION IF NOT EXISTS vector")
            .await?;

        if overwrite_existing {
            client
                .batch_execute(&format!("DROP TABLE IF EXISTS {}", self.table))
                .await?;
        }

        client
            .batch_execute(&create_table_sql(&self.table, vector_size))
            .await?;

        info!(table = %self.table, vector_size, "Vector table initialized");
        Ok(())
    }
}

/// `movies` → `"movies"`, `public.movies` → `"public"."movies"`.
fn quote_table_name(name: &str) -> Result<String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || parts.iter().any(|p| p.trim().is_empty()) {
        return Err(CinephileError::Configuration(format!(
            "Invalid table name: '{}'",
            name
        )));
    }

    Ok(parts
        .iter()
        .map(|p| format!("\"{}\"", p.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join("."))
}

fn create_table_sql(table: &str, vector_size: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         langchain_id UUID PRIMARY KEY, \
         content TEXT NOT NULL, \
         embedding vector({}) NOT NULL, \
         langchain_metadata JSON)",
        table, vector_size
    )
}

/// pgvector text input format: `[0.1,0.2,0.3]`
fn vector_literal(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

/// Connection target for logs, without credentials.
fn connection_label(config: &PostgresConfig) -> String {
    match &config.url {
        Some(_) => "DATABASE_URL".to_string(),
        None => format!(
            "postgresql://{}@{}:{}/{}",
            config.user.as_deref().unwrap_or(""),
            config.host,
            config.port,
            config.db
        ),
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn name(&self) -> &str {
        super::PGVECTORSTORE
    }

    async fn add_documents(&self, documents: &[Document]) -> Result<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let vectors = self.embeddings.embed_documents(&texts).await?;

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let stmt = tx
            .prepare(&format!(
                "INSERT INTO {} (langchain_id, content, embedding, langchain_metadata) \
                 VALUES ($1::text::uuid, $2, $3::text::vector, $4::text::json) \
                 ON CONFLICT (langchain_id) DO UPDATE SET \
                 content = EXCLUDED.content, embedding = EXCLUDED.embedding, \
                 langchain_metadata = EXCLUDED.langchain_metadata",
                self.table
            ))
            .await?;

        let mut ids = Vec::with_capacity(documents.len());
        for (doc, embedding) in documents.iter().zip(vectors) {
            let id = doc
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let metadata = serde_json::to_string(&doc.metadata)?;
            let vector = vector_literal(&embedding);

            tx.execute(&stmt, &[&id, &doc.page_content, &vector, &metadata])
                .await?;
            ids.push(id);
        }

        tx.commit().await?;
        debug!(table = %self.table, count = ids.len(), "Inserted documents");
        Ok(ids)
    }

    async fn similarity_search_with_score(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_vector = vector_literal(&self.embeddings.embed_query(query).await?);
        let limit = k as i64;

        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT langchain_id::text, content, langchain_metadata::text, \
                     embedding <=> $1::text::vector AS distance \
                     FROM {} ORDER BY distance LIMIT $2",
                    self.table
                ),
                &[&query_vector, &limit],
            )
            .await?;

        rows.iter()
            .map(|row| -> Result<SearchResult> {
                let metadata: Option<String> = row.get(2);
                let metadata: serde_json::Map<String, serde_json::Value> = match metadata {
                    Some(text) => serde_json::from_str(&text)?,
                    None => serde_json::Map::new(),
                };
                let distance: f64 = row.get(3);

                Ok(SearchResult {
                    document: Document {
                        id: Some(row.get(0)),
                        page_content: row.get(1),
                        metadata,
                    },
                    score: (1.0 - distance) as f32,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbeddings;

    #[test]
    fn test_quote_table_name() {
        assert_eq!(quote_table_name("movies").unwrap(), "\"movies\"");
        assert_eq!(quote_table_name("public.movies").unwrap(), "\"public\".\"movies\"");
        assert_eq!(quote_table_name("we\"ird").unwrap(), "\"we\"\"ird\"");
        assert!(quote_table_name("a.b.c").is_err());
        assert!(quote_table_name("").is_err());
        assert!(quote_table_name("public.").is_err());
    }

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[0.5, -1.0, 2.25]), "[0.5,-1,2.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql("\"movies\"", 384);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"movies\""));
        assert!(sql.contains("embedding vector(384) NOT NULL"));
        assert!(sql.contains("langchain_id UUID PRIMARY KEY"));
    }

    #[test]
    fn test_connection_label_hides_password() {
        let config = PostgresConfig {
            user: Some("cinephile".into()),
            password: Some("secret".into()),
            ..PostgresConfig::default()
        };
        let label = connection_label(&config);
        assert_eq!(label, "postgresql://cinephile@localhost:5432/postgres");
        assert!(!label.contains("secret"));
    }

    #[tokio::test]
    async fn test_connect_is_lazy() {
        let store = PgVectorStore::connect(
            &PostgresConfig::default(),
            "movies".into(),
            Arc::new(HashEmbeddings::new(12)),
        )
        .unwrap();
        assert_eq!(store.embedding_dimensions(), Some(12));
        assert_eq!(store.name(), "pgvectorstore");
    }
}
