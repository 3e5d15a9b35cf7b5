//! Movie data source: a Kaggle dataset holding one CSV of movies.

pub mod kaggle;

pub use kaggle::{DatasetDownloader, DatasetHandle, KaggleClient};

use crate::config::Settings;
use crate::error::{CinephileError, Result};
use crate::indexer::DocumentLoader;
use crate::store::Document;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

/// Cell values read as missing, the same set pandas treats as NaN by default
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_na(value: &str) -> bool {
    NA_VALUES.contains(&value)
}

/// Column type inferred from every kept value, the way a dataframe types a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Float,
    Text,
}

impl ColumnKind {
    fn infer<'a>(values: impl Iterator<Item = &'a str>) -> Self {
        let mut kind = ColumnKind::Integer;
        for value in values.filter(|v| !is_na(v)) {
            if kind == ColumnKind::Integer && value.parse::<i64>().is_err() {
                kind = ColumnKind::Float;
            }
            if kind == ColumnKind::Float && !value.parse::<f64>().is_ok_and(f64::is_finite) {
                return ColumnKind::Text;
            }
        }
        kind
    }

    fn value(self, raw: &str) -> Value {
        if is_na(raw) {
            return Value::Null;
        }
        let number = match self {
            ColumnKind::Integer => raw.parse::<i64>().ok().map(Value::from),
            ColumnKind::Float => raw.parse::<f64>().ok().map(Value::from),
            ColumnKind::Text => None,
        };
        number.unwrap_or_else(|| Value::String(raw.to_string()))
    }
}

/// Downloads a Kaggle dataset and hands out a loader over one of its CSV files.
pub struct KaggleCsvDataSource {
    dataset_handle: Option<String>,
    csv_filename: String,
    content_column: String,
    drop_na: bool,
    local_dir: Option<PathBuf>,
    force_download: bool,
    downloader: Box<dyn DatasetDownloader>,
}

impl KaggleCsvDataSource {
    pub fn new(
        dataset_handle: impl Into<String>,
        csv_filename: impl Into<String>,
        content_column: impl Into<String>,
        drop_na: bool,
        downloader: Box<dyn DatasetDownloader>,
    ) -> Self {
        Self {
            dataset_handle: Some(dataset_handle.into()),
            csv_filename: csv_filename.into(),
            content_column: content_column.into(),
            drop_na,
            local_dir: None,
            force_download: false,
            downloader,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let dataset = &settings.dataset;
        if dataset.handle.is_none() && dataset.local_dir.is_none() {
            return Err(CinephileError::Configuration(
                "KAGGLE_DATASET_HANDLE (or dataset.local_dir) must be set".to_string(),
            ));
        }

        Ok(Self {
            dataset_handle: dataset.handle.clone(),
            csv_filename: dataset.csv_filename.clone(),
            content_column: dataset.content_column.clone(),
            drop_na: dataset.drop_na,
            local_dir: dataset.local_dir.clone(),
            force_download: dataset.force_download,
            downloader: Box::new(KaggleClient::from_settings(settings)?),
        })
    }

    /// Fetch the dataset (unless a local directory is configured) and return
    /// a loader for the configured CSV file.
    pub async fn get_loader(&self) -> Result<CsvLoader> {
        let data_dir = match (&self.local_dir, &self.dataset_handle) {
            (Some(dir), _) => dir.clone(),
            (None, Some(handle)) => {
                let handle: DatasetHandle = handle.parse()?;
                self.downloader
                    .dataset_download(&handle, self.force_download)
                    .await?
            }
            (None, None) => {
                return Err(CinephileError::Configuration(
                    "No dataset handle configured".to_string(),
                ));
            }
        };

        let csv_path = data_dir.join(&self.csv_filename);
        if !csv_path.is_file() {
            return Err(CinephileError::Dataset(format!(
                "CSV file not found: {}",
                csv_path.display()
            )));
        }

        Ok(CsvLoader::new(csv_path, self.content_column.clone(), self.drop_na))
    }
}

/// Turns CSV rows into documents: one column becomes the text, the rest metadata.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    csv_path: PathBuf,
    content_column: String,
    drop_na: bool,
}

impl CsvLoader {
    pub fn new(csv_path: PathBuf, content_column: String, drop_na: bool) -> Self {
        Self {
            csv_path,
            content_column,
            drop_na,
        }
    }

    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

impl CsvLoader {
    fn read_documents(&self) -> Result<Vec<Document>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.csv_path)?;

        let headers = reader.headers()?.clone();
        let content_idx = headers
            .iter()
            .position(|h| h == self.content_column)
            .ok_or_else(|| {
                CinephileError::Dataset(format!(
                    "Content column '{}' not found in {}",
                    self.content_column,
                    self.csv_path.display()
                ))
            })?;

        let mut records = Vec::new();
        let mut dropped = 0usize;
        for record in reader.records() {
            let record = record?;
            if self.drop_na && record.iter().any(is_na) {
                dropped += 1;
                continue;
            }
            records.push(record);
        }

        let kinds: Vec<ColumnKind> = (0..headers.len())
            .map(|idx| ColumnKind::infer(records.iter().filter_map(|r| r.get(idx))))
            .collect();

        let documents: Vec<Document> = records
            .iter()
            .map(|record| {
                let content = record.get(content_idx).unwrap_or_default();
                let mut document = Document::new(if is_na(content) { "" } else { content });

                for (idx, (header, value)) in headers.iter().zip(record.iter()).enumerate() {
                    if idx != content_idx {
                        document
                            .metadata
                            .insert(header.to_string(), kinds[idx].value(value));
                    }
                }
                document
            })
            .collect();

        info!(
            path = %self.csv_path.display(),
            loaded = documents.len(),
            dropped,
            "CSV loaded"
        );

        Ok(documents)
    }
}

#[async_trait]
impl DocumentLoader for CsvLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let loader = self.clone();
        tokio::task::spawn_blocking(move || loader.read_documents())
            .await
            .map_err(|e| CinephileError::Dataset(format!("CSV loading task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    const MOVIES_CSV: &str = "title,overview,rating\n\
        Movie 1,Description 1,8.5\n\
        Movie 2,Description 2,7.0\n\
        Movie 3,,6.5\n";

    struct FakeDownloader {
        dir: PathBuf,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DatasetDownloader for FakeDownloader {
        async fn dataset_download(&self, handle: &DatasetHandle, _force: bool) -> Result<PathBuf> {
            self.calls.lock().unwrap().push(handle.to_string());
            Ok(self.dir.clone())
        }
    }

    fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        settings.dataset.handle = Some("user/dataset-name".to_string());
        settings.dataset.csv_filename = "movies.csv".to_string();
        settings.dataset.content_column = "description".to_string();

        let source = KaggleCsvDataSource::from_settings(&settings).unwrap();
        assert_eq!(source.dataset_handle.as_deref(), Some("user/dataset-name"));
        assert_eq!(source.csv_filename, "movies.csv");
        assert_eq!(source.content_column, "description");
        assert!(source.drop_na);
    }

    #[test]
    fn test_from_settings_requires_source() {
        let result = KaggleCsvDataSource::from_settings(&Settings::default());
        assert!(matches!(result, Err(CinephileError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_get_loader_downloads_and_drops_na() {
        let dir = TempDir::new().unwrap();
        write_csv(&dir, "movies.csv", MOVIES_CSV);
        let calls = Arc::new(Mutex::new(Vec::new()));

        let source = KaggleCsvDataSource::new(
            "user/dataset-name",
            "movies.csv",
            "overview",
            true,
            Box::new(FakeDownloader {
                dir: dir.path().to_path_buf(),
                calls: calls.clone(),
            }),
        );

        let loader = source.get_loader().await.unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["user/dataset-name".to_string()]);
        assert_eq!(loader.csv_path(), &dir.path().join("movies.csv"));

        let documents = loader.load().await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].page_content, "Description 1");
        assert_eq!(documents[1].page_content, "Description 2");
        assert_eq!(documents[0].metadata["title"], "Movie 1");
        assert_eq!(documents[0].metadata["rating"], 8.5);
        assert!(!documents[0].metadata.contains_key("overview"));
    }

    #[tokio::test]
    async fn test_get_loader_missing_csv() {
        let dir = TempDir::new().unwrap();
        let source = KaggleCsvDataSource::new(
            "user/dataset-name",
            "missing.csv",
            "overview",
            true,
            Box::new(FakeDownloader {
                dir: dir.path().to_path_buf(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }),
        );

        assert!(matches!(
            source.get_loader().await,
            Err(CinephileError::Dataset(_))
        ));
    }

    #[tokio::test]
    async fn test_keep_na_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "movies.csv", "title,overview,budget\nMovie 3,NA,\n");

        let documents = CsvLoader::new(path, "overview".into(), false).load().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].page_content, "");
        assert_eq!(documents[0].metadata["budget"], Value::Null);
    }

    #[tokio::test]
    async fn test_any_missing_column_drops_row() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "movies.csv",
            "title,overview,director\nAlien,Crew meets creature,Ridley Scott\nSolaris,Ocean planet,null\n",
        );

        let documents = CsvLoader::new(path, "overview".into(), true).load().await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].metadata["director"], "Ridley Scott");
    }

    #[tokio::test]
    async fn test_unknown_content_column() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "movies.csv", MOVIES_CSV);

        let result = CsvLoader::new(path, "plot".into(), true).load().await;
        assert!(matches!(result, Err(CinephileError::Dataset(_))));
    }

    #[test]
    fn test_column_kind_inference() {
        assert_eq!(ColumnKind::infer(["1999", "2001", ""].into_iter()), ColumnKind::Integer);
        assert_eq!(ColumnKind::infer(["7", "7.5"].into_iter()), ColumnKind::Float);
        assert_eq!(ColumnKind::infer(["1.5", "inf"].into_iter()), ColumnKind::Text);
        assert_eq!(ColumnKind::infer(["1917", "Alien"].into_iter()), ColumnKind::Text);

        assert_eq!(ColumnKind::Integer.value("1999"), Value::from(1999));
        assert_eq!(ColumnKind::Float.value("7"), Value::from(7.0));
        assert_eq!(ColumnKind::Text.value("2001-04-01"), Value::String("2001-04-01".into()));
        assert_eq!(ColumnKind::Integer.value("NaN"), Value::Null);
    }

    #[tokio::test]
    async fn test_numeric_titles_stay_text() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            &dir,
            "movies.csv",
            "title,overview,year
1917,Two soldiers cross no man's land.,2019
Alien,A crew meets a creature.,1979
",
        );

        let documents = CsvLoader::new(path, "overview".into(), true).load().await.unwrap();
        assert_eq!(documents[0].metadata["title"], Value::String("1917".into()));
        assert_eq!(documents[0].metadata["year"], Value::from(2019));
        assert_eq!(documents[1].metadata["title"], "Alien");
    }
}
