use crate::config::{default_cache_dir, Settings};
use crate::error::{CinephileError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Marker written once an archive is fully extracted
const COMPLETE_MARKER: &str = ".complete";
const ARCHIVE_NAME: &str = ".download.zip";
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// `owner/slug` or `owner/slug/versions/N`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    pub owner: String,
    pub slug: String,
    pub version: Option<u32>,
}

impl FromStr for DatasetHandle {
    type Err = CinephileError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            CinephileError::Dataset(format!(
                "Invalid dataset handle '{}', expected owner/dataset[/versions/N]",
                s
            ))
        };

        let parts: Vec<&str> = s.trim().trim_matches('/').split('/').collect();
        match parts.as_slice() {
            [owner, slug] if !owner.is_empty() && !slug.is_empty() => Ok(Self {
                owner: owner.to_string(),
                slug: slug.to_string(),
                version: None,
            }),
            [owner, slug, "versions", n] if !owner.is_empty() && !slug.is_empty() => Ok(Self {
                owner: owner.to_string(),
                slug: slug.to_string(),
                version: Some(n.parse().map_err(|_| invalid())?),
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.slug)?;
        if let Some(version) = self.version {
            write!(f, "/versions/{}", version)?;
        }
        Ok(())
    }
}

/// Fetches a dataset and returns the local directory holding its files.
#[async_trait]
pub trait DatasetDownloader: Send + Sync {
    async fn dataset_download(&self, handle: &DatasetHandle, force: bool) -> Result<PathBuf>;
}

#[derive(Debug, Deserialize)]
struct KaggleCredentials {
    username: String,
    key: String,
}

pub struct KaggleClient {
    base_url: String,
    credentials: Option<KaggleCredentials>,
    cache_dir: PathBuf,
    client: Client,
}

impl KaggleClient {
    pub fn new(base_url: String, cache_dir: PathBuf, credentials: Option<(String, String)>) -> Self {
        Self {
            base_url,
            credentials: credentials.map(|(username, key)| KaggleCredentials { username, key }),
            cache_dir,
            client: Client::new(),
        }
    }

    /// Credentials from settings, else `~/.kaggle/kaggle.json`, else anonymous.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let kaggle = &settings.kaggle;
        let cache_dir = match &kaggle.cache_dir {
            Some(dir) => dir.clone(),
            None => default_cache_dir()?,
        };

        let credentials = match (&kaggle.username, &kaggle.key) {
            (Some(username), Some(key)) => Some((username.clone(), key.clone())),
            _ => read_kaggle_json(),
        };
        if credentials.is_none() {
            debug!("No Kaggle credentials found, downloading anonymously");
        }

        Ok(Self::new(kaggle.base_url.clone(), cache_dir, credentials))
    }

    pub fn dataset_dir(&self, handle: &DatasetHandle) -> PathBuf {
        let dir = self
            .cache_dir
            .join("datasets")
            .join(&handle.owner)
            .join(&handle.slug);
        match handle.version {
            Some(version) => dir.join("versions").join(version.to_string()),
            None => dir,
        }
    }

    fn download_url(&self, handle: &DatasetHandle) -> String {
        let url = format!(
            "{}/datasets/download/{}/{}",
            self.base_url.trim_end_matches('/'),
            handle.owner,
            handle.slug
        );
        match handle.version {
            Some(version) => format!("{}?datasetVersionNumber={}", url, version),
            None => url,
        }
    }

    async fn fetch_archive(&self, handle: &DatasetHandle, archive_path: &Path) -> Result<u64> {
        let mut req = self.client.get(self.download_url(handle));
        if let Some(creds) = &self.credentials {
            req = req.basic_auth(&creds.username, Some(&creds.key));
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(CinephileError::ApiRequest(format!(
                "Kaggle API error ({}) for {}: {}",
                status.as_u16(),
                handle,
                error_text
            )));
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(archive_path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut next_report: u64 = 50 * 1024 * 1024;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if downloaded >= next_report {
                debug!(downloaded_mb = downloaded / 1_000_000, total_mb = total.map(|t| t / 1_000_000), "Downloading");
                next_report += 50 * 1024 * 1024;
            }
        }
        file.flush().await?;

        Ok(downloaded)
    }
}

#[async_trait]
impl DatasetDownloader for KaggleClient {
    async fn dataset_download(&self, handle: &DatasetHandle, force: bool) -> Result<PathBuf> {
        let dir = self.dataset_dir(handle);

        if dir.join(COMPLETE_MARKER).exists() {
            if !force {
                info!(dataset = %handle, path = %dir.display(), "Using cached dataset");
                return Ok(dir);
            }
            fs::remove_dir_all(&dir)?;
        }

        fs::create_dir_all(&dir)?;
        let archive_path = dir.join(ARCHIVE_NAME);

        info!(dataset = %handle, "Downloading dataset from Kaggle");
        let bytes = self.fetch_archive(handle, &archive_path).await?;
        info!(dataset = %handle, size_mb = bytes / 1_000_000, "Download complete, extracting");

        let target = dir.clone();
        let archive = archive_path.clone();
        tokio::task::spawn_blocking(move || extract_archive(&archive, &target))
            .await
            .map_err(|e| CinephileError::Dataset(format!("Extraction task failed: {}", e)))??;

        fs::remove_file(&archive_path)?;
        fs::write(dir.join(COMPLETE_MARKER), handle.to_string())?;

        Ok(dir)
    }
}

/// Unpack a zip archive into `target`.
fn extract_archive(archive_path: &Path, target: &Path) -> Result<()> {
    let mut magic = [0u8; 4];
    let mut file = fs::File::open(archive_path)?;
    let read = file.read(&mut magic)?;
    if read < 4 || &magic != ZIP_MAGIC {
        return Err(CinephileError::Dataset(
            "Downloaded payload is not a zip archive".to_string(),
        ));
    }

    let mut archive = zip::ZipArchive::new(fs::File::open(archive_path)?)?;
    archive.extract(target)?;
    debug!(files = archive.len(), target = %target.display(), "Archive extracted");
    Ok(())
}

fn read_kaggle_json() -> Option<(String, String)> {
    let home = directories::BaseDirs::new()?.home_dir().to_path_buf();
    let content = fs::read_to_string(home.join(".kaggle").join("kaggle.json")).ok()?;
    let creds: KaggleCredentials = serde_json::from_str(&content).ok()?;
    Some((creds.username, creds.key))
}
