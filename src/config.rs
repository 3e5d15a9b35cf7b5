use crate::error::{CinephileError, Result};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Flat variable names from the `.env` files the project has always used,
/// mapped onto their place in the layered settings.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("KAGGLE_DATASET_HANDLE", "dataset.handle"),
    ("CSV_FILENAME", "dataset.csv_filename"),
    ("CSV_CONTENT_COLUMN", "dataset.content_column"),
    ("KAGGLE_USERNAME", "kaggle.username"),
    ("KAGGLE_KEY", "kaggle.key"),
    ("EMBEDDING_PROVIDER", "embedding.provider"),
    ("EMBEDDING_MODEL", "embedding.model"),
    ("HUGGINGFACEHUB_API_TOKEN", "embedding.api_key"),
    ("HF_TOKEN", "embedding.api_key"),
    ("VECTOR_STORE", "store.backend"),
    ("TABLE_NAME", "store.table_name"),
    ("VECTOR_SIZE", "store.vector_size"),
    ("DATABASE_URL", "postgres.url"),
    ("POSTGRES_HOST", "postgres.host"),
    ("POSTGRES_PORT", "postgres.port"),
    ("POSTGRES_USER", "postgres.user"),
    ("POSTGRES_PASSWORD", "postgres.password"),
    ("POSTGRES_DB", "postgres.db"),
    ("MODEL_NAME", "chat.model_name"),
    ("ANTHROPIC_API_KEY", "chat.anthropic_api_key"),
    ("OPENAI_API_KEY", "chat.openai_api_key"),
    ("OPENROUTER_API_KEY", "chat.openrouter_api_key"),
];

const REDACTED: &str = "***";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub kaggle: KaggleConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub postgres: PostgresConfig,

    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Kaggle handle, `owner/slug` or `owner/slug/versions/N`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default = "default_csv_filename")]
    pub csv_filename: String,
    #[serde(default = "default_content_column")]
    pub content_column: String,
    #[serde(default = "default_true")]
    pub drop_na: bool,
    /// Read the CSV from this directory instead of downloading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<PathBuf>,
    #[serde(default)]
    pub force_download: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KaggleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default = "default_kaggle_url")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    Huggingface,
    Openai,
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Overrides the dimension known for the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_size: Option<usize>,
    #[serde(default = "default_search_k")]
    pub search_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default = "default_pg_host")]
    pub host: String,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_pg_db")]
    pub db: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_true")]
    pub tools_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openrouter_api_key: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_csv_filename() -> String {
    "TMDB_all_movies.csv".to_string()
}

fn default_content_column() -> String {
    "overview".to_string()
}

fn default_kaggle_url() -> String {
    "https://www.kaggle.com/api/v1".to_string()
}

fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Huggingface
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_store_backend() -> String {
    "in_memory".to_string()
}

fn default_search_k() -> usize {
    4
}

fn default_pg_host() -> String {
    "localhost".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_pg_db() -> String {
    "postgres".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            handle: None,
            csv_filename: default_csv_filename(),
            content_column: default_content_column(),
            drop_na: true,
            local_dir: None,
            force_download: false,
        }
    }
}

impl Default for KaggleConfig {
    fn default() -> Self {
        Self {
            username: None,
            key: None,
            base_url: default_kaggle_url(),
            cache_dir: None,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            api_key: None,
            base_url: None,
            batch_size: default_batch_size(),
            dimensions: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            snapshot_path: None,
            table_name: None,
            vector_size: None,
            search_k: default_search_k(),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_pg_host(),
            port: default_pg_port(),
            user: None,
            password: None,
            db: default_pg_db(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model_name: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            tools_enabled: true,
            base_url: None,
            anthropic_api_key: None,
            openai_api_key: None,
            openrouter_api_key: None,
        }
    }
}

impl Settings {
    /// Copy with every credential replaced, for display
    pub fn redacted(&self) -> Self {
        fn mask(value: &Option<String>) -> Option<String> {
            value.as_ref().map(|_| REDACTED.to_string())
        }

        let mut copy = self.clone();
        copy.kaggle.key = mask(&self.kaggle.key);
        copy.embedding.api_key = mask(&self.embedding.api_key);
        copy.postgres.password = mask(&self.postgres.password);
        copy.postgres.url = mask(&self.postgres.url);
        copy.chat.anthropic_api_key = mask(&self.chat.anthropic_api_key);
        copy.chat.openai_api_key = mask(&self.chat.openai_api_key);
        copy.chat.openrouter_api_key = mask(&self.chat.openrouter_api_key);
        copy
    }
}

/// Snapshot of the environment the settings are resolved against.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot(config::Map<String, String>);

impl EnvSnapshot {
    pub fn from_process() -> Self {
        Self(std::env::vars().collect())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key).filter(|v| !v.trim().is_empty())
    }
}

/// Resolve settings: defaults, then the TOML file, then `CINEPHILE_*`
/// variables, then the legacy flat variables.
pub fn load_settings(config_path: Option<&Path>, env: &EnvSnapshot) -> Result<Settings> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        builder = builder.add_source(
            File::new(&path.to_string_lossy(), FileFormat::Toml).required(false),
        );
    }

    builder = builder.add_source(
        Environment::with_prefix("CINEPHILE")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(Some(env.0.clone())),
    );

    for (var, key) in LEGACY_ENV_KEYS {
        builder = builder
            .set_override_option(*key, env.get(var).cloned())
            .map_err(|e| {
                CinephileError::Configuration(format!("Invalid value for {}: {}", var, e))
            })?;
    }

    let s = builder
        .build()
        .map_err(|e| CinephileError::Configuration(format!("Failed to build config: {}", e)))?;

    s.try_deserialize().map_err(|e| {
        CinephileError::Configuration(format!("Failed to deserialize config: {}", e))
    })
}

pub fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("com", "cinephile", "cinephile").ok_or_else(|| {
        CinephileError::Configuration("Could not determine config directory".to_string())
    })
}

/// Where downloaded datasets are cached unless `kaggle.cache_dir` is set
pub fn default_cache_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.cache_dir().to_path_buf())
}

/// Snapshot file backing the in-memory store unless `store.snapshot_path` is set
pub fn default_snapshot_path() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().join("in_memory_store.json"))
}

pub struct ConfigManager {
    settings: Settings,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load `.env`, then settings from `explicit_path` or the default location.
    pub fn new(explicit_path: Option<PathBuf>) -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }

        let config_path = match explicit_path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };
        let settings = load_settings(Some(&config_path), &EnvSnapshot::from_process())?;

        Ok(Self {
            settings,
            config_path,
        })
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write the default settings as TOML. Refuses to clobber unless `force`.
    pub fn write_defaults(&self, force: bool) -> Result<()> {
        if self.config_path.exists() && !force {
            return Err(CinephileError::Configuration(format!(
                "{} already exists (use --force to overwrite)",
                self.config_path.display()
            )));
        }

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(&Settings::default()).map_err(|e| {
            CinephileError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(&self.config_path, toml).map_err(|e| {
            CinephileError::Configuration(format!("Failed to write config: {}", e))
        })?;

        Ok(())
    }

    fn default_config_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }
}
