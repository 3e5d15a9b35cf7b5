use thiserror::Error;

#[derive(Error, Debug)]
pub enum CinephileError {
    #[error("API request failed: {0}")]
    ApiRequest(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Unsupported vector store: {0}")]
    UnsupportedVectorStore(String),

    #[error("Unable to infer model provider for '{0}'")]
    UnknownModelProvider(String),

    #[error("No model name provided")]
    MissingModelName,

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

impl From<deadpool_postgres::PoolError> for CinephileError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        CinephileError::Pool(err.to_string())
    }
}

impl From<deadpool_postgres::CreatePoolError> for CinephileError {
    fn from(err: deadpool_postgres::CreatePoolError) -> Self {
        CinephileError::Pool(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CinephileError>;
