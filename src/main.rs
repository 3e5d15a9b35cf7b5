mod agent;
mod cli;
mod config;
mod dataset;
mod embeddings;
mod error;
mod indexer;
mod providers;
mod store;
mod tools;

use agent::MovieRecommender;
use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{ConfigManager, Settings};
use dataset::KaggleCsvDataSource;
use embeddings::create_embeddings;
use error::CinephileError;
use indexer::MovieIndexer;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use store::{create_vector_store, StoreOptions, VectorStore};
use tools::MovieSearchTool;
use tracing::{info, warn};

const DEFAULT_QUERY: &str = "A movie about space exploration.";

// ============================================================================
// CLI Argument Parsing
// ============================================================================

#[derive(Parser)]
#[command(name = "cinephile", version, about = "Cinephile - movie indexer and recommender")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the dataset and index it into the vector store
    Index {
        /// Append to the existing collection instead of recreating it
        #[arg(long)]
        no_init_table: bool,
    },
    /// Run a similarity search against the indexed movies
    Search {
        #[arg(default_value = DEFAULT_QUERY)]
        query: String,
        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Chat with the movie recommender (default)
    Chat {
        /// Do not give the model access to the movie search tool
        #[arg(long)]
        no_tools: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings with secrets masked
    Show,
    /// Write a config file with default settings
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("cinephile=info"));

    if std::env::var("CINEPHILE_LOG_JSON").is_ok() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(io::stderr)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config_manager = ConfigManager::new(cli.config)?;

    match cli.command.unwrap_or(Commands::Chat { no_tools: false }) {
        Commands::Index { no_init_table } => run_index(config_manager.get(), !no_init_table).await,
        Commands::Search { query, k } => run_search(config_manager.get(), &query, k).await,
        Commands::Chat { no_tools } => run_chat(config_manager.get(), no_tools).await,
        Commands::Config { action } => run_config(&config_manager, action),
    }
}

async fn open_store(settings: &Settings, initialize_table: bool) -> Result<Arc<dyn VectorStore>> {
    let embeddings = create_embeddings(settings)?;
    let store = create_vector_store(
        &settings.store.backend,
        embeddings,
        settings,
        StoreOptions { initialize_table },
    )
    .await?;
    Ok(store)
}

// ============================================================================
// Commands
// ============================================================================

async fn run_index(settings: &Settings, initialize_table: bool) -> Result<()> {
    let source = KaggleCsvDataSource::from_settings(settings)?;
    let loader = source.get_loader().await?;
    let store = open_store(settings, initialize_table).await?;

    let indexed = MovieIndexer::new(Box::new(loader), store.clone())
        .with_batch_size(settings.embedding.batch_size)
        .index()
        .await?;

    println!("Indexed {} movies into {}", indexed, store.name());
    Ok(())
}

async fn run_search(settings: &Settings, query: &str, k: Option<usize>) -> Result<()> {
    let store = open_store(settings, false).await?;
    let k = k.unwrap_or(settings.store.search_k);

    let results = store.similarity_search_with_score(query, k).await?;
    if results.is_empty() {
        println!("No results. Run `cinephile index` first.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let title = tools::document_title(&result.document);
        println!("{}. {} (score {:.3})", i + 1, title, result.score);
        println!("   {}", result.document.page_content);
    }
    Ok(())
}

async fn run_chat(settings: &Settings, no_tools: bool) -> Result<()> {
    let model_name = settings.chat.model_name.clone().unwrap_or_default();
    let (provider, model) = match providers::create_provider(&model_name, settings) {
        Ok(created) => created,
        Err(CinephileError::MissingModelName) => {
            eprintln!("Error: No model name provided. Set MODEL_NAME in .env.");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if !provider.is_authenticated() {
        warn!(provider = %provider.info().display_name, "No API key configured for chat provider");
    }

    let tool = if settings.chat.tools_enabled && !no_tools {
        match open_store(settings, false).await {
            Ok(store) => Some(MovieSearchTool::new(store, settings.store.search_k)),
            Err(e) => {
                warn!(error = %e, "Movie search unavailable, chatting without it");
                None
            }
        }
    } else {
        None
    };

    info!(model = %model, tools = tool.is_some(), "Starting chat");
    let mut recommender = MovieRecommender::new(provider, model, tool).with_sampling(
        Some(settings.chat.temperature),
        Some(settings.chat.max_tokens),
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    cli::question_loop(
        &mut recommender,
        stdin.lock(),
        &mut stdout,
        cli::PanelStyle::for_terminal(),
    )
    .await?;
    Ok(())
}

fn run_config(config_manager: &ConfigManager, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let redacted = config_manager.get().redacted();
            print!("{}", toml::to_string_pretty(&redacted)?);
        }
        ConfigAction::Init { force } => {
            config_manager.write_defaults(force)?;
            println!("Wrote default config to {}", config_manager.config_path().display());
        }
        ConfigAction::Path => {
            println!("{}", config_manager.config_path().display());
        }
    }
    Ok(())
}
