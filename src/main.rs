use anyhow::{anyhow, Context, Result};
use async_openai::{config::OpenAIConfig, Client as OpenAIClient};
use clap::{Parser, Subcommand};
use ollama_rs::Ollama;
use serde_json::json;
use std::env;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info, warn};

use tributary::db::{Database, SourceKind};
use tributary::environment::get_env_var_or;
use tributary::fetch::{FeedFetcher, Fetchers, GmailProvider, MailboxFetcher, VideoFetcher};
use tributary::ingest::run_cycle;
use tributary::logging::configure_logging;
use tributary::oracle::LlmOracle;
use tributary::replicate::{replicate_summary, DocumentStore, GoogleDocsStore, NotionStore};
use tributary::summarize::summarize_item;
use tributary::{LLMClient, LLMParams, DEFAULT_SUMMARY_INPUT_CAP};

#[derive(Parser)]
#[command(name = "tributary", about = "Content aggregation and summarization pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one monitoring cycle over all active sources
    Monitor,
    /// Summarize a content item on demand
    Summarize {
        item_id: i64,
    },
    /// Replicate a persisted summary to the configured document stores
    Replicate {
        summary_id: i64,
        /// Restrict fan-out to the named providers
        #[arg(long = "provider")]
        providers: Vec<String>,
    },
    /// Register a new content source
    AddSource {
        #[arg(long)]
        owner: String,
        /// One of: video-channel, feed, mailbox
        #[arg(long)]
        kind: String,
        #[arg(long)]
        origin: String,
        /// Kind-specific settings as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// List active sources
    ListSources,
    /// Deactivate a source (flag flip; nothing is deleted)
    DeactivateSource {
        source_id: i64,
    },
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")
}

/// Fetch capabilities are assembled from configuration; a source kind with
/// no configured backend surfaces as a per-source failure in the cycle
/// report rather than a startup error.
fn build_fetchers(http: &reqwest::Client) -> Fetchers {
    let mut fetchers = Fetchers::new();
    fetchers.register(SourceKind::Feed, Arc::new(FeedFetcher::new(http.clone())));

    match env::var("YOUTUBE_API_KEY") {
        Ok(key) => {
            fetchers.register(
                SourceKind::VideoChannel,
                Arc::new(VideoFetcher::new(http.clone(), key)),
            );
        }
        Err(_) => {
            warn!("YOUTUBE_API_KEY not set, video-channel sources will fail this cycle");
        }
    }

    match env::var("GMAIL_ACCESS_TOKEN") {
        Ok(token) => {
            let query =
                env::var("GMAIL_QUERY").unwrap_or_else(|_| "category:primary".to_string());
            let provider = Arc::new(GmailProvider::new(http.clone(), token, query));
            fetchers.register(SourceKind::Mailbox, Arc::new(MailboxFetcher::new(provider)));
        }
        Err(_) => {
            warn!("GMAIL_ACCESS_TOKEN not set, mailbox sources will fail this cycle");
        }
    }

    fetchers
}

fn build_oracle() -> Result<LlmOracle> {
    let temperature: f32 = get_env_var_or("LLM_TEMPERATURE", 0.0);

    let (llm_client, model) = match env::var("LLM_TYPE")
        .unwrap_or_else(|_| "ollama".to_string())
        .as_str()
    {
        "openai" => {
            let api_key =
                env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set for LLM_TYPE=openai")?;
            let config = OpenAIConfig::new().with_api_key(api_key);
            let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            (LLMClient::OpenAI(OpenAIClient::with_config(config)), model)
        }
        _ => {
            let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string());
            let port: u16 = get_env_var_or("OLLAMA_PORT", 11434);
            info!("Connecting to Ollama at {}:{}", host, port);
            let model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3".to_string());
            (LLMClient::Ollama(Ollama::new(host, port)), model)
        }
    };

    Ok(LlmOracle::new(LLMParams {
        llm_client,
        model,
        temperature,
    }))
}

fn build_document_stores(
    http: &reqwest::Client,
    requested: &[String],
) -> Vec<Arc<dyn DocumentStore>> {
    let mut stores: Vec<Arc<dyn DocumentStore>> = Vec::new();

    if let (Ok(key), Ok(parent)) = (env::var("NOTION_API_KEY"), env::var("NOTION_PARENT_PAGE")) {
        stores.push(Arc::new(NotionStore::new(http.clone(), key, parent)));
    }
    if let Ok(token) = env::var("GOOGLE_DOCS_TOKEN") {
        stores.push(Arc::new(GoogleDocsStore::new(http.clone(), token)));
    }

    if requested.is_empty() {
        stores
    } else {
        stores
            .into_iter()
            .filter(|s| requested.iter().any(|r| r == s.name()))
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();

    let cli = Cli::parse();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_err() {
            error!("Failed to listen for ctrl-c");
        }
        let _ = cancel_tx.send(true);
    });

    let db_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "tributary.db".to_string());
    let db = Database::new(&db_path)
        .await
        .context("failed to initialize database")?;

    let http = http_client()?;
    let owner = env::var("TRIBUTARY_OWNER").unwrap_or_else(|_| "default".to_string());

    match cli.command {
        Command::Monitor => {
            let fetchers = build_fetchers(&http);
            let outcomes = run_cycle(&db, &fetchers, &cancel_rx).await?;
            for outcome in &outcomes {
                match &outcome.error {
                    None => println!(
                        "source {}: {} candidates, {} new",
                        outcome.source_id, outcome.candidates_seen, outcome.new_items
                    ),
                    Some(err) => println!("source {}: failed: {}", outcome.source_id, err),
                }
            }
        }
        Command::Summarize { item_id } => {
            let oracle = build_oracle()?;
            let input_cap = get_env_var_or("SUMMARY_INPUT_CAP", DEFAULT_SUMMARY_INPUT_CAP);
            let record = summarize_item(&db, &oracle, None, item_id, &owner, input_cap).await?;
            println!(
                "{}",
                json!({
                    "id": record.id,
                    "content_item_id": record.content_item_id,
                    "summary": record.summary,
                    "key_points": record.key_points,
                    "topics": record.topics,
                    "sentiment": record.sentiment.as_str(),
                    "confidence": record.confidence,
                    "model": record.model,
                })
            );
        }
        Command::Replicate {
            summary_id,
            providers,
        } => {
            let stores = build_document_stores(&http, &providers);
            if stores.is_empty() {
                return Err(anyhow!("no document stores configured"));
            }
            let report = replicate_summary(&db, &stores, summary_id).await?;
            for result in &report.results {
                match &result.outcome {
                    Ok(location) => println!(
                        "{}: ok ({})",
                        result.provider,
                        location.external_url.as_deref().unwrap_or(&location.external_id)
                    ),
                    Err(err) => println!("{}: failed: {}", result.provider, err),
                }
            }
            if !report.succeeded() {
                return Err(anyhow!("replication failed for all requested providers"));
            }
        }
        Command::AddSource {
            owner,
            kind,
            origin,
            metadata,
        } => {
            let kind: SourceKind = kind.parse().map_err(|e: String| anyhow!(e))?;
            let metadata = metadata
                .map(|m| serde_json::from_str(&m))
                .transpose()
                .context("--metadata must be a JSON object")?;
            let id = db.add_source(&owner, kind, &origin, metadata.as_ref()).await?;
            println!("registered source {}", id);
        }
        Command::ListSources => {
            for source in db.list_active_sources().await? {
                println!(
                    "{}\t{}\t{}\t{}\tlast checked: {}",
                    source.id,
                    source.owner,
                    source.kind,
                    source.origin,
                    source.last_checked.as_deref().unwrap_or("never")
                );
            }
        }
        Command::DeactivateSource { source_id } => {
            if db.deactivate_source(source_id).await? {
                println!("deactivated source {}", source_id);
            } else {
                return Err(anyhow!("no such source: {}", source_id));
            }
        }
    }

    Ok(())
}
