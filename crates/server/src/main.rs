//! DocResearch Server
//!
//! Axum server and CLI fronting the research controller from crates/core.

mod api;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docresearch_core::gateway::LanguageModel;
use docresearch_core::memory::ConversationHistory;
use docresearch_core::models::{LlmProvider, ModelConfig};
use docresearch_core::swarm::{ResearchConfig, ResearchController, ResearchEvent};
use docresearch_core::tools::{CorpusHandle, DocumentStore, KeywordIndex, SourceDocument};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc, RwLock},
};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

const CONFIG_PATH: &str = ".docresearch/config.json";
const ENV_PATH: &str = ".docresearch/.env";

/// Application state
pub struct AppState {
    pub config: ResearchConfig,
    pub model: Arc<dyn LanguageModel>,
    pub index: Arc<KeywordIndex>,
    pub session: RwLock<SessionState>,
    pub event_tx: broadcast::Sender<ResearchEvent>,
}

/// Corpus, controller and conversation of the current client
#[derive(Default)]
pub struct SessionState {
    pub corpus: Option<CorpusHandle>,
    pub controller: Option<Arc<ResearchController>>,
    pub document_count: usize,
    pub history: ConversationHistory,
    /// Set while a research call is in flight
    pub running: Option<ActiveResearch>,
    /// Ids handed to research calls so far
    pub runs: u64,
}

/// The research call currently holding the session
pub struct ActiveResearch {
    pub id: u64,
    pub cancel: CancellationToken,
}

impl SessionState {
    /// Claim the session for a new research call
    pub fn begin_research(&mut self) -> ActiveResearch {
        self.runs += 1;
        let cancel = CancellationToken::new();
        self.running = Some(ActiveResearch {
            id: self.runs,
            cancel: cancel.clone(),
        });
        ActiveResearch { id: self.runs, cancel }
    }

    /// Release the session if call `id` still holds it
    pub fn finish_research(&mut self, id: u64) -> bool {
        if self.running.as_ref().is_some_and(|active| active.id == id) {
            self.running = None;
            return true;
        }
        false
    }
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: ResearchConfig, model: Arc<dyn LanguageModel>) -> Self {
        let (event_tx, _) = broadcast::channel::<ResearchEvent>(100);
        let index = Arc::new(KeywordIndex::new().with_top_k(config.retrieval_top_k));
        Self {
            config,
            model,
            index,
            session: RwLock::new(SessionState::default()),
            event_tx,
        }
    }

    /// Controller over `corpus` whose events are bridged to the broadcast channel
    pub fn controller_for(&self, corpus: CorpusHandle) -> anyhow::Result<ResearchController> {
        let (tx, mut rx) = mpsc::channel::<ResearchEvent>(100);
        let broadcast_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let _ = broadcast_tx.send(event);
            }
        });

        let controller = ResearchController::new(
            self.config.clone(),
            self.model.clone(),
            self.index.clone(),
            corpus,
        )?
        .with_event_channel(tx);
        Ok(controller)
    }
}

#[derive(Parser, Clone)]
#[command(author, version, about = "DocResearch - Iterative document research")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,

    /// Provider id (http, anthropic, openai, gemini, openrouter, grok, deepseek)
    #[arg(long, global = true)]
    provider: Option<String>,
    /// Model name
    #[arg(long, global = true)]
    model: Option<String>,
    /// Chat-completions endpoint
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Config file (JSON)
    #[arg(long, global = true, default_value = CONFIG_PATH)]
    config: String,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the DocResearch server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Research one question against a corpus file, no server
    Ask {
        /// JSON array of documents ({source_id, title, summary, passages})
        #[arg(short, long)]
        corpus: String,
        /// The question
        query: String,
    },
}

// === Config ===

/// Persisted configuration, merged over `ResearchConfig::default()`
#[derive(Debug, Clone, Serialize, Deserialize, Default, ToSchema)]
pub struct PersistedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sufficiency_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_subqueries_per_iteration: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retrieval_top_k: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gateway_timeout_secs: Option<u64>,
}

impl PersistedConfig {
    async fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn merge(&mut self, other: PersistedConfig) {
        if other.provider.is_some() {
            self.provider = other.provider;
        }
        if other.model.is_some() {
            self.model = other.model;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.api_key_env.is_some() {
            self.api_key_env = other.api_key_env;
        }
        if other.max_iterations.is_some() {
            self.max_iterations = other.max_iterations;
        }
        if other.sufficiency_threshold.is_some() {
            self.sufficiency_threshold = other.sufficiency_threshold;
        }
        if other.max_subqueries_per_iteration.is_some() {
            self.max_subqueries_per_iteration = other.max_subqueries_per_iteration;
        }
        if other.retrieval_top_k.is_some() {
            self.retrieval_top_k = other.retrieval_top_k;
        }
        if other.session_timeout_ms.is_some() {
            self.session_timeout_ms = other.session_timeout_ms;
        }
        if other.gateway_timeout_secs.is_some() {
            self.gateway_timeout_secs = other.gateway_timeout_secs;
        }
    }

    fn into_research_config(self) -> anyhow::Result<ResearchConfig> {
        let mut config = ResearchConfig::default();

        if let Some(id) = &self.provider {
            let provider = LlmProvider::from_id(id)
                .with_context(|| format!("Unknown provider '{}'", id))?;
            if provider != config.gateway.model.provider {
                let model = provider.default_model();
                config.gateway.model = ModelConfig::with_provider(provider, model);
            }
        }
        if let Some(model) = self.model {
            config.gateway.model.model = model;
        }
        if let Some(url) = self.base_url {
            config.gateway.model.base_url = Some(url);
        }
        if let Some(env) = self.api_key_env {
            config.gateway.model.api_key_env = Some(env);
        }
        if let Some(secs) = self.gateway_timeout_secs {
            config.gateway.timeout_secs = secs;
        }
        if let Some(n) = self.max_iterations {
            config.max_iterations = n;
        }
        if let Some(t) = self.sufficiency_threshold {
            config.sufficiency_threshold = t;
        }
        if let Some(n) = self.max_subqueries_per_iteration {
            config.max_subqueries_per_iteration = n;
        }
        if let Some(k) = self.retrieval_top_k {
            config.retrieval_top_k = k;
        }
        if self.session_timeout_ms.is_some() {
            config.session_timeout_ms = self.session_timeout_ms;
        }

        config.validate().context("Invalid research configuration")?;
        Ok(config)
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))
}

async fn load_config(args: &Args) -> anyhow::Result<ResearchConfig> {
    let mut persisted = PersistedConfig::load(Path::new(&args.config)).await;
    persisted.merge(PersistedConfig {
        provider: args.provider.clone(),
        model: args.model.clone(),
        base_url: args.base_url.clone(),
        ..PersistedConfig::default()
    });
    persisted.into_research_config()
}

/// Read a corpus file: a JSON array of documents
async fn read_corpus(path: &Path) -> anyhow::Result<Vec<SourceDocument>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read corpus {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid corpus {}", path.display()))
}

async fn ask(config: ResearchConfig, corpus_path: &str, query: &str) -> anyhow::Result<()> {
    let documents = read_corpus(Path::new(corpus_path)).await?;
    let model = config.gateway.create_model()?;
    let index = Arc::new(KeywordIndex::new().with_top_k(config.retrieval_top_k));
    let corpus = index.add_documents(documents).await?;
    let controller = ResearchController::new(config, model, index, corpus)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let report = controller
        .research_with_cancellation(query, &ConversationHistory::new(), &cancel)
        .await?;

    println!("{}\n", report.body);
    for citation in &report.citations {
        println!("[{}] {} (relevance {:.2})", citation.index, citation.source_id, citation.relevance);
    }
    println!(
        "\nstatus: {:?}, iterations: {}, evidence items: {}",
        report.status,
        report.iterations,
        report.evidence.len()
    );
    Ok(())
}

// === Server Entry ===

pub async fn run_server(config: ResearchConfig, port: u16) -> anyhow::Result<()> {
    let model = config.gateway.create_model()?;
    tracing::info!(model = %model.name(), "Language model backend ready");

    let state: SharedState = Arc::new(AppState::new(config, model));
    let app = api::router().with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("DocResearch server running at http://{}", addr);
    tracing::info!("API v1 routes: /health, /status, /documents, /research, /research/cancel, /reset, /events, /providers, /openapi.json");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = dotenvy::from_path(ENV_PATH);
    init_tracing()?;

    let args = Args::parse();
    let config = load_config(&args).await?;

    match args.command {
        Some(CliCommand::Ask { corpus, query }) => ask(config, &corpus, &query).await,
        Some(CliCommand::Serve { port }) => run_server(config, port).await,
        None => run_server(config, 8080).await,
    }
}
