use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use lumen_brain::brain::Brain;
use lumen_brain::service::events::EventsClient;
use lumen_brain::service::llm::{create_embedding, create_llm, Embedder};
use lumen_brain::service::retrieval::RetrievalService;
use lumen_brain::service::store::VectorStore;
use lumen_brain::tool::ToolRegistry;
use lumen_core::config::Config;
use lumen_gateway::auth::StaticTokenSessions;
use lumen_gateway::server::{serve, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config_path = std::env::var("LUMEN_CONFIG").unwrap_or_else(|_| "lumen.toml".to_string());

    let config = Config::load(Path::new(&config_path)).unwrap_or_else(|e| {
        tracing::error!("failed to load config: {e}");
        std::process::exit(1);
    });

    if config.llm.provider == "openai" && config.llm.api_key.is_empty() {
        tracing::error!("LUMEN_LLM_API_KEY is not set");
        std::process::exit(1);
    }

    tracing::info!(
        llm = %format!("{}/{}", config.llm.provider, config.llm.model),
        embedding = %format!("{}/{}", config.embedding.provider, config.embedding.model),
        "starting lumen"
    );

    let state = build_state(&config).await.unwrap_or_else(|e| {
        tracing::error!("failed to initialize: {e}");
        std::process::exit(1);
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("shutting down");
    };

    if let Err(e) = serve(&config.server, state, shutdown).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn build_state(config: &Config) -> lumen_core::error::Result<Arc<AppState>> {
    let dims = config.embedding.dimensions;
    let store = Arc::new(if config.database.turso_url.is_empty() {
        VectorStore::new(&config.database.path, dims).await?
    } else {
        VectorStore::new_remote(&config.database.turso_url, &config.database.turso_token, dims)
            .await?
    });

    let embedder = Arc::new(Embedder::new(create_embedding(config)?));
    let retrieval = Arc::new(RetrievalService::new(embedder, store.clone(), &config.retrieval));
    let events = Arc::new(EventsClient::new(&config.events));
    if config.events.api_key.is_empty() {
        tracing::warn!("LUMEN_EVENTS_API_KEY is not set, searchEvents will fail");
    }
    let tools = Arc::new(ToolRegistry::new(retrieval, events));

    let brain = Arc::new(Brain::new(
        create_llm(config)?,
        tools,
        store,
        config.chat.max_steps,
        Duration::from_secs(config.server.max_duration_secs),
    ));

    let sessions = StaticTokenSessions::new(&config.auth);
    if sessions.is_empty() {
        tracing::warn!("no auth tokens configured, every chat request will be rejected");
    }

    Ok(Arc::new(AppState {
        brain,
        sessions: Arc::new(sessions),
    }))
}
