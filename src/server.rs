//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! [`build_engine`] resolves the configured store, embedder, extractor and
//! prompt into one shared [`MemoryEngine`]; [`serve`] hands it to the
//! configured transport.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::StreamableHttpService;
use rmcp::ServiceExt;

use crate::config::AppConfig;
use crate::db::EmbeddingSpec;
use crate::embedding::{self, EmbeddingProvider};
use crate::engine::{EngineSettings, MemoryEngine};
use crate::extraction;
use crate::memory::{self, MemoryStore};
use crate::prompt::PromptSelector;
use crate::tools::MemoryTools;

/// Transports selectable by `server.transport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Transport {
    Stdio,
    Http,
}

impl std::str::FromStr for Transport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" | "sse" | "streamable-http" => Ok(Self::Http),
            other => anyhow::bail!("unknown transport '{other}'. Supported: stdio, http"),
        }
    }
}

/// Open the configured store for vectors of `embedder`'s shape.
pub fn open_store(
    config: &AppConfig,
    embedder: &dyn EmbeddingProvider,
) -> Result<Arc<dyn MemoryStore>> {
    let spec = EmbeddingSpec {
        model: embedder.model_name().to_string(),
        dimensions: embedder.dimensions(),
    };
    let store = memory::create_store(&config.storage, &spec).context("failed to open memory store")?;
    tracing::info!(
        provider = %config.storage.provider,
        db = %config.resolved_db_path().display(),
        "memory store ready"
    );
    Ok(store)
}

/// Open the store and construct every provider. Fails fast on configuration
/// problems and on a store held by another process.
pub fn build_engine(config: &AppConfig) -> Result<Arc<MemoryEngine>> {
    let embedder = embedding::create_provider(&config.embedding)
        .context("failed to initialise embedding provider")?;
    let store = open_store(config, embedder.as_ref())?;

    let extractor = extraction::create_extractor(&config.llm)
        .context("failed to initialise fact extractor")?;
    let prompt = PromptSelector::from_config(&config.prompt)?;
    tracing::info!(source = ?prompt.source(), "extraction prompt selected");

    let engine = MemoryEngine::new(
        store,
        embedder,
        extractor,
        prompt,
        EngineSettings::from(&config.memory),
    )?;
    Ok(Arc::new(engine))
}

/// Start the server on the transport named by the config.
pub async fn serve(config: AppConfig) -> Result<()> {
    match config.server.transport.parse::<Transport>()? {
        Transport::Stdio => serve_stdio(config).await,
        Transport::Http => serve_http(config).await,
    }
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: AppConfig) -> Result<()> {
    tracing::info!("starting memory MCP server on stdio");

    let engine = build_engine(&config)?;
    let tools = MemoryTools::new(engine);

    let server = tools.serve(rmcp::transport::stdio()).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over streamable HTTP. One process owns the store and
/// any number of clients connect to `/mcp`.
pub async fn serve_http(config: AppConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting memory MCP server on HTTP");

    let engine = build_engine(&config)?;

    let service = StreamableHttpService::new(
        move || Ok(MemoryTools::new(Arc::clone(&engine))),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
