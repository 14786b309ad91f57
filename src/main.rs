mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use memory_mcp::config::AppConfig;
use memory_mcp::scope::ScopeIds;
use memory_mcp::server::{self, Transport};

#[derive(Parser)]
#[command(name = "memory-mcp", version, about = "Long-term memory MCP server for AI agents")]
struct Cli {
    /// Config file (default: ~/.memory-mcp/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Override server.transport
        #[arg(long, value_enum)]
        transport: Option<Transport>,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Search memories from the terminal
    Search {
        query: String,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        agent_id: Option<String>,
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show how a memory changed, including deleted memories
    History { memory_id: String },
    /// Delete all memories (asks for confirmation)
    Reset,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to the configured cache directory
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    // stdout carries MCP JSON-RPC on the stdio transport; logs go to stderr.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            if let Some(transport) = transport {
                config.server.transport = match transport {
                    Transport::Stdio => "stdio",
                    Transport::Http => "http",
                }
                .into();
            }
            server::serve(config).await?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
        Command::Search {
            query,
            user_id,
            agent_id,
            run_id,
            limit,
        } => {
            let scope = ScopeIds::new(user_id, agent_id, run_id);
            cli::search::search(&config, &query, scope, limit).await?;
        }
        Command::History { memory_id } => {
            cli::history::history(&config, &memory_id).await?;
        }
        Command::Reset => {
            cli::reset::reset(&config).await?;
        }
    }

    Ok(())
}
