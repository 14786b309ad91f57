//! CLI `reset` command: delete all memories after user confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use memory_mcp::config::AppConfig;

/// Delete all memories and their history after user confirmation.
pub async fn reset(config: &AppConfig) -> Result<()> {
    println!("WARNING: This will permanently delete ALL memories and their history.");
    println!("Database: {}", config.resolved_db_path().display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    let engine = super::open_engine(config)?;
    let deleted = engine.reset().await?;

    println!("Deleted {deleted} memories. Database reset complete.");
    Ok(())
}
