use anyhow::Result;

use memory_mcp::config::AppConfig;
use memory_mcp::error::MemoryError;

/// Print a memory's change log, including memories that were deleted.
pub async fn history(config: &AppConfig, memory_id: &str) -> Result<()> {
    let engine = super::open_engine(config)?;

    let current = match engine.get(memory_id).await {
        Ok(record) => Some(record),
        Err(MemoryError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };
    let log = engine.history_log(memory_id).await?;

    if current.is_none() && log.is_empty() {
        anyhow::bail!("no memory or history found for {memory_id}");
    }

    println!("History for {memory_id}\n");
    for entry in &log {
        println!("  {}  {:<7} {}", entry.timestamp, entry.operation.as_str(), entry.text);
    }
    match current {
        Some(record) => println!("  {}  {:<7} {}", record.updated_at, "current", record.text),
        None => println!("\n  (memory has been deleted)"),
    }

    Ok(())
}
