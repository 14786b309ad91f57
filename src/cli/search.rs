use anyhow::Result;

use memory_mcp::config::AppConfig;
use memory_mcp::engine::SearchRequest;
use memory_mcp::scope::ScopeIds;

/// Run a semantic search from the terminal.
pub async fn search(
    config: &AppConfig,
    query: &str,
    scope: ScopeIds,
    limit: Option<usize>,
) -> Result<()> {
    let engine = super::open_engine(config)?;
    let page = engine.page(limit, None, config.memory.search_limit)?;
    let results = engine
        .search(SearchRequest {
            query: query.to_string(),
            scope,
            filters: Vec::new(),
            page,
        })
        .await?;

    if results.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", results.count);
    for (i, record) in results.results.iter().enumerate() {
        let preview: String = if record.text.chars().count() > 120 {
            format!("{}...", record.text.chars().take(120).collect::<String>())
        } else {
            record.text.clone()
        };
        let owner = record
            .scope
            .iter()
            .map(|(field, value)| format!("{field}={value}"))
            .collect::<Vec<_>>()
            .join(" ");

        println!(
            "  {}. {} (score: {:.4}) {}",
            i + 1,
            record.id,
            record.score.unwrap_or_default(),
            owner
        );
        println!("     {preview}");
        println!();
    }
    if results.has_more {
        println!("More results available; raise --limit to see them.");
    }

    Ok(())
}
