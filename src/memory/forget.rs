//! Delete path: single delete, filtered bulk delete, and full reset.
//!
//! Deleting a record removes it from `memories` but leaves a `delete` row in
//! `memory_history` so its past states stay auditable. Only [`reset_all`]
//! clears history.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::{MemoryError, Result};
use crate::filter::FilterPredicate;
use crate::memory::search::filter_clause;
use crate::memory::store::{append_history, next_timestamp};

/// Delete one record by id.
pub fn delete_memory(conn: &mut Connection, memory_id: &str) -> Result<()> {
    let tx = conn.transaction()?;

    let content: String = tx
        .query_row(
            "SELECT content FROM memories WHERE id = ?1",
            params![memory_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| MemoryError::NotFound(memory_id.to_string()))?;

    append_history(&tx, memory_id, "delete", &content, &next_timestamp(None))?;
    tx.execute("DELETE FROM memories WHERE id = ?1", params![memory_id])?;
    tx.commit()?;

    tracing::debug!(id = %memory_id, "memory deleted");
    Ok(())
}

/// Delete every record matching all `filters`. Returns the number deleted.
///
/// An empty filter set is refused here as well as upstream: it would match the
/// whole collection.
pub fn delete_matching(conn: &mut Connection, filters: &[FilterPredicate]) -> Result<usize> {
    if filters.is_empty() {
        return Err(MemoryError::validation(
            "refusing to delete without at least one filter",
        ));
    }

    let (clause, filter_params) = filter_clause(filters);
    let tx = conn.transaction()?;

    let mut history_params = vec![rusqlite::types::Value::Text(next_timestamp(None))];
    history_params.extend(filter_params.iter().cloned());
    tx.execute(
        &format!(
            "INSERT INTO memory_history (memory_id, operation, content, created_at) \
             SELECT id, 'delete', content, ? FROM memories WHERE {clause} ORDER BY id"
        ),
        params_from_iter(history_params),
    )?;
    let deleted = tx.execute(
        &format!("DELETE FROM memories WHERE {clause}"),
        params_from_iter(filter_params),
    )?;
    tx.commit()?;

    Ok(deleted)
}

/// Remove every record and all history.
pub fn reset_all(conn: &mut Connection) -> Result<usize> {
    let tx = conn.transaction()?;
    let deleted = tx.execute("DELETE FROM memories", [])?;
    tx.execute("DELETE FROM memory_history", [])?;
    tx.commit()?;
    Ok(deleted)
}
