//! Write path: insert, in-place update with history, and nearest-neighbour
//! lookup used by fact merging.
//!
//! Every write runs in its own transaction. Timestamps are RFC 3339 UTC with
//! microsecond precision and never go backwards: a new record's `created_at`
//! sorts after every existing one, and `updated_at` strictly increases per
//! record.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::{MemoryError, Result};
use crate::memory::embedding_to_bytes;
use crate::memory::search::find_memory;
use crate::memory::types::{MemoryRecord, MemoryUpdate, NearestMatch, NewMemory};
use crate::scope::ScopeIds;

/// Insert a new record and return it as stored.
pub fn insert_memory(conn: &mut Connection, new: NewMemory) -> Result<MemoryRecord> {
    let tx = conn.transaction()?;

    let latest: Option<String> =
        tx.query_row("SELECT MAX(created_at) FROM memories", [], |row| row.get(0))?;
    let now = next_timestamp(latest.as_deref());
    let id = uuid::Uuid::now_v7().to_string();
    let metadata_json = serde_json::to_string(&new.metadata)?;

    tx.execute(
        "INSERT INTO memories (id, content, embedding, user_id, agent_id, run_id, metadata, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            id,
            new.text,
            embedding_to_bytes(&new.embedding),
            new.scope.user_id,
            new.scope.agent_id,
            new.scope.run_id,
            metadata_json,
            now,
        ],
    )?;
    tx.commit()?;

    tracing::debug!(id = %id, "memory inserted");
    Ok(MemoryRecord {
        id,
        text: new.text,
        scope: new.scope,
        metadata: new.metadata,
        created_at: now.clone(),
        updated_at: now,
        score: None,
    })
}

/// Replace a record's text (and optionally metadata), appending the prior text
/// to its history. Id, scope and `created_at` are never touched.
pub fn update_memory(conn: &mut Connection, id: &str, update: MemoryUpdate) -> Result<MemoryRecord> {
    let tx = conn.transaction()?;

    let (prior_text, prior_updated): (String, String) = tx
        .query_row(
            "SELECT content, updated_at FROM memories WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

    let now = next_timestamp(Some(&prior_updated));
    append_history(&tx, id, "update", &prior_text, &now)?;

    tx.execute(
        "UPDATE memories SET content = ?1, embedding = ?2, updated_at = ?3 WHERE id = ?4",
        params![update.text, embedding_to_bytes(&update.embedding), now, id],
    )?;
    if let Some(metadata) = &update.metadata {
        tx.execute(
            "UPDATE memories SET metadata = ?1 WHERE id = ?2",
            params![serde_json::to_string(metadata)?, id],
        )?;
    }

    let record = find_memory(&tx, id)?.ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
    tx.commit()?;

    tracing::debug!(id = %id, "memory updated");
    Ok(record)
}

/// Closest record sharing exactly this scope triple (absent ids match only
/// absent ids).
pub fn nearest_in_scope(
    conn: &Connection,
    embedding: &[f32],
    scope: &ScopeIds,
) -> Result<Option<NearestMatch>> {
    let nearest = conn
        .query_row(
            "SELECT id, content, COALESCE(vec_distance_cosine(embedding, ?1), 1.0) AS distance \
             FROM memories \
             WHERE user_id IS ?2 AND agent_id IS ?3 AND run_id IS ?4 \
             ORDER BY distance ASC, id ASC LIMIT 1",
            params![
                embedding_to_bytes(embedding),
                scope.user_id,
                scope.agent_id,
                scope.run_id,
            ],
            |row| {
                let distance: f64 = row.get(2)?;
                Ok(NearestMatch {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    similarity: 1.0 - distance,
                })
            },
        )
        .optional()?;
    Ok(nearest)
}

/// Append one row to `memory_history`.
pub(crate) fn append_history(
    tx: &Transaction<'_>,
    memory_id: &str,
    operation: &str,
    content: &str,
    timestamp: &str,
) -> Result<()> {
    tx.execute(
        "INSERT INTO memory_history (memory_id, operation, content, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![memory_id, operation, content, timestamp],
    )?;
    Ok(())
}

/// Current time, or one microsecond after `previous` when the clock has not
/// moved past it.
pub(crate) fn next_timestamp(previous: Option<&str>) -> String {
    let now = Utc::now();
    let floor = previous
        .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
        .map(|p| p.with_timezone(&Utc) + Duration::microseconds(1));
    let ts = match floor {
        Some(floor) if floor > now => floor,
        _ => now,
    };
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
