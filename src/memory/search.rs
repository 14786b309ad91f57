//! Read path: point lookups, filtered similarity search, recency listing, and
//! history.
//!
//! Similarity is exact: `vec_distance_cosine` is evaluated in the same
//! statement as the scalar filters, so `LIMIT`/`OFFSET` page over the filtered
//! set rather than over a pre-filtered candidate pool.

use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};

use crate::error::{MemoryError, Result};
use crate::filter::{FilterPredicate, ScalarValue};
use crate::memory::embedding_to_bytes;
use crate::memory::types::{HistoryEntry, HistoryOperation, MemoryHistory, MemoryRecord};
use crate::scope::{ScopeIds, SCOPE_FIELDS};

// ── Row mapping ───────────────────────────────────────────────────────────────

pub(crate) const RECORD_COLUMNS: &str =
    "id, content, user_id, agent_id, run_id, metadata, created_at, updated_at";

/// Map a row selected with [`RECORD_COLUMNS`] (and an optional trailing
/// distance column) into a record.
pub(crate) fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let metadata_str: String = row.get(5)?;
    let metadata: Map<String, Value> = serde_json::from_str(&metadata_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(MemoryRecord {
        id: row.get(0)?,
        text: row.get(1)?,
        scope: ScopeIds {
            user_id: row.get(2)?,
            agent_id: row.get(3)?,
            run_id: row.get(4)?,
        },
        metadata,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        score: None,
    })
}

// ── Filter translation ────────────────────────────────────────────────────────

/// `WHERE` body plus positional parameters for a set of normalized predicates.
///
/// Scope fields compare against their columns. Every other field is looked up
/// in the metadata JSON; type guards keep `"5"` from matching `5` and `true`
/// from matching `1`.
pub(crate) fn filter_clause(filters: &[FilterPredicate]) -> (String, Vec<SqlValue>) {
    let mut clauses = Vec::with_capacity(filters.len());
    let mut params = Vec::new();

    for predicate in filters {
        match predicate {
            FilterPredicate::Eq { field, value } if SCOPE_FIELDS.contains(&field.as_str()) => {
                clauses.push(format!("{field} = ?"));
                params.push(SqlValue::Text(value.as_text()));
            }
            FilterPredicate::Eq { field, value } => {
                let path = json_path(field);
                match value {
                    ScalarValue::Text(s) => {
                        clauses.push(
                            "(json_type(metadata, ?) = 'text' AND json_extract(metadata, ?) = ?)"
                                .into(),
                        );
                        params.push(SqlValue::Text(path.clone()));
                        params.push(SqlValue::Text(path));
                        params.push(SqlValue::Text(s.clone()));
                    }
                    ScalarValue::Bool(b) => {
                        clauses.push("json_type(metadata, ?) = ?".into());
                        params.push(SqlValue::Text(path));
                        params.push(SqlValue::Text(if *b { "true" } else { "false" }.into()));
                    }
                    ScalarValue::Integer(i) => {
                        clauses.push(numeric_guard("= ?"));
                        params.push(SqlValue::Text(path.clone()));
                        params.push(SqlValue::Text(path));
                        params.push(SqlValue::Integer(*i));
                    }
                    ScalarValue::Float(f) => {
                        clauses.push(numeric_guard("= ?"));
                        params.push(SqlValue::Text(path.clone()));
                        params.push(SqlValue::Text(path));
                        params.push(SqlValue::Real(*f));
                    }
                }
            }
            FilterPredicate::Range { field, gte, lte } => {
                let path = json_path(field);
                for (op, bound) in [(">= ?", gte), ("<= ?", lte)] {
                    if let Some(bound) = bound {
                        clauses.push(numeric_guard(op));
                        params.push(SqlValue::Text(path.clone()));
                        params.push(SqlValue::Text(path.clone()));
                        params.push(SqlValue::Real(*bound));
                    }
                }
            }
        }
    }

    (clauses.join(" AND "), params)
}

fn numeric_guard(comparison: &str) -> String {
    format!(
        "(json_type(metadata, ?) IN ('integer', 'real') AND json_extract(metadata, ?) {comparison})"
    )
}

/// Field names are validated free of quotes and backslashes upstream.
fn json_path(field: &str) -> String {
    format!("$.\"{field}\"")
}

fn where_sql(clause: &str) -> String {
    if clause.is_empty() {
        String::new()
    } else {
        format!("WHERE {clause}")
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Fetch one live record.
pub fn get_memory(conn: &Connection, id: &str) -> Result<MemoryRecord> {
    find_memory(conn, id)?.ok_or_else(|| MemoryError::NotFound(id.to_string()))
}

pub(crate) fn find_memory(conn: &Connection, id: &str) -> Result<Option<MemoryRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM memories WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], row_to_record).optional()?)
}

/// Counts past `i64::MAX` cannot match any row, so they saturate.
fn sql_count(n: usize) -> SqlValue {
    SqlValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Filtered similarity search ordered by cosine distance, then id.
///
/// `score` on each record is the cosine similarity (`1 - distance`).
pub fn search_memories(
    conn: &Connection,
    embedding: &[f32],
    filters: &[FilterPredicate],
    limit: usize,
    offset: usize,
) -> Result<Vec<MemoryRecord>> {
    let (clause, filter_params) = filter_clause(filters);
    let sql = format!(
        "SELECT {RECORD_COLUMNS}, COALESCE(vec_distance_cosine(embedding, ?), 1.0) AS distance \
         FROM memories {} ORDER BY distance ASC, id ASC LIMIT ? OFFSET ?",
        where_sql(&clause)
    );

    let mut all_params = Vec::with_capacity(filter_params.len() + 3);
    all_params.push(SqlValue::Blob(embedding_to_bytes(embedding).to_vec()));
    all_params.extend(filter_params);
    all_params.push(sql_count(limit));
    all_params.push(sql_count(offset));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(all_params), |row| {
            let mut record = row_to_record(row)?;
            let distance: f64 = row.get(8)?;
            record.score = Some(1.0 - distance);
            Ok(record)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Filtered listing ordered by recency (`created_at` then id, both descending).
pub fn list_memories(
    conn: &Connection,
    filters: &[FilterPredicate],
    limit: usize,
    offset: usize,
) -> Result<Vec<MemoryRecord>> {
    let (clause, mut all_params) = filter_clause(filters);
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM memories {} \
         ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        where_sql(&clause)
    );
    all_params.push(sql_count(limit));
    all_params.push(sql_count(offset));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(all_params), row_to_record)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Number of live records matching `filters`.
pub fn count_memories(conn: &Connection, filters: &[FilterPredicate]) -> Result<usize> {
    let (clause, params) = filter_clause(filters);
    let sql = format!("SELECT COUNT(*) FROM memories {}", where_sql(&clause));
    let count: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
    Ok(count as usize)
}

/// Stored history rows for an id, oldest first. Rows outlive the record.
pub fn history_log(conn: &Connection, id: &str) -> Result<Vec<HistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT content, operation, created_at FROM memory_history \
         WHERE memory_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map(params![id], |row| {
            let op: String = row.get(1)?;
            let operation = op.parse::<HistoryOperation>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into())
            })?;
            Ok(HistoryEntry {
                text: row.get(0)?,
                operation,
                timestamp: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// History of a live record with its current state appended last.
pub fn memory_history(conn: &Connection, id: &str) -> Result<MemoryHistory> {
    let current = get_memory(conn, id)?;
    let mut history = history_log(conn, id)?;
    history.push(HistoryEntry {
        text: current.text,
        operation: HistoryOperation::Current,
        timestamp: current.updated_at,
    });
    Ok(MemoryHistory {
        memory_id: id.to_string(),
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, EmbeddingSpec};
    use crate::memory::store::insert_memory;
    use crate::memory::types::NewMemory;
    use serde_json::json;

    fn test_db() -> Connection {
        open_memory_database(&EmbeddingSpec {
            model: "test".into(),
            dimensions: 4,
        })
        .unwrap()
    }

    fn unit(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 4];
        v[axis] = 1.0;
        v
    }

    fn add(conn: &mut Connection, text: &str, axis: usize, user: &str, metadata: Value) -> String {
        let Value::Object(metadata) = metadata else {
            panic!("metadata must be an object")
        };
        insert_memory(
            conn,
            NewMemory {
                text: text.into(),
                embedding: unit(axis),
                scope: ScopeIds::user(user),
                metadata,
            },
        )
        .unwrap()
        .id
    }

    fn eq(field: &str, value: ScalarValue) -> FilterPredicate {
        FilterPredicate::eq(field, value)
    }

    #[test]
    fn get_missing_is_not_found() {
        let conn = test_db();
        let err = get_memory(&conn, "nope").unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[test]
    fn search_orders_by_similarity_with_scores() {
        let mut conn = test_db();
        let near = add(&mut conn, "near", 0, "u1", json!({}));
        let far = add(&mut conn, "far", 1, "u1", json!({}));

        let results = search_memories(&conn, &unit(0), &[], 10, 0).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, near);
        assert_eq!(results[1].id, far);
        assert!((results[0].score.unwrap() - 1.0).abs() < 1e-6);
        assert!(results[1].score.unwrap().abs() < 1e-6);
    }

    #[test]
    fn scope_filter_excludes_other_users() {
        let mut conn = test_db();
        add(&mut conn, "mine", 0, "u1", json!({}));
        add(&mut conn, "theirs", 0, "u2", json!({}));

        let filters = [eq("user_id", ScalarValue::Text("u1".into()))];
        let results = search_memories(&conn, &unit(0), &filters, 10, 0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "mine");
    }

    #[test]
    fn metadata_equality_is_type_strict() {
        let mut conn = test_db();
        add(&mut conn, "numeric", 0, "u", json!({"priority": 5}));
        add(&mut conn, "textual", 0, "u", json!({"priority": "5"}));
        add(&mut conn, "flag", 0, "u", json!({"pinned": true}));
        add(&mut conn, "one", 0, "u", json!({"pinned": 1}));

        let by_int = list_memories(&conn, &[eq("priority", ScalarValue::Integer(5))], 10, 0).unwrap();
        assert_eq!(by_int.len(), 1);
        assert_eq!(by_int[0].text, "numeric");

        let by_text = list_memories(&conn, &[eq("priority", ScalarValue::Text("5".into()))], 10, 0)
            .unwrap();
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].text, "textual");

        let by_bool = list_memories(&conn, &[eq("pinned", ScalarValue::Bool(true))], 10, 0).unwrap();
        assert_eq!(by_bool.len(), 1);
        assert_eq!(by_bool[0].text, "flag");
    }

    #[test]
    fn range_filter_is_inclusive_and_numeric_only() {
        let mut conn = test_db();
        for (i, age) in [json!(1), json!(5), json!(10), json!(11), json!("7")]
            .into_iter()
            .enumerate()
        {
            add(&mut conn, &format!("r{i}"), 0, "u", json!({ "age": age }));
        }

        let filters = [FilterPredicate::Range {
            field: "age".into(),
            gte: Some(1.0),
            lte: Some(10.0),
        }];
        let mut texts: Vec<_> = list_memories(&conn, &filters, 10, 0)
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        texts.sort();
        assert_eq!(texts, vec!["r0", "r1", "r2"]);
        assert_eq!(count_memories(&conn, &filters).unwrap(), 3);
    }

    #[test]
    fn list_is_newest_first() {
        let mut conn = test_db();
        let first = add(&mut conn, "first", 0, "u", json!({}));
        let second = add(&mut conn, "second", 1, "u", json!({}));

        let results = list_memories(&conn, &[], 10, 0).unwrap();
        assert_eq!(results[0].id, second);
        assert_eq!(results[1].id, first);
        assert!(results.iter().all(|r| r.score.is_none()));
    }

    #[test]
    fn offset_pages_over_filtered_rows() {
        let mut conn = test_db();
        for i in 0..5 {
            add(&mut conn, &format!("u1-{i}"), i % 4, "u1", json!({}));
            add(&mut conn, &format!("u2-{i}"), i % 4, "u2", json!({}));
        }
        let filters = [eq("user_id", ScalarValue::Text("u1".into()))];
        let page = search_memories(&conn, &unit(0), &filters, 3, 4).unwrap();
        assert_eq!(page.len(), 1);
        assert!(page[0].text.starts_with("u1-"));
    }

    #[test]
    fn history_appends_current_state() {
        let mut conn = test_db();
        let id = add(&mut conn, "only", 0, "u", json!({}));
        let history = memory_history(&conn, &id).unwrap();
        assert_eq!(history.memory_id, id);
        assert_eq!(history.history.len(), 1);
        assert_eq!(history.history[0].operation, HistoryOperation::Current);
        assert_eq!(history.history[0].text, "only");
    }

    #[test]
    fn filter_clause_counts_parameters() {
        let filters = [
            eq("user_id", ScalarValue::Text("u".into())),
            eq("project", ScalarValue::Text("p".into())),
            FilterPredicate::Range {
                field: "age".into(),
                gte: Some(1.0),
                lte: None,
            },
        ];
        let (clause, params) = filter_clause(&filters);
        assert_eq!(clause.matches('?').count(), params.len());
        assert!(clause.starts_with("user_id = ?"));
    }
}
