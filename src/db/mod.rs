pub mod schema;

use rusqlite::{Connection, ErrorCode};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use crate::error::{MemoryError, Result};

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Embedding shape a store was created for. Recorded in `schema_meta` on first
/// open and checked on every later open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingSpec {
    pub model: String,
    pub dimensions: usize,
}

/// Open (or create) the memory database at the given path.
///
/// The connection takes an exclusive file lock for its whole lifetime. A second
/// process pointing at the same file fails immediately with
/// [`MemoryError::StoreUnavailable`] instead of waiting or sharing the file.
pub fn open_database(path: impl AsRef<Path>, spec: &EmbeddingSpec) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            MemoryError::StoreUnavailable(format!(
                "failed to create directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::ZERO)?;
    conn.pragma_update_and_check(None, "locking_mode", "EXCLUSIVE", |row| {
        row.get::<_, String>(0)
    })?;

    if let Err(e) = conn.execute_batch("BEGIN EXCLUSIVE") {
        if is_lock_conflict(&e) {
            return Err(MemoryError::StoreUnavailable(format!(
                "{} is in use by another process; run a single server with \
                 `--transport http` and point every client at it",
                path.display()
            )));
        }
        return Err(e.into());
    }
    initialize(&conn, spec)?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an ephemeral in-memory database.
pub fn open_memory_database(spec: &EmbeddingSpec) -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("BEGIN EXCLUSIVE")?;
    initialize(&conn, spec)?;
    Ok(conn)
}

/// Create the schema and check the embedding shape inside the already-open
/// exclusive transaction. Under `locking_mode=EXCLUSIVE` the file lock is kept
/// after commit.
fn initialize(conn: &Connection, spec: &EmbeddingSpec) -> Result<()> {
    let result = schema::init_schema(conn)
        .map_err(MemoryError::from)
        .and_then(|()| check_embedding_spec(conn, spec));
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn check_embedding_spec(conn: &Connection, spec: &EmbeddingSpec) -> Result<()> {
    let stored_dims = schema::get_meta(conn, "embedding_dims")?;
    let stored_model = schema::get_meta(conn, "embedding_model")?;

    match stored_dims {
        None => {
            schema::set_meta(conn, "embedding_dims", &spec.dimensions.to_string())?;
            schema::set_meta(conn, "embedding_model", &spec.model)?;
        }
        Some(dims) if dims != spec.dimensions.to_string() => {
            return Err(MemoryError::Config(format!(
                "store holds {dims}-dimension embeddings from '{}' but the configured \
                 embedding provider produces {} dimensions",
                stored_model.unwrap_or_default(),
                spec.dimensions
            )));
        }
        Some(_) => {
            if stored_model.as_deref() != Some(spec.model.as_str()) {
                tracing::warn!(
                    stored = stored_model.as_deref().unwrap_or(""),
                    configured = %spec.model,
                    "embedding model changed; similarity against older memories may degrade"
                );
                schema::set_meta(conn, "embedding_model", &spec.model)?;
            }
        }
    }
    Ok(())
}

/// `true` when a raw SQLite error is a lock conflict.
pub fn is_lock_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}
