//! The store capability and its SQLite implementation.
//!
//! [`MemoryStore`] is synchronous; async callers go through
//! `tokio::task::spawn_blocking`. [`SqliteStore`] serializes access to its one
//! connection with a mutex that is held only for the duration of a single call.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::{expand_tilde, StorageConfig};
use crate::db::{self, EmbeddingSpec};
use crate::error::{MemoryError, Result};
use crate::filter::FilterPredicate;
use crate::memory::types::{
    HistoryEntry, MemoryHistory, MemoryRecord, MemoryUpdate, NearestMatch, NewMemory,
};
use crate::memory::{forget, search, store};
use crate::scope::ScopeIds;

/// Upsert/query/delete by id, vector similarity, and scalar filter.
pub trait MemoryStore: Send + Sync {
    fn insert(&self, new: NewMemory) -> Result<MemoryRecord>;
    fn update(&self, id: &str, update: MemoryUpdate) -> Result<MemoryRecord>;
    fn get(&self, id: &str) -> Result<MemoryRecord>;
    fn exists(&self, id: &str) -> Result<bool>;
    /// Nearest record with exactly this scope triple.
    fn nearest(&self, embedding: &[f32], scope: &ScopeIds) -> Result<Option<NearestMatch>>;
    /// Similarity-ordered rows `offset..offset + limit` matching all filters.
    fn search(
        &self,
        embedding: &[f32],
        filters: &[FilterPredicate],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryRecord>>;
    /// Recency-ordered rows `offset..offset + limit` matching all filters.
    fn list(
        &self,
        filters: &[FilterPredicate],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryRecord>>;
    fn count(&self, filters: &[FilterPredicate]) -> Result<usize>;
    fn delete(&self, id: &str) -> Result<()>;
    fn delete_matching(&self, filters: &[FilterPredicate]) -> Result<usize>;
    /// History of a live record, current state last.
    fn history(&self, id: &str) -> Result<MemoryHistory>;
    /// Stored history rows, including those of deleted records.
    fn history_log(&self, id: &str) -> Result<Vec<HistoryEntry>>;
    /// Drop every record and all history. Returns the number of records removed.
    fn reset(&self) -> Result<usize>;
    /// Embedding width the store was opened with.
    fn dimensions(&self) -> usize;
}

/// Store backends selectable by `storage.provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Local SQLite file, exclusively locked by this process.
    Sqlite,
    /// In-memory SQLite, gone when the process exits.
    Memory,
}

impl FromStr for StoreKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(MemoryError::Config(format!(
                "unknown storage provider '{other}' (expected 'sqlite' or 'memory')"
            ))),
        }
    }
}

/// Build the configured store.
pub fn create_store(config: &StorageConfig, spec: &EmbeddingSpec) -> Result<Arc<dyn MemoryStore>> {
    let store = match config.provider.parse::<StoreKind>()? {
        StoreKind::Sqlite => SqliteStore::open(expand_tilde(&config.db_path), spec)?,
        StoreKind::Memory => {
            tracing::warn!("using in-memory store; memories are lost on exit");
            SqliteStore::open_in_memory(spec)?
        }
    };
    Ok(Arc::new(store))
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    dimensions: usize,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, spec: &EmbeddingSpec) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(db::open_database(path, spec)?),
            dimensions: spec.dimensions,
        })
    }

    pub fn open_in_memory(spec: &EmbeddingSpec) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(db::open_memory_database(spec)?),
            dimensions: spec.dimensions,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MemoryError::Internal(format!("db lock poisoned: {e}")))
    }
}

impl MemoryStore for SqliteStore {
    fn insert(&self, new: NewMemory) -> Result<MemoryRecord> {
        store::insert_memory(&mut *self.lock()?, new)
    }

    fn update(&self, id: &str, update: MemoryUpdate) -> Result<MemoryRecord> {
        store::update_memory(&mut *self.lock()?, id, update)
    }

    fn get(&self, id: &str) -> Result<MemoryRecord> {
        search::get_memory(&*self.lock()?, id)
    }

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(search::find_memory(&*self.lock()?, id)?.is_some())
    }

    fn nearest(&self, embedding: &[f32], scope: &ScopeIds) -> Result<Option<NearestMatch>> {
        store::nearest_in_scope(&*self.lock()?, embedding, scope)
    }

    fn search(
        &self,
        embedding: &[f32],
        filters: &[FilterPredicate],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryRecord>> {
        search::search_memories(&*self.lock()?, embedding, filters, limit, offset)
    }

    fn list(
        &self,
        filters: &[FilterPredicate],
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryRecord>> {
        search::list_memories(&*self.lock()?, filters, limit, offset)
    }

    fn count(&self, filters: &[FilterPredicate]) -> Result<usize> {
        search::count_memories(&*self.lock()?, filters)
    }

    fn delete(&self, id: &str) -> Result<()> {
        forget::delete_memory(&mut *self.lock()?, id)
    }

    fn delete_matching(&self, filters: &[FilterPredicate]) -> Result<usize> {
        forget::delete_matching(&mut *self.lock()?, filters)
    }

    fn history(&self, id: &str) -> Result<MemoryHistory> {
        search::memory_history(&*self.lock()?, id)
    }

    fn history_log(&self, id: &str) -> Result<Vec<HistoryEntry>> {
        search::history_log(&*self.lock()?, id)
    }

    fn reset(&self) -> Result<usize> {
        forget::reset_all(&mut *self.lock()?)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
