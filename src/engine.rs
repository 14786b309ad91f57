//! Memory engine: uniform add/search/list/get/update/delete/history/reset over
//! the store, embedding and extraction capabilities.
//!
//! The engine is constructed once at startup and shared by every tool call.
//! Provider calls (embedding, extraction) happen outside the store; store calls
//! run on the blocking pool and hold the store's lock only for their own
//! duration.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::MemoryConfig;
use crate::embedding::{check_dimensions, EmbeddingProvider};
use crate::error::{MemoryError, Result};
use crate::extraction::{ChatMessage, ExtractionRequest, FactExtractor};
use crate::filter::FilterPredicate;
use crate::memory::types::{
    HistoryEntry, MemoryEvent, MemoryHistory, MemoryRecord, MemoryUpdate, NewMemory,
};
use crate::memory::MemoryStore;
use crate::pagination::{Page, PageRequest};
use crate::prompt::PromptSelector;
use crate::scope::{resolve_delete_filters, resolve_read_filters, ScopeIds};

/// Engine knobs, taken from the `[memory]` config section.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_user_id: Option<String>,
    pub infer_text: bool,
    pub dedup_threshold: f64,
    pub search_limit: usize,
    pub list_limit: usize,
    pub max_limit: usize,
}

impl From<&MemoryConfig> for EngineSettings {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            default_user_id: config
                .default_user_id
                .clone()
                .filter(|u| !u.trim().is_empty()),
            infer_text: config.infer_text,
            dedup_threshold: config.dedup_threshold,
            search_limit: config.search_limit,
            list_limit: config.list_limit,
            max_limit: config.max_limit,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&MemoryConfig::default())
    }
}

/// What to remember.
#[derive(Debug, Clone)]
pub enum AddInput {
    /// Free text. Goes through extraction only when inference is on.
    Text(String),
    /// Conversation turns. Always goes through extraction.
    Messages(Vec<ChatMessage>),
}

#[derive(Debug, Clone)]
pub struct AddRequest {
    pub input: AddInput,
    pub scope: ScopeIds,
    pub metadata: Map<String, Value>,
    /// Overrides `infer_text` for text input.
    pub infer: Option<bool>,
}

/// Per-fact outcome of an add.
#[derive(Debug, Clone, Serialize)]
pub struct AddedMemory {
    pub id: String,
    pub text: String,
    pub event: MemoryEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddResult {
    /// Distinct records inserted or merged (`ADD` + `UPDATE`).
    pub added: usize,
    /// Ids of the inserted or merged records.
    pub ids: Vec<String>,
    pub results: Vec<AddedMemory>,
}

impl AddResult {
    fn from_outcomes(results: Vec<AddedMemory>) -> Self {
        // A later fact in the same batch can update a record an earlier one added.
        let mut ids: Vec<String> = Vec::new();
        for r in results.iter().filter(|r| r.event.is_write()) {
            if !ids.contains(&r.id) {
                ids.push(r.id.clone());
            }
        }
        Self {
            added: ids.len(),
            ids,
            results,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub scope: ScopeIds,
    pub filters: Vec<FilterPredicate>,
    pub page: PageRequest,
}

#[derive(Debug, Clone)]
pub struct ListRequest {
    pub scope: ScopeIds,
    pub filters: Vec<FilterPredicate>,
    pub page: PageRequest,
}

pub struct MemoryEngine {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn FactExtractor>,
    prompt: PromptSelector,
    settings: EngineSettings,
    /// Held across one fact's nearest-match lookup and write.
    merge_lock: tokio::sync::Mutex<()>,
}

impl MemoryEngine {
    /// Wire the capabilities together. The embedder must produce vectors of the
    /// width the store was opened with.
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn FactExtractor>,
        prompt: PromptSelector,
        settings: EngineSettings,
    ) -> Result<Self> {
        if embedder.dimensions() != store.dimensions() {
            return Err(MemoryError::Config(format!(
                "embedding provider '{}' produces {} dimensions but the store expects {}",
                embedder.provider_name(),
                embedder.dimensions(),
                store.dimensions()
            )));
        }
        Ok(Self {
            store,
            embedder,
            extractor,
            prompt,
            settings,
            merge_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Page request with the configured bounds; `None` picks `default_limit`.
    pub fn page(&self, limit: Option<usize>, offset: Option<usize>, default_limit: usize) -> Result<PageRequest> {
        PageRequest::new(
            limit.unwrap_or(default_limit),
            offset.unwrap_or(0),
            self.settings.max_limit,
        )
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Remember text or a conversation.
    ///
    /// Each extracted fact is merged against the nearest memory in the same
    /// scope: at or above `dedup_threshold` it is a no-op (same text) or an
    /// in-place update (different text); otherwise it is inserted. Lookup and
    /// write run under one engine lock, so concurrent adds of the same fact
    /// into one scope store it once.
    pub async fn add(&self, request: AddRequest) -> Result<AddResult> {
        let scope = request
            .scope
            .or_default_user(self.settings.default_user_id.as_deref());

        let messages = match request.input {
            AddInput::Messages(messages) => messages,
            AddInput::Text(text) if request.infer.unwrap_or(self.settings.infer_text) => {
                vec![ChatMessage::user(text)]
            }
            AddInput::Text(text) => {
                let record = self.insert(text, scope, request.metadata).await?;
                return Ok(AddResult::from_outcomes(vec![AddedMemory {
                    id: record.id,
                    text: record.text,
                    event: MemoryEvent::Add,
                }]));
            }
        };

        let facts = self
            .extractor
            .extract(&ExtractionRequest {
                instructions: self.prompt.resolve(),
                messages,
            })
            .await?;
        if facts.is_empty() {
            tracing::info!("no facts extracted");
        }

        let mut outcomes = Vec::with_capacity(facts.len());
        for fact in facts {
            outcomes.push(self.merge_fact(fact, &scope, &request.metadata).await?);
        }

        let result = AddResult::from_outcomes(outcomes);
        tracing::info!(added = result.added, facts = result.results.len(), "memories added");
        Ok(result)
    }

    async fn merge_fact(
        &self,
        fact: String,
        scope: &ScopeIds,
        metadata: &Map<String, Value>,
    ) -> Result<AddedMemory> {
        let embedding = self.embed(&fact).await?;

        let _merging = self.merge_lock.lock().await;
        let query = embedding.clone();
        let nearest_scope = scope.clone();
        let nearest = self
            .with_store(move |store| store.nearest(&query, &nearest_scope))
            .await?;

        match nearest {
            Some(hit) if hit.similarity >= self.settings.dedup_threshold && hit.text == fact => {
                tracing::debug!(id = %hit.id, "fact already stored");
                Ok(AddedMemory {
                    id: hit.id,
                    text: fact,
                    event: MemoryEvent::None,
                })
            }
            Some(hit) if hit.similarity >= self.settings.dedup_threshold => {
                let id = hit.id;
                let update = MemoryUpdate {
                    text: fact,
                    embedding,
                    metadata: None,
                };
                let target = id.clone();
                let record = self
                    .with_store(move |store| store.update(&target, update))
                    .await?;
                tracing::info!(id = %id, similarity = hit.similarity, "fact merged into existing memory");
                Ok(AddedMemory {
                    id: record.id,
                    text: record.text,
                    event: MemoryEvent::Update,
                })
            }
            _ => {
                let new = NewMemory {
                    text: fact,
                    embedding,
                    scope: scope.clone(),
                    metadata: metadata.clone(),
                };
                let record = self.with_store(move |store| store.insert(new)).await?;
                Ok(AddedMemory {
                    id: record.id,
                    text: record.text,
                    event: MemoryEvent::Add,
                })
            }
        }
    }

    async fn insert(
        &self,
        text: String,
        scope: ScopeIds,
        metadata: Map<String, Value>,
    ) -> Result<MemoryRecord> {
        require_text("text", &text)?;
        let embedding = self.embed(&text).await?;
        let new = NewMemory {
            text,
            embedding,
            scope,
            metadata,
        };
        let record = self.with_store(move |store| store.insert(new)).await?;
        tracing::info!(id = %record.id, "memory added verbatim");
        Ok(record)
    }

    /// Replace a memory's text (and metadata, when given).
    pub async fn update(
        &self,
        id: &str,
        text: String,
        metadata: Option<Map<String, Value>>,
    ) -> Result<MemoryRecord> {
        let id = non_empty("memory_id", id.to_string())?;
        require_text("text", &text)?;

        // Fail before paying for an embedding.
        let target = id.clone();
        if !self.with_store(move |store| store.exists(&target)).await? {
            return Err(MemoryError::NotFound(id));
        }

        let embedding = self.embed(&text).await?;
        let update = MemoryUpdate {
            text,
            embedding,
            metadata,
        };
        let target = id.clone();
        let record = self
            .with_store(move |store| store.update(&target, update))
            .await?;
        tracing::info!(id = %id, "memory updated");
        Ok(record)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let id = non_empty("memory_id", id.to_string())?;
        let target = id.clone();
        self.with_store(move |store| store.delete(&target)).await?;
        tracing::info!(id = %id, "memory deleted");
        Ok(())
    }

    /// Delete everything matching the scope and filters. An empty constraint
    /// set is rejected before the store is touched.
    pub async fn delete_all(&self, scope: ScopeIds, filters: Vec<FilterPredicate>) -> Result<usize> {
        let filters = resolve_delete_filters(&scope, filters)?;
        let deleted = self
            .with_store(move |store| store.delete_matching(&filters))
            .await?;
        tracing::warn!(deleted, ?scope, "bulk delete");
        Ok(deleted)
    }

    /// Clear the whole collection, history included.
    pub async fn reset(&self) -> Result<usize> {
        let deleted = self.with_store(|store| store.reset()).await?;
        tracing::warn!(deleted, "memory store reset");
        Ok(deleted)
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub async fn search(&self, request: SearchRequest) -> Result<Page<MemoryRecord>> {
        let query = non_empty("query", request.query)?;
        let filters = resolve_read_filters(
            &request.scope,
            request.filters,
            self.settings.default_user_id.as_deref(),
        );
        let embedding = self.embed(&query).await?;

        let page = request.page;
        let rows = self
            .with_store(move |store| {
                store.search(&embedding, &filters, page.fetch_limit(), page.offset)
            })
            .await?;
        Ok(page.paginate(rows))
    }

    pub async fn list(&self, request: ListRequest) -> Result<Page<MemoryRecord>> {
        let filters = resolve_read_filters(
            &request.scope,
            request.filters,
            self.settings.default_user_id.as_deref(),
        );
        let page = request.page;
        let rows = self
            .with_store(move |store| store.list(&filters, page.fetch_limit(), page.offset))
            .await?;
        Ok(page.paginate(rows))
    }

    pub async fn get(&self, id: &str) -> Result<MemoryRecord> {
        let id = non_empty("memory_id", id.to_string())?;
        self.with_store(move |store| store.get(&id)).await
    }

    /// Prior states of a live memory, current state last.
    pub async fn history(&self, id: &str) -> Result<MemoryHistory> {
        let id = non_empty("memory_id", id.to_string())?;
        self.with_store(move |store| store.history(&id)).await
    }

    /// Stored history rows, including those of deleted memories.
    pub async fn history_log(&self, id: &str) -> Result<Vec<HistoryEntry>> {
        let id = non_empty("memory_id", id.to_string())?;
        self.with_store(move |store| store.history_log(&id)).await
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.embedder.embed(text).await?;
        check_dimensions(
            self.embedder.provider_name(),
            self.store.dimensions(),
            &embedding,
        )?;
        Ok(embedding)
    }

    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn MemoryStore) -> Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref())).await?
    }
}

/// Trimmed identifier or query; blank is a validation error.
fn non_empty(field: &str, value: String) -> Result<String> {
    require_text(field, &value)?;
    Ok(value.trim().to_string())
}

/// Reject blank text without altering what gets stored.
fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MemoryError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}
