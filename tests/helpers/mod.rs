#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use memory_mcp::db::EmbeddingSpec;
use memory_mcp::embedding::hashed::HashEmbeddingProvider;
use memory_mcp::engine::{EngineSettings, MemoryEngine};
use memory_mcp::error::{MemoryError, Result};
use memory_mcp::extraction::passthrough::PassthroughExtractor;
use memory_mcp::extraction::{ExtractionRequest, FactExtractor};
use memory_mcp::memory::types::NewMemory;
use memory_mcp::memory::{MemoryStore, SqliteStore};
use memory_mcp::prompt::PromptSelector;
use memory_mcp::scope::ScopeIds;
use memory_mcp::tools::MemoryTools;
use serde_json::{Map, Value};

pub const DIMS: usize = 64;

pub fn spec() -> EmbeddingSpec {
    EmbeddingSpec {
        model: "feature-hash".into(),
        dimensions: DIMS,
    }
}

/// Fresh in-memory store.
pub fn test_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory(&spec()).unwrap())
}

/// Engine over an in-memory store, the hash embedder and `extractor`.
pub fn engine_with(extractor: Arc<dyn FactExtractor>, settings: EngineSettings) -> MemoryEngine {
    engine_on(test_store(), extractor, settings)
}

/// Engine over an existing store, so several extractors can share one.
pub fn engine_on(
    store: Arc<SqliteStore>,
    extractor: Arc<dyn FactExtractor>,
    settings: EngineSettings,
) -> MemoryEngine {
    MemoryEngine::new(
        store,
        Arc::new(HashEmbeddingProvider::new(DIMS)),
        extractor,
        PromptSelector::default(),
        settings,
    )
    .unwrap()
}

/// Tool router with passthrough extraction and inference off, so text is
/// stored exactly as given.
pub fn test_tools() -> MemoryTools {
    tools_with(Arc::new(PassthroughExtractor), verbatim_settings())
}

pub fn tools_with(extractor: Arc<dyn FactExtractor>, settings: EngineSettings) -> MemoryTools {
    MemoryTools::new(Arc::new(engine_with(extractor, settings)))
}

pub fn verbatim_settings() -> EngineSettings {
    EngineSettings {
        infer_text: false,
        ..EngineSettings::default()
    }
}

/// Deterministic unit vector with a spike at `seed`.
pub fn spike_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[seed % DIMS] = 1.0;
    v
}

/// Insert a record straight into a store.
pub fn insert(store: &dyn MemoryStore, text: &str, scope: ScopeIds, seed: usize) -> String {
    store
        .insert(NewMemory {
            text: text.into(),
            embedding: spike_embedding(seed),
            scope,
            metadata: Map::new(),
        })
        .unwrap()
        .id
}

pub fn metadata(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// Extractor that replays a fixed list of facts and records what it was sent.
pub struct ScriptedExtractor {
    facts: Vec<String>,
    pub requests: Mutex<Vec<ExtractionRequest>>,
}

impl ScriptedExtractor {
    pub fn new(facts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            facts: facts.iter().map(|f| f.to_string()).collect(),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl FactExtractor for ScriptedExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<String>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.facts.clone())
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// Extractor whose backend is always down.
pub struct FailingExtractor;

#[async_trait]
impl FactExtractor for FailingExtractor {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<Vec<String>> {
        Err(MemoryError::upstream("scripted", "request timed out"))
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// Parse a successful tool reply.
pub fn ok(reply: std::result::Result<String, String>) -> Value {
    match reply {
        Ok(body) => serde_json::from_str(&body).unwrap(),
        Err(body) => panic!("tool call failed: {body}"),
    }
}

/// Parse a failed tool reply and return its error kind.
pub fn err_kind(reply: std::result::Result<String, String>) -> String {
    match reply {
        Ok(body) => panic!("expected failure, got {body}"),
        Err(body) => {
            let payload: Value = serde_json::from_str(&body).unwrap();
            payload["error"]["kind"].as_str().unwrap().to_string()
        }
    }
}
