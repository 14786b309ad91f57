use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

const ENV_PREFIX: &str = "MEMORY_MCP_";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub prompt: PromptConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// `stdio` or `http`
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// `sqlite` (local file) or `memory` (ephemeral, lost on exit)
    pub provider: String,
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local`, `openai`, `ollama` or `hash`
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub cache_dir: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// `openai`, `openrouter`, `ollama` or `passthrough`
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PromptConfig {
    /// Inline instruction text; wins over everything else.
    pub custom: Option<String>,
    /// Path to an instruction file.
    pub file: Option<String>,
    /// Built-in prompt: `default` or `personal`.
    #[serde(rename = "type")]
    pub prompt_type: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub default_user_id: Option<String>,
    /// Run plain `text` through fact extraction unless the caller opts out.
    pub infer_text: bool,
    /// Cosine similarity at which an extracted fact merges into an existing memory.
    pub dedup_threshold: f64,
    pub search_limit: usize,
    pub list_limit: usize,
    pub max_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 8050,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_app_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "sqlite".into(),
            db_path,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_app_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            dimensions: 384,
            base_url: None,
            api_key: None,
            cache_dir,
            timeout_secs: 30,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            base_url: None,
            api_key: None,
            temperature: 0.2,
            max_tokens: 2000,
            timeout_secs: 60,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_user_id: None,
            infer_text: true,
            dedup_threshold: 0.92,
            search_limit: 10,
            list_limit: 20,
            max_limit: 100,
        }
    }
}

/// Returns `~/.memory-mcp/`, or `./.memory-mcp` when no home directory exists.
pub fn default_app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memory-mcp")
}

/// Returns the default config file path: `~/.memory-mcp/config.toml`
pub fn default_config_path() -> PathBuf {
    default_app_dir().join("config.toml")
}

impl AppConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `MEMORY_MCP_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        override_string("DB", &mut self.storage.db_path);
        override_string("STORE", &mut self.storage.provider);
        override_string("LOG_LEVEL", &mut self.server.log_level);
        override_string("TRANSPORT", &mut self.server.transport);
        override_string("HOST", &mut self.server.host);
        override_parsed("PORT", &mut self.server.port);
        override_option("DEFAULT_USER_ID", &mut self.memory.default_user_id);

        override_string("LLM_PROVIDER", &mut self.llm.provider);
        override_string("LLM_MODEL", &mut self.llm.model);
        override_option("LLM_API_KEY", &mut self.llm.api_key);
        override_option("LLM_BASE_URL", &mut self.llm.base_url);

        override_string("EMBEDDING_PROVIDER", &mut self.embedding.provider);
        override_string("EMBEDDING_MODEL", &mut self.embedding.model);
        override_option("EMBEDDING_API_KEY", &mut self.embedding.api_key);
        override_option("EMBEDDING_BASE_URL", &mut self.embedding.base_url);
        override_parsed("EMBEDDING_DIMS", &mut self.embedding.dimensions);

        override_option("PROMPT", &mut self.prompt.custom);
        override_option("PROMPT_FILE", &mut self.prompt.file);
        override_option("PROMPT_TYPE", &mut self.prompt.prompt_type);

        // Fall back to the conventional OpenAI key for OpenAI-hosted providers.
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if self.llm.api_key.is_none() && self.llm.provider == "openai" {
                self.llm.api_key = Some(key.clone());
            }
            if self.embedding.api_key.is_none() && self.embedding.provider == "openai" {
                self.embedding.api_key = Some(key);
            }
        }
    }

    /// Reject values no component could work with.
    pub fn validate(&self) -> Result<()> {
        let m = &self.memory;
        if !(0.0..=1.0).contains(&m.dedup_threshold) {
            bail!("memory.dedup_threshold must be within 0.0..=1.0");
        }
        if m.max_limit == 0 {
            bail!("memory.max_limit must be positive");
        }
        for (name, value) in [("search_limit", m.search_limit), ("list_limit", m.list_limit)] {
            if value == 0 || value > m.max_limit {
                bail!("memory.{name} must be within 1..={}", m.max_limit);
            }
        }
        if self.embedding.dimensions == 0 {
            bail!("embedding.dimensions must be positive");
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{key}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn override_string(key: &str, target: &mut String) {
    if let Some(val) = env_value(key) {
        *target = val;
    }
}

fn override_option(key: &str, target: &mut Option<String>) {
    if let Some(val) = env_value(key) {
        *target = Some(val);
    }
}

fn override_parsed<T: FromStr>(key: &str, target: &mut T) {
    if let Some(val) = env_value(key) {
        match val.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("ignoring {ENV_PREFIX}{key}={val}: not a valid value"),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
