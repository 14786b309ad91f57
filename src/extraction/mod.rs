//! Fact-extraction capability.
//!
//! A [`FactExtractor`] reduces a conversation to short standalone facts. The
//! engine supplies the active instructions from the prompt selector; the
//! extractor only talks to its backend and parses the reply.

pub mod openai;
pub mod passthrough;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{MemoryError, Result};

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChatMessage {
    /// Speaker, e.g. "user" or "assistant"
    #[schemars(description = "Speaker role, e.g. \"user\" or \"assistant\"")]
    pub role: String,
    /// Message text
    #[schemars(description = "Message text")]
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Input to a single extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Resolved instruction text (date already substituted).
    pub instructions: String,
    pub messages: Vec<ChatMessage>,
}

impl ExtractionRequest {
    /// Conversation rendered as `role: content` lines.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Produces candidate facts from a conversation. Zero facts is a valid answer.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<String>>;

    /// Provider label used in error messages.
    fn provider_name(&self) -> &'static str;
}

/// Extraction backends selectable by `llm.provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    OpenAi,
    OpenRouter,
    Ollama,
    /// No model: user turns are stored as facts verbatim.
    Passthrough,
}

impl FromStr for ExtractorKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            "passthrough" | "none" => Ok(Self::Passthrough),
            other => Err(MemoryError::Config(format!(
                "unknown llm provider '{other}'. Supported: openai, openrouter, ollama, passthrough"
            ))),
        }
    }
}

/// Create the configured extractor.
pub fn create_extractor(config: &LlmConfig) -> Result<Arc<dyn FactExtractor>> {
    let kind: ExtractorKind = config.provider.parse()?;
    let extractor: Arc<dyn FactExtractor> = match kind {
        ExtractorKind::Passthrough => Arc::new(passthrough::PassthroughExtractor),
        _ => Arc::new(openai::ChatExtractor::new(kind, config)?),
    };
    tracing::info!(provider = extractor.provider_name(), model = %config.model, "fact extractor ready");
    Ok(extractor)
}

#[derive(Debug, Deserialize)]
struct FactsReply {
    #[serde(default)]
    facts: Vec<serde_json::Value>,
}

/// Parse a `{"facts": [...]}` reply.
///
/// Tolerates surrounding prose or code fences by reading from the first `{` to
/// the last `}`. Facts are trimmed; blanks, non-strings and repeats are dropped.
pub fn parse_facts(provider: &str, reply: &str) -> Result<Vec<String>> {
    let json = match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(MemoryError::upstream(
                provider,
                "extraction reply did not contain a JSON object",
            ))
        }
    };

    let parsed: FactsReply = serde_json::from_str(json).map_err(|e| {
        MemoryError::upstream(provider, format!("extraction reply is not valid JSON: {e}"))
    })?;

    Ok(normalize_facts(parsed.facts.iter().filter_map(|v| v.as_str())))
}

/// Trim, drop blanks, and drop repeats while keeping first-seen order.
pub fn normalize_facts<'a>(facts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for fact in facts {
        let fact = fact.trim();
        if !fact.is_empty() && !out.iter().any(|f| f == fact) {
            out.push(fact.to_string());
        }
    }
    out
}
