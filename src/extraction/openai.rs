//! Chat-completions extractor for OpenAI, OpenRouter and Ollama.
//!
//! All three speak the OpenAI `/chat/completions` dialect; they differ only in
//! base URL and whether a key is required.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{parse_facts, ExtractionRequest, ExtractorKind, FactExtractor};
use crate::config::LlmConfig;
use crate::error::{MemoryError, Result};
use crate::http::{build_http_client, endpoint, send_json};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn<'a>>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatTurn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatExtractor {
    http: Client,
    name: &'static str,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatExtractor {
    pub fn new(kind: ExtractorKind, config: &LlmConfig) -> Result<Self> {
        let (name, default_base, needs_key) = match kind {
            ExtractorKind::OpenAi => ("openai", "https://api.openai.com/v1", true),
            ExtractorKind::OpenRouter => ("openrouter", "https://openrouter.ai/api/v1", true),
            ExtractorKind::Ollama => ("ollama", "http://localhost:11434/v1", false),
            ExtractorKind::Passthrough => {
                return Err(MemoryError::Config(
                    "passthrough has no chat backend".into(),
                ))
            }
        };

        let api_key = config.api_key.clone().filter(|k| !k.is_empty());
        if needs_key && api_key.is_none() {
            return Err(MemoryError::Config(format!(
                "llm provider '{name}' needs an API key (MEMORY_MCP_LLM_API_KEY)"
            )));
        }

        Ok(Self {
            http: build_http_client(name, config.timeout_secs)?,
            name,
            base_url: config.base_url.clone().unwrap_or_else(|| default_base.into()),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl FactExtractor for ChatExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<String>> {
        let transcript = format!("Input:\n{}", request.transcript());
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatTurn {
                    role: "system",
                    content: &request.instructions,
                },
                ChatTurn {
                    role: "user",
                    content: &transcript,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut http_request = self
            .http
            .post(endpoint(&self.base_url, "chat/completions"))
            .json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response: ChatResponse = send_json(self.name, http_request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| MemoryError::upstream(self.name, "response contained no message"))?;

        let facts = parse_facts(self.name, &content)?;
        tracing::debug!(provider = self.name, facts = facts.len(), "facts extracted");
        Ok(facts)
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: provider.into(),
            api_key: api_key.map(String::from),
            timeout_secs: 1,
            ..LlmConfig::default()
        }
    }

    #[test]
    fn hosted_providers_need_a_key() {
        for kind in [ExtractorKind::OpenAi, ExtractorKind::OpenRouter] {
            let err = ChatExtractor::new(kind, &config("x", None)).err().unwrap();
            assert_eq!(err.kind(), "configuration_error");
        }
    }

    #[test]
    fn default_base_urls() {
        let router = ChatExtractor::new(ExtractorKind::OpenRouter, &config("openrouter", Some("k")))
            .unwrap();
        assert_eq!(router.base_url, "https://openrouter.ai/api/v1");

        let ollama = ChatExtractor::new(ExtractorKind::Ollama, &config("ollama", None)).unwrap();
        assert_eq!(ollama.base_url, "http://localhost:11434/v1");
        assert!(ollama.api_key.is_none());
    }

    #[test]
    fn request_asks_for_json_object() {
        let body = ChatRequest {
            model: "m",
            messages: vec![ChatTurn {
                role: "system",
                content: "x",
            }],
            temperature: 0.2,
            max_tokens: 10,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[tokio::test]
    async fn unreachable_backend_is_upstream_error() {
        let mut cfg = config("ollama", None);
        cfg.base_url = Some("http://127.0.0.1:9/v1".into());
        let extractor = ChatExtractor::new(ExtractorKind::Ollama, &cfg).unwrap();
        let request = ExtractionRequest {
            instructions: "extract".into(),
            messages: vec![super::super::ChatMessage::user("I like tea")],
        };
        let err = extractor.extract(&request).await.unwrap_err();
        assert_eq!(err.kind(), "upstream_provider_error");
    }
}
