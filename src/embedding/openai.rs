//! OpenAI-compatible `/embeddings` client, used for both OpenAI and Ollama.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_dimensions, l2_normalize, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};
use crate::http::{build_http_client, endpoint, send_json};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
    /// Only sent to OpenAI, which can shorten `text-embedding-3-*` output.
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddingProvider {
    http: Client,
    name: &'static str,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    request_dimensions: bool,
}

impl OpenAiEmbeddingProvider {
    /// OpenAI (or any compatible host via `base_url`). Requires an API key.
    pub fn openai(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
            MemoryError::Config(
                "embedding provider 'openai' needs an API key (MEMORY_MCP_EMBEDDING_API_KEY or OPENAI_API_KEY)"
                    .into(),
            )
        })?;
        Ok(Self {
            http: build_http_client("openai", config.timeout_secs)?,
            name: "openai",
            base_url: config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.into()),
            api_key: Some(api_key),
            model: config.model.clone(),
            dimensions: config.dimensions,
            request_dimensions: true,
        })
    }

    /// Local Ollama server; no key needed.
    pub fn ollama(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            http: build_http_client("ollama", config.timeout_secs)?,
            name: "ollama",
            base_url: config.base_url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.into()),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            request_dimensions: false,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: text,
            dimensions: self.request_dimensions.then_some(self.dimensions),
        };
        let mut request = self
            .http
            .post(endpoint(&self.base_url, "embeddings"))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response: EmbeddingResponse = send_json(self.name, request).await?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| MemoryError::upstream(self.name, "response contained no embedding"))?;

        check_dimensions(self.name, self.dimensions, &embedding)?;
        Ok(l2_normalize(&embedding))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_requires_api_key() {
        let config = EmbeddingConfig {
            provider: "openai".into(),
            api_key: None,
            ..EmbeddingConfig::default()
        };
        let err = OpenAiEmbeddingProvider::openai(&config).err().unwrap();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn ollama_defaults_to_local_endpoint() {
        let provider = OpenAiEmbeddingProvider::ollama(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.base_url, OLLAMA_BASE_URL);
        assert_eq!(provider.provider_name(), "ollama");
        assert!(!provider.request_dimensions);
    }

    #[test]
    fn request_omits_dimensions_when_unset() {
        let body = EmbeddingRequest {
            model: "m",
            input: "hello",
            dimensions: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("dimensions").is_none());
        assert_eq!(json["input"], "hello");
    }

    #[tokio::test]
    async fn unreachable_host_is_upstream_error() {
        let config = EmbeddingConfig {
            base_url: Some("http://127.0.0.1:9/v1".into()),
            timeout_secs: 1,
            ..EmbeddingConfig::default()
        };
        let provider = OpenAiEmbeddingProvider::ollama(&config).unwrap();
        let err = provider.embed("hello").await.unwrap_err();
        assert_eq!(err.kind(), "upstream_provider_error");
    }
}
