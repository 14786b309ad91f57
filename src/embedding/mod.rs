//! Text-to-vector embedding capability.
//!
//! [`EmbeddingProvider`] is the capability the engine depends on. Providers are
//! chosen once at startup by [`create_provider`]:
//!
//! | Provider | Backend |
//! |----------|---------|
//! | `local`  | ONNX Runtime, all-MiniLM-L6-v2 (384 dimensions) |
//! | `openai` | OpenAI-compatible `/embeddings` endpoint |
//! | `ollama` | Ollama's OpenAI-compatible endpoint |
//! | `hash`   | Offline feature hashing, no model required |

pub mod hashed;
pub mod local;
pub mod openai;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, Result};

/// Number of dimensions produced by all-MiniLM-L6-v2.
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Turns text into a fixed-width vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Width of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Model identifier recorded alongside stored vectors.
    fn model_name(&self) -> &str;

    /// Provider label used in error messages.
    fn provider_name(&self) -> &'static str;
}

/// Embedding backends selectable by `embedding.provider`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    Local,
    OpenAi,
    Ollama,
    Hash,
}

impl EmbeddingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Hash => "hash",
        }
    }
}

impl FromStr for EmbeddingKind {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            other => Err(MemoryError::Config(format!(
                "unknown embedding provider '{other}'. Supported: local, openai, ollama, hash"
            ))),
        }
    }
}

/// Create the configured embedding provider.
///
/// `local` fails if the model files are missing; run `memory-mcp model download`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.parse()? {
        EmbeddingKind::Local => Arc::new(local::LocalEmbeddingProvider::new(config)?),
        EmbeddingKind::OpenAi => Arc::new(openai::OpenAiEmbeddingProvider::openai(config)?),
        EmbeddingKind::Ollama => Arc::new(openai::OpenAiEmbeddingProvider::ollama(config)?),
        EmbeddingKind::Hash => Arc::new(hashed::HashEmbeddingProvider::new(config.dimensions)),
    };
    tracing::info!(
        provider = provider.provider_name(),
        model = provider.model_name(),
        dimensions = provider.dimensions(),
        "embedding provider ready"
    );
    Ok(provider)
}

/// Reject vectors of the wrong width before they reach the store.
pub fn check_dimensions(provider: &str, expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(MemoryError::upstream(
            provider,
            format!(
                "embedding has {} dimensions, expected {expected}; set embedding.dimensions to match the model",
                embedding.len()
            ),
        ));
    }
    Ok(())
}

/// L2-normalize a vector. Returns the input unchanged if its norm is zero.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let normalized = l2_normalize(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0, 0.0]), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("Local".parse::<EmbeddingKind>().unwrap(), EmbeddingKind::Local);
        assert_eq!("hash".parse::<EmbeddingKind>().unwrap(), EmbeddingKind::Hash);
        assert!("cohere".parse::<EmbeddingKind>().is_err());
    }

    #[test]
    fn hash_provider_is_built_from_config() {
        let config = EmbeddingConfig {
            provider: "hash".into(),
            dimensions: 64,
            ..EmbeddingConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.dimensions(), 64);
        assert_eq!(provider.provider_name(), "hash");
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let config = EmbeddingConfig {
            provider: "magic".into(),
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn dimension_mismatch_is_upstream_error() {
        let err = check_dimensions("openai", 3, &[0.1, 0.2]).unwrap_err();
        assert_eq!(err.kind(), "upstream_provider_error");
        assert!(check_dimensions("openai", 2, &[0.1, 0.2]).is_ok());
    }
}
