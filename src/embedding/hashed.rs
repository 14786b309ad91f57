//! Offline feature-hashing embedder.
//!
//! No model and no network: tokens and bigrams are hashed into a fixed number
//! of buckets with a signed, log-scaled term weight, then L2-normalized. Texts
//! sharing words land close together, which is enough for tests and for
//! machines without the ONNX model. Uses FNV-1a so vectors stay stable across
//! builds and can be persisted.

use async_trait::async_trait;

use super::{l2_normalize, EmbeddingProvider};
use crate::error::Result;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous embedding; never fails.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut embedding = vec![0.0f32; self.dimensions];
        if tokens.is_empty() {
            return embedding;
        }

        let doc_len = tokens.len() as f32;
        let mut counts: Vec<(&str, f32)> = Vec::new();
        for token in &tokens {
            match counts.iter_mut().find(|(t, _)| *t == token.as_str()) {
                Some((_, c)) => *c += 1.0,
                None => counts.push((token.as_str(), 1.0)),
            }
        }

        for (token, count) in counts {
            let weight = (1.0 + count / doc_len).ln() * (1.0 + token.len() as f32 * 0.1);
            self.add_feature(&mut embedding, token, weight);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut embedding, &format!("{}_{}", pair[0], pair[1]), 0.5);
        }

        l2_normalize(&embedding)
    }

    fn add_feature(&self, embedding: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let idx = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        embedding[idx] += weight * sign;
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() > 1)
        .map(String::from)
        .collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "feature-hash"
    }

    fn provider_name(&self) -> &'static str {
        "hash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn identical_text_gives_identical_vectors() {
        let e = HashEmbeddingProvider::new(128);
        let a = e.embed_sync("Alice prefers dark roast coffee");
        let b = e.embed_sync("Alice prefers dark roast coffee");
        assert_eq!(a, b);
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn overlapping_text_is_closer_than_unrelated() {
        let e = HashEmbeddingProvider::new(256);
        let base = e.embed_sync("the project uses sqlite for storage");
        let near = e.embed_sync("the project uses sqlite for persistence");
        let far = e.embed_sync("bananas are yellow fruit");
        assert!(cosine(&base, &near) > cosine(&base, &far));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let e = HashEmbeddingProvider::new(16);
        assert!(e.embed_sync("!").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn output_has_configured_width() {
        assert_eq!(HashEmbeddingProvider::new(48).embed_sync("hello world").len(), 48);
    }

    #[test]
    fn fnv_matches_reference_vector() {
        assert_eq!(fnv1a(b""), FNV_OFFSET);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }
}
