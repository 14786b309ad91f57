//! Model-free extractor: each user turn becomes one fact as written.

use async_trait::async_trait;

use super::{normalize_facts, ExtractionRequest, FactExtractor};
use crate::error::Result;

pub struct PassthroughExtractor;

#[async_trait]
impl FactExtractor for PassthroughExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Vec<String>> {
        let user_turns = request
            .messages
            .iter()
            .filter(|m| m.role.eq_ignore_ascii_case("user"))
            .map(|m| m.content.as_str());
        Ok(normalize_facts(user_turns))
    }

    fn provider_name(&self) -> &'static str {
        "passthrough"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ChatMessage;

    #[tokio::test]
    async fn keeps_user_turns_only() {
        let request = ExtractionRequest {
            instructions: String::new(),
            messages: vec![
                ChatMessage::user("I live in Porto"),
                ChatMessage {
                    role: "assistant".into(),
                    content: "Nice city".into(),
                },
                ChatMessage::user("  I live in Porto "),
                ChatMessage::user("I cycle to work"),
            ],
        };
        let facts = PassthroughExtractor.extract(&request).await.unwrap();
        assert_eq!(facts, vec!["I live in Porto", "I cycle to work"]);
    }
}
