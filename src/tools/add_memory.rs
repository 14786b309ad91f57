use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::extraction::ChatMessage;

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct AddMemoryParams {
    #[schemars(description = "Text to remember. Ignored when messages is also given.")]
    pub text: Option<String>,

    #[schemars(
        description = "Conversation turns to extract facts from. Takes precedence over text."
    )]
    pub messages: Option<Vec<ChatMessage>>,

    #[schemars(description = "User the memory belongs to")]
    pub user_id: Option<String>,

    #[schemars(description = "Agent the memory belongs to")]
    pub agent_id: Option<String>,

    #[schemars(description = "Run or session the memory belongs to")]
    pub run_id: Option<String>,

    #[schemars(
        description = "Optional JSON object stored with the memory. Keys user_id, agent_id and run_id are reserved."
    )]
    pub metadata: Option<serde_json::Value>,

    #[schemars(
        description = "Extract facts from text before storing (default from server config). Messages are always extracted."
    )]
    pub infer: Option<bool>,
}
