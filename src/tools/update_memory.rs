use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct UpdateMemoryParams {
    #[serde(default)]
    #[schemars(description = "ID of the memory to update")]
    pub memory_id: String,

    #[serde(default)]
    #[schemars(description = "Replacement text. The previous text is kept in the memory's history.")]
    pub text: String,

    #[schemars(description = "Optional JSON object that replaces the memory's metadata")]
    pub metadata: Option<serde_json::Value>,
}
