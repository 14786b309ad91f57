use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Arguments of the single-record tools: get, delete and history.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct MemoryIdParams {
    #[serde(default)]
    #[schemars(description = "ID of the memory")]
    pub memory_id: String,
}
