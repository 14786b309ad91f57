use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct DeleteAllMemoriesParams {
    #[schemars(description = "Delete this user's memories")]
    pub user_id: Option<String>,

    #[schemars(description = "Delete this agent's memories")]
    pub agent_id: Option<String>,

    #[schemars(description = "Delete this run's memories")]
    pub run_id: Option<String>,

    #[schemars(description = "Optional JSON object of additional field filters")]
    pub filters: Option<serde_json::Value>,
}
