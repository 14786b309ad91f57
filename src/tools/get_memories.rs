use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct GetMemoriesParams {
    #[schemars(description = "Restrict to this user's memories")]
    pub user_id: Option<String>,

    #[schemars(description = "Restrict to this agent's memories")]
    pub agent_id: Option<String>,

    #[schemars(description = "Restrict to this run's memories")]
    pub run_id: Option<String>,

    #[schemars(
        description = "JSON object of field filters. A value is an exact match; {\"gte\": n, \"lte\": m} is a numeric range on a metadata field."
    )]
    pub filters: Option<serde_json::Value>,

    #[schemars(description = "Page size, a positive integer (default 20)")]
    pub limit: Option<serde_json::Value>,

    #[schemars(description = "Records to skip, a non-negative integer (default 0)")]
    pub offset: Option<serde_json::Value>,
}
