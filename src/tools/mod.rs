pub mod add_memory;
pub mod delete_all_memories;
pub mod get_memories;
pub mod memory_id;
pub mod search_memories;
pub mod update_memory;

use std::sync::Arc;

use add_memory::AddMemoryParams;
use delete_all_memories::DeleteAllMemoriesParams;
use get_memories::GetMemoriesParams;
use memory_id::MemoryIdParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_memories::SearchMemoriesParams;
use serde::Serialize;
use serde_json::{json, Value};
use update_memory::UpdateMemoryParams;

use crate::engine::{AddInput, AddRequest, ListRequest, MemoryEngine, SearchRequest};
use crate::error::MemoryError;
use crate::extraction::ChatMessage;
use crate::filter::normalize_filter_value;
use crate::scope::{validate_metadata, ScopeIds};

/// The MCP tool handler. Validates arguments, calls the engine, and turns every
/// outcome into a JSON string: the result on success, an
/// `{"error": {"kind", "message"}}` envelope on failure.
#[derive(Clone)]
pub struct MemoryTools {
    tool_router: ToolRouter<Self>,
    engine: Arc<MemoryEngine>,
}

#[tool_router]
impl MemoryTools {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine,
        }
    }

    #[tool(
        description = "Remember text or a conversation. Facts are extracted with the configured prompt and merged with near-identical memories in the same scope. Give text or messages; if both are given, messages wins. Returns {added, ids, results}; added may be 0 when nothing worth remembering was found."
    )]
    pub async fn add_memory(
        &self,
        Parameters(params): Parameters<AddMemoryParams>,
    ) -> std::result::Result<String, String> {
        respond("add_memory", self.handle_add(params).await)
    }

    #[tool(
        description = "Semantic search over memories. Scope with user_id/agent_id/run_id and filters. Returns {results, count, offset, limit, has_more}; repeat with offset += limit while has_more is true."
    )]
    pub async fn search_memories(
        &self,
        Parameters(params): Parameters<SearchMemoriesParams>,
    ) -> std::result::Result<String, String> {
        respond("search_memories", self.handle_search(params).await)
    }

    #[tool(
        description = "List memories matching a scope and filters, newest first. Returns {results, count, offset, limit, has_more}."
    )]
    pub async fn get_memories(
        &self,
        Parameters(params): Parameters<GetMemoriesParams>,
    ) -> std::result::Result<String, String> {
        respond("get_memories", self.handle_list(params).await)
    }

    #[tool(description = "Fetch one memory by ID.")]
    pub async fn get_memory(
        &self,
        Parameters(params): Parameters<MemoryIdParams>,
    ) -> std::result::Result<String, String> {
        respond("get_memory", self.handle_get(params).await)
    }

    #[tool(
        description = "Replace a memory's text (and optionally its metadata). The ID and scope are unchanged; the old text is kept in history."
    )]
    pub async fn update_memory(
        &self,
        Parameters(params): Parameters<UpdateMemoryParams>,
    ) -> std::result::Result<String, String> {
        respond("update_memory", self.handle_update(params).await)
    }

    #[tool(description = "Delete one memory by ID.")]
    pub async fn delete_memory(
        &self,
        Parameters(params): Parameters<MemoryIdParams>,
    ) -> std::result::Result<String, String> {
        respond("delete_memory", self.handle_delete(params).await)
    }

    #[tool(
        description = "Delete every memory in a scope. Requires at least one of user_id, agent_id or run_id, or a non-empty filters object. Returns {deleted}."
    )]
    pub async fn delete_all_memories(
        &self,
        Parameters(params): Parameters<DeleteAllMemoriesParams>,
    ) -> std::result::Result<String, String> {
        respond("delete_all_memories", self.handle_delete_all(params).await)
    }

    #[tool(
        description = "Show how a memory changed over time: earlier versions oldest first, the current text last."
    )]
    pub async fn get_memory_history(
        &self,
        Parameters(params): Parameters<MemoryIdParams>,
    ) -> std::result::Result<String, String> {
        respond("get_memory_history", self.handle_history(params).await)
    }

    #[tool(
        description = "Delete ALL memories of ALL users, agents and runs, including history. Use with caution; this cannot be undone."
    )]
    pub async fn reset_memories(&self) -> std::result::Result<String, String> {
        respond("reset_memories", self.handle_reset().await)
    }
}

impl MemoryTools {
    pub async fn handle_add(&self, params: AddMemoryParams) -> crate::error::Result<Value> {
        let messages = params.messages.filter(|m| !m.is_empty());
        let input = match (messages, params.text) {
            (Some(messages), _) => AddInput::Messages(validate_messages(messages)?),
            (None, Some(text)) if !text.trim().is_empty() => AddInput::Text(text),
            _ => return Err(MemoryError::validation("provide text or messages")),
        };
        let request = AddRequest {
            input,
            scope: ScopeIds::new(params.user_id, params.agent_id, params.run_id),
            metadata: validate_metadata(params.metadata)?,
            infer: params.infer,
        };
        to_value(self.engine.add(request).await?)
    }

    pub async fn handle_search(&self, params: SearchMemoriesParams) -> crate::error::Result<Value> {
        if params.query.trim().is_empty() {
            return Err(MemoryError::validation("query must not be empty"));
        }
        let request = SearchRequest {
            query: params.query,
            scope: ScopeIds::new(params.user_id, params.agent_id, params.run_id),
            filters: normalize_filter_value(params.filters.as_ref())?,
            page: self.engine.page(
                coerce_count("limit", params.limit.as_ref())?,
                coerce_count("offset", params.offset.as_ref())?,
                self.engine.settings().search_limit,
            )?,
        };
        to_value(self.engine.search(request).await?)
    }

    pub async fn handle_list(&self, params: GetMemoriesParams) -> crate::error::Result<Value> {
        let request = ListRequest {
            scope: ScopeIds::new(params.user_id, params.agent_id, params.run_id),
            filters: normalize_filter_value(params.filters.as_ref())?,
            page: self.engine.page(
                coerce_count("limit", params.limit.as_ref())?,
                coerce_count("offset", params.offset.as_ref())?,
                self.engine.settings().list_limit,
            )?,
        };
        to_value(self.engine.list(request).await?)
    }

    pub async fn handle_get(&self, params: MemoryIdParams) -> crate::error::Result<Value> {
        to_value(self.engine.get(&params.memory_id).await?)
    }

    pub async fn handle_update(&self, params: UpdateMemoryParams) -> crate::error::Result<Value> {
        let metadata = match params.metadata {
            None | Some(Value::Null) => None,
            some => Some(validate_metadata(some)?),
        };
        to_value(
            self.engine
                .update(&params.memory_id, params.text, metadata)
                .await?,
        )
    }

    pub async fn handle_delete(&self, params: MemoryIdParams) -> crate::error::Result<Value> {
        let id = params.memory_id.trim().to_string();
        self.engine.delete(&id).await?;
        Ok(json!({ "deleted": true, "id": id }))
    }

    pub async fn handle_delete_all(&self, params: DeleteAllMemoriesParams) -> crate::error::Result<Value> {
        let scope = ScopeIds::new(params.user_id, params.agent_id, params.run_id);
        let filters = normalize_filter_value(params.filters.as_ref())?;
        let deleted = self.engine.delete_all(scope, filters).await?;
        Ok(json!({ "deleted": deleted }))
    }

    pub async fn handle_history(&self, params: MemoryIdParams) -> crate::error::Result<Value> {
        to_value(self.engine.history(&params.memory_id).await?)
    }

    pub async fn handle_reset(&self) -> crate::error::Result<Value> {
        self.engine.reset().await?;
        Ok(json!({ "reset": true }))
    }
}

#[tool_handler]
impl ServerHandler for MemoryTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Long-term memory server. Use add_memory to remember text or conversations, \
                 search_memories to recall by meaning, get_memories to list a scope, \
                 get_memory/update_memory/delete_memory for single records, and \
                 get_memory_history to see how a memory changed. Scope every call with \
                 user_id, agent_id or run_id. delete_all_memories clears one scope; \
                 reset_memories clears everything."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

/// Encode a tool outcome, logging it under the tool's name.
fn respond(tool: &str, outcome: crate::error::Result<Value>) -> std::result::Result<String, String> {
    match outcome {
        Ok(value) => {
            tracing::info!(tool, "tool call succeeded");
            Ok(value.to_string())
        }
        Err(err) => {
            tracing::warn!(tool, kind = err.kind(), error = %err, "tool call failed");
            Err(json!(err.to_payload()).to_string())
        }
    }
}

fn to_value<T: Serialize>(value: T) -> crate::error::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn validate_messages(messages: Vec<ChatMessage>) -> crate::error::Result<Vec<ChatMessage>> {
    for (i, message) in messages.iter().enumerate() {
        if message.role.trim().is_empty() || message.content.trim().is_empty() {
            return Err(MemoryError::validation(format!(
                "messages[{i}] needs a non-empty role and content"
            )));
        }
    }
    Ok(messages)
}

/// Accept `limit`/`offset` as a JSON integer or an integer string.
fn coerce_count(field: &str, value: Option<&Value>) -> crate::error::Result<Option<usize>> {
    let invalid = || MemoryError::validation(format!("{field} must be a non-negative integer"));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse::<usize>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accept_integers_and_integer_strings() {
        assert_eq!(coerce_count("limit", None).unwrap(), None);
        assert_eq!(coerce_count("limit", Some(&json!(5))).unwrap(), Some(5));
        assert_eq!(coerce_count("limit", Some(&json!(" 7 "))).unwrap(), Some(7));
        assert_eq!(coerce_count("offset", Some(&Value::Null)).unwrap(), None);
    }

    #[test]
    fn counts_reject_negatives_fractions_and_words() {
        for bad in [json!(-1), json!(2.5), json!("ten"), json!(true), json!([1])] {
            let err = coerce_count("offset", Some(&bad)).unwrap_err();
            assert_eq!(err.kind(), "validation_error");
            assert!(err.to_string().contains("offset"));
        }
    }

    #[test]
    fn blank_message_is_rejected() {
        let err = validate_messages(vec![
            ChatMessage::user("hello"),
            ChatMessage {
                role: "assistant".into(),
                content: " ".into(),
            },
        ])
        .unwrap_err();
        assert!(err.to_string().contains("messages[1]"));
    }

    #[test]
    fn failures_become_error_envelopes() {
        let err = respond("get_memory", Err(MemoryError::NotFound("abc".into()))).unwrap_err();
        let payload: Value = serde_json::from_str(&err).unwrap();
        assert_eq!(payload["error"]["kind"], "not_found");
        assert_eq!(payload["error"]["message"], "memory not found: abc");
    }
}
