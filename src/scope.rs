//! Scope resolution: the `user_id` / `agent_id` / `run_id` partition keys.
//!
//! Writes stamp the triple onto the new record. Reads and range deletes fold
//! the same identifiers into equality predicates that are ANDed with the
//! caller's filters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MemoryError, Result};
use crate::filter::{FilterPredicate, ScalarValue};

/// Field names reserved for scope identifiers.
pub const SCOPE_FIELDS: [&str; 3] = ["user_id", "agent_id", "run_id"];

/// Immutable scope triple of a memory record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl ScopeIds {
    /// Build a scope, treating blank identifiers as absent.
    pub fn new(
        user_id: Option<String>,
        agent_id: Option<String>,
        run_id: Option<String>,
    ) -> Self {
        Self {
            user_id: non_blank(user_id),
            agent_id: non_blank(agent_id),
            run_id: non_blank(run_id),
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(Some(user_id.into()), None, None)
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.agent_id.is_none() && self.run_id.is_none()
    }

    /// Present identifiers as `(field, value)` pairs, in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        SCOPE_FIELDS
            .into_iter()
            .zip([&self.user_id, &self.agent_id, &self.run_id])
            .filter_map(|(field, value)| value.as_deref().map(|v| (field, v)))
    }

    /// Fill in `default_user` when no identifier was supplied at all.
    pub fn or_default_user(self, default_user: Option<&str>) -> Self {
        match default_user {
            Some(user) if self.is_empty() => Self::user(user),
            _ => self,
        }
    }

    /// Equality predicates for each present identifier.
    pub fn predicates(&self) -> Vec<FilterPredicate> {
        self.iter()
            .map(|(field, value)| FilterPredicate::eq(field, ScalarValue::Text(value.to_string())))
            .collect()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Combine scope identifiers with normalized caller filters for a read.
///
/// `default_user` only applies when the caller constrained no scope field,
/// neither through identifiers nor through filters.
pub fn resolve_read_filters(
    scope: &ScopeIds,
    filters: Vec<FilterPredicate>,
    default_user: Option<&str>,
) -> Vec<FilterPredicate> {
    let mentions_scope = filters
        .iter()
        .any(|p| SCOPE_FIELDS.contains(&p.field()));
    let scope = if mentions_scope {
        scope.clone()
    } else {
        scope.clone().or_default_user(default_user)
    };

    let mut resolved = scope.predicates();
    resolved.extend(filters);
    resolved
}

/// Combine scope identifiers with filters for a range delete.
///
/// An empty result would match the whole collection and is refused.
pub fn resolve_delete_filters(
    scope: &ScopeIds,
    filters: Vec<FilterPredicate>,
) -> Result<Vec<FilterPredicate>> {
    let mut resolved = scope.predicates();
    resolved.extend(filters);
    if resolved.is_empty() {
        return Err(MemoryError::validation(
            "delete_all_memories requires at least one of user_id, agent_id or run_id, \
             or a non-empty filters object; use reset_memories to clear everything",
        ));
    }
    Ok(resolved)
}

/// Validate caller metadata for a write.
///
/// Must be a JSON object and must not shadow the scope fields.
pub fn validate_metadata(metadata: Option<Value>) -> Result<Map<String, Value>> {
    let map = match metadata {
        None | Some(Value::Null) => return Ok(Map::new()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(MemoryError::validation("metadata must be a JSON object")),
    };

    if let Some(key) = map.keys().find(|k| SCOPE_FIELDS.contains(&k.as_str())) {
        return Err(MemoryError::validation(format!(
            "metadata key '{key}' is reserved; pass it as a top-level argument"
        )));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_identifiers_are_absent() {
        let scope = ScopeIds::new(Some("  ".into()), Some("".into()), None);
        assert!(scope.is_empty());
        assert!(scope.predicates().is_empty());
    }

    #[test]
    fn identifiers_are_trimmed() {
        let scope = ScopeIds::new(Some(" u1 ".into()), None, Some("r9".into()));
        assert_eq!(scope.user_id.as_deref(), Some("u1"));
        let fields: Vec<_> = scope.iter().collect();
        assert_eq!(fields, vec![("user_id", "u1"), ("run_id", "r9")]);
    }

    #[test]
    fn read_filters_and_scope_with_caller_filters() {
        let scope = ScopeIds::new(Some("u1".into()), Some("a1".into()), None);
        let extra = vec![FilterPredicate::eq("project", ScalarValue::Text("p1".into()))];
        let resolved = resolve_read_filters(&scope, extra, None);
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].field(), "user_id");
        assert_eq!(resolved[1].field(), "agent_id");
        assert_eq!(resolved[2].field(), "project");
    }

    #[test]
    fn default_user_fills_empty_scope() {
        let resolved = resolve_read_filters(&ScopeIds::default(), Vec::new(), Some("me"));
        assert_eq!(
            resolved,
            vec![FilterPredicate::eq("user_id", ScalarValue::Text("me".into()))]
        );
    }

    #[test]
    fn default_user_does_not_override_scope_filter() {
        let filters = vec![FilterPredicate::eq("user_id", ScalarValue::Text("u1".into()))];
        let resolved = resolve_read_filters(&ScopeIds::default(), filters.clone(), Some("me"));
        assert_eq!(resolved, filters);
    }

    #[test]
    fn default_user_does_not_override_agent_scope() {
        let scope = ScopeIds::new(None, Some("agent".into()), None);
        assert_eq!(scope.clone().or_default_user(Some("me")), scope);
    }

    #[test]
    fn unscoped_delete_is_rejected() {
        let err = resolve_delete_filters(&ScopeIds::default(), Vec::new()).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn scoped_delete_is_accepted() {
        let scope = ScopeIds::new(None, None, Some("run".into()));
        assert_eq!(resolve_delete_filters(&scope, Vec::new()).unwrap().len(), 1);
    }

    #[test]
    fn metadata_must_be_object_without_scope_keys() {
        assert!(validate_metadata(None).unwrap().is_empty());
        assert_eq!(validate_metadata(Some(json!({"k": 1}))).unwrap().len(), 1);
        assert!(validate_metadata(Some(json!([1]))).is_err());
        assert!(validate_metadata(Some(json!({"user_id": "x"}))).is_err());
    }

    #[test]
    fn scope_serializes_without_absent_fields() {
        let json = serde_json::to_value(ScopeIds::user("u1")).unwrap();
        assert_eq!(json, json!({"user_id": "u1"}));
    }
}
