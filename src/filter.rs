//! Caller filter normalization.
//!
//! Tool callers pass filters as a loose JSON object. [`normalize_filters`]
//! turns it into the two predicate shapes the store understands, equality and
//! numeric `gte`/`lte` ranges, and rejects everything else up front with a
//! [`MemoryError::Validation`] naming the offending field.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{MemoryError, Result};
use crate::scope::SCOPE_FIELDS;

/// A scalar literal usable in an equality predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl ScalarValue {
    /// Text rendering used when comparing against scope columns.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// Canonical predicate over a record field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterPredicate {
    /// `{field: literal}`
    Eq { field: String, value: ScalarValue },
    /// `{field: {gte?, lte?}}`, at least one bound present.
    Range {
        field: String,
        gte: Option<f64>,
        lte: Option<f64>,
    },
}

impl FilterPredicate {
    pub fn eq(field: impl Into<String>, value: ScalarValue) -> Self {
        Self::Eq {
            field: field.into(),
            value,
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::Range { field, .. } => field,
        }
    }
}

/// Normalize an optional caller-supplied filter value.
///
/// `None` and `null` both mean "no filters". Anything other than a JSON object
/// is rejected.
pub fn normalize_filter_value(filters: Option<&Value>) -> Result<Vec<FilterPredicate>> {
    match filters {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(map)) => normalize_filters(map),
        Some(other) => Err(MemoryError::validation(format!(
            "filters must be a JSON object, got {}",
            json_type_name(other)
        ))),
    }
}

/// Normalize a filter mapping into canonical predicates, in field order.
pub fn normalize_filters(filters: &Map<String, Value>) -> Result<Vec<FilterPredicate>> {
    filters
        .iter()
        .map(|(field, value)| normalize_entry(field, value))
        .collect()
}

fn normalize_entry(field: &str, value: &Value) -> Result<FilterPredicate> {
    validate_field_name(field)?;

    if let Some(scalar) = scalar_from_json(value) {
        return Ok(FilterPredicate::Eq {
            field: field.to_string(),
            value: scalar,
        });
    }

    match value {
        Value::Object(ops) => normalize_range(field, ops),
        Value::Array(_) => Err(MemoryError::validation(format!(
            "filter '{field}': lists are not supported; issue one query per value and merge the results"
        ))),
        Value::Null => Err(MemoryError::validation(format!(
            "filter '{field}': null is not a supported filter value"
        ))),
        _ => Err(MemoryError::validation(format!(
            "filter '{field}': unsupported value"
        ))),
    }
}

fn normalize_range(field: &str, ops: &Map<String, Value>) -> Result<FilterPredicate> {
    if ops.is_empty() {
        return Err(MemoryError::validation(format!(
            "filter '{field}': range must contain 'gte' and/or 'lte'"
        )));
    }
    if SCOPE_FIELDS.contains(&field) {
        return Err(MemoryError::validation(format!(
            "filter '{field}': scope fields support equality only"
        )));
    }

    let mut gte = None;
    let mut lte = None;
    for (op, bound) in ops {
        let slot = match op.as_str() {
            "gte" => &mut gte,
            "lte" => &mut lte,
            other => {
                return Err(MemoryError::validation(format!(
                    "filter '{field}': unsupported operator '{other}' (only 'gte' and 'lte' ranges or plain equality are accepted)"
                )))
            }
        };
        let number = bound.as_f64().ok_or_else(|| {
            MemoryError::validation(format!("filter '{field}': '{op}' bound must be a number"))
        })?;
        *slot = Some(number);
    }

    if let (Some(lo), Some(hi)) = (gte, lte) {
        if lo > hi {
            return Err(MemoryError::validation(format!(
                "filter '{field}': 'gte' ({lo}) exceeds 'lte' ({hi})"
            )));
        }
    }

    Ok(FilterPredicate::Range {
        field: field.to_string(),
        gte,
        lte,
    })
}

/// Field names become quoted JSON path segments in SQL, so they may not
/// contain quote or backslash characters.
fn validate_field_name(field: &str) -> Result<()> {
    if field.trim().is_empty() {
        return Err(MemoryError::validation("filter field names must not be empty"));
    }
    if field.contains(['"', '\\']) {
        return Err(MemoryError::validation(format!(
            "filter '{field}': field names may not contain quotes or backslashes"
        )));
    }
    Ok(())
}

/// Convert a JSON scalar into a [`ScalarValue`]; `None` for non-scalars.
pub fn scalar_from_json(value: &Value) -> Option<ScalarValue> {
    match value {
        Value::String(s) => Some(ScalarValue::Text(s.clone())),
        Value::Bool(b) => Some(ScalarValue::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .map(ScalarValue::Integer)
            .or_else(|| n.as_f64().map(ScalarValue::Float)),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
