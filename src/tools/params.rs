//! Request parsing: raw caller arguments plus verified identity claims in,
//! validated per-invocation parameter values out.

use serde_json::{Map as JsonMap, Value as JsonValue};
use std::collections::HashMap;

use crate::error::{ToolError, ToolResult};
use crate::tools::spec::{ParamKind, ParamSpec};

/// Verified claims keyed by auth service name, then claim name.
pub type ClaimMap = HashMap<String, HashMap<String, JsonValue>>;

/// Validated parameter values for one invocation, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamValues {
    entries: Vec<(String, JsonValue)>,
}

impl ParamValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, preserving declaration order.
    pub fn push(&mut self, name: impl Into<String>, value: JsonValue) {
        self.entries.push((name.into(), value));
    }

    /// Look up a value by parameter name.
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl FromIterator<(String, JsonValue)> for ParamValues {
    fn from_iter<I: IntoIterator<Item = (String, JsonValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Kind name of a JSON value for mismatch messages.
pub fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "float",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Validate raw caller data against the combined parameter list.
///
/// Claim-sourced parameters take their value from `claims` only; caller
/// input for them is ignored, so a client cannot spoof an identity-derived
/// value. Keys in `data` with no matching spec are ignored. Optional
/// parameters that are absent everywhere are simply left out.
pub fn parse_params(
    specs: &[ParamSpec],
    data: &JsonMap<String, JsonValue>,
    claims: &ClaimMap,
) -> ToolResult<ParamValues> {
    let mut values = ParamValues::new();
    for spec in specs {
        let value = if spec.is_claim_sourced() {
            Some(claim_value(spec, claims)?)
        } else {
            data.get(&spec.name).cloned().or_else(|| spec.default.clone())
        };
        match value {
            Some(v) => {
                check_kind(spec, &v)?;
                values.push(spec.name.clone(), v);
            }
            None if spec.is_required() => {
                return Err(ToolError::missing_parameter(&spec.name));
            }
            None => {}
        }
    }
    Ok(values)
}

fn claim_value(spec: &ParamSpec, claims: &ClaimMap) -> ToolResult<JsonValue> {
    for source in &spec.auth_claims {
        if let Some(value) = claims
            .get(&source.service)
            .and_then(|c| c.get(&source.claim))
        {
            return Ok(value.clone());
        }
    }
    Err(ToolError::missing_parameter(&spec.name))
}

/// Kind check for one resolved value. Explicit nulls are accepted for every
/// kind and bind as SQL NULL downstream.
pub fn check_kind(spec: &ParamSpec, value: &JsonValue) -> ToolResult<()> {
    if value.is_null() {
        return Ok(());
    }
    if !spec.kind.accepts(value) {
        return Err(ToolError::type_mismatch(
            &spec.name,
            spec.kind.as_str(),
            json_kind(value),
        ));
    }
    if spec.kind == ParamKind::Array {
        let element_kind = spec.element_kind();
        for element in value.as_array().into_iter().flatten() {
            if !element.is_null() && !element_kind.accepts(element) {
                return Err(ToolError::type_mismatch(
                    &spec.name,
                    format!("array of {element_kind}"),
                    json_kind(element),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, kind: ParamKind) -> ParamSpec {
        ParamSpec {
            name: name.to_string(),
            kind,
            description: String::new(),
            required: true,
            default: None,
            items: None,
            rendering: None,
            auth_claims: vec![],
        }
    }

    fn data(value: JsonValue) -> JsonMap<String, JsonValue> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_parse_in_declaration_order() {
        let specs = vec![spec("b", ParamKind::Integer), spec("a", ParamKind::String)];
        let values =
            parse_params(&specs, &data(json!({"a": "x", "b": 1})), &ClaimMap::new()).unwrap();
        let names: Vec<&str> = values.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_missing_required() {
        let specs = vec![spec("user_id", ParamKind::Integer)];
        let err = parse_params(&specs, &data(json!({})), &ClaimMap::new()).unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter { name } if name == "user_id"));
    }

    #[test]
    fn test_default_fills_absent_value() {
        let mut limit = spec("limit", ParamKind::Integer);
        limit.default = Some(json!(25));
        let values = parse_params(&[limit], &data(json!({})), &ClaimMap::new()).unwrap();
        assert_eq!(values.get("limit"), Some(&json!(25)));
    }

    #[test]
    fn test_optional_absent_is_left_out() {
        let mut dept = spec("dept", ParamKind::String);
        dept.required = false;
        let values = parse_params(&[dept], &data(json!({})), &ClaimMap::new()).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let specs = vec![spec("name", ParamKind::String)];
        let values = parse_params(
            &specs,
            &data(json!({"name": "Alice", "surprise": true})),
            &ClaimMap::new(),
        )
        .unwrap();
        assert_eq!(values.len(), 1);
        assert!(values.get("surprise").is_none());
    }

    #[test]
    fn test_type_mismatch_names_expected_and_actual() {
        let specs = vec![spec("age", ParamKind::Integer)];
        let err =
            parse_params(&specs, &data(json!({"age": "young"})), &ClaimMap::new()).unwrap_err();
        match err {
            ToolError::TypeMismatch {
                name,
                expected,
                actual,
            } => {
                assert_eq!(name, "age");
                assert_eq!(expected, "integer");
                assert_eq!(actual, "string");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_float_accepts_integer_input() {
        let specs = vec![spec("score", ParamKind::Float)];
        let values = parse_params(&specs, &data(json!({"score": 3})), &ClaimMap::new()).unwrap();
        assert_eq!(values.get("score"), Some(&json!(3)));
    }

    #[test]
    fn test_explicit_null_accepted() {
        let specs = vec![spec("email", ParamKind::String)];
        let values =
            parse_params(&specs, &data(json!({"email": null})), &ClaimMap::new()).unwrap();
        assert_eq!(values.get("email"), Some(&JsonValue::Null));
    }

    #[test]
    fn test_array_element_mismatch() {
        let mut ids = spec("ids", ParamKind::Array);
        ids.items = Some(ParamKind::Integer);
        let err =
            parse_params(&[ids], &data(json!({"ids": [1, "two"]})), &ClaimMap::new()).unwrap_err();
        match err {
            ToolError::TypeMismatch { expected, actual, .. } => {
                assert_eq!(expected, "array of integer");
                assert_eq!(actual, "string");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_claim_sourced_ignores_caller_value() {
        use crate::tools::spec::ClaimSource;
        let mut user = spec("user_id", ParamKind::String);
        user.auth_claims = vec![ClaimSource {
            service: "corp-oidc".to_string(),
            claim: "sub".to_string(),
        }];

        let mut claims = ClaimMap::new();
        claims.insert(
            "corp-oidc".to_string(),
            HashMap::from([("sub".to_string(), json!("u-123"))]),
        );

        let values = parse_params(
            &[user.clone()],
            &data(json!({"user_id": "spoofed"})),
            &claims,
        )
        .unwrap();
        assert_eq!(values.get("user_id"), Some(&json!("u-123")));

        let err = parse_params(&[user], &data(json!({"user_id": "spoofed"})), &ClaimMap::new())
            .unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter { name } if name == "user_id"));
    }
}
